//! Local energy of walker batches
//!
//! All strategies return an nwalkers x 3 matrix whose columns are the total, one-body and
//! two-body energies. The constant core energy is part of the one-body column.
//!
//! # Strategies
//!
//! - **Cholesky** on half-rotated Green's functions, restricted or unrestricted, with the
//!   factors either local or distributed over a ring of processes
//! - **Full-G Cholesky** on full Green's functions, the only choice for expansions
//! - **Exact ERI** on half-rotated four-index integrals
//! - **Stochastic RI**, exchange sampled with random projections of the auxiliary axis
//! - **PNO**, a truncated pair-block correction on top of the exact reference energy

mod generic;
pub mod kernel;
mod local_energy;

use backend::{CMatrix, C64};

pub use generic::{
    local_energy_exact_eri, local_energy_pno, local_energy_stochastic_ri, StochasticProjection,
};
pub use kernel::{ecoul_kernel_rhf, ecoul_kernel_uhf, exx_kernel, two_body_kernel, TwoBodyParts};
pub use local_energy::{
    local_energy_cholesky, local_energy_chunked, local_energy_full_g, local_energy_full_g_batch,
    one_body_energy_half,
};

/// Energies of one walker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnergyAccumulator {
    pub total: C64,
    pub one_body: C64,
    pub two_body: C64,
}

impl EnergyAccumulator {
    pub fn new(one_body: C64, two_body: C64) -> Self {
        EnergyAccumulator {
            total: one_body + two_body,
            one_body,
            two_body,
        }
    }

    /// Stack per-walker energies into an nwalkers x 3 matrix.
    pub fn assemble(energies: &[EnergyAccumulator]) -> CMatrix {
        CMatrix::from_fn(energies.len(), 3, |w, k| match k {
            0 => energies[w].total,
            1 => energies[w].one_body,
            _ => energies[w].two_body,
        })
    }

    pub fn from_columns(one_body: &[C64], two_body: &[C64]) -> CMatrix {
        let energies: Vec<_> = one_body
            .iter()
            .zip(two_body.iter())
            .map(|(e1, e2)| EnergyAccumulator::new(*e1, *e2))
            .collect();
        EnergyAccumulator::assemble(&energies)
    }
}
