use super::kernel::two_body_kernel;
use super::EnergyAccumulator;
use crate::error::{ensure_dim, EstimatorResult};
use crate::hamiltonian::{partition_aux, GenericHamiltonian};
use crate::ring_impl::{ChunkRingReducer, RingTransport};
use crate::trial::HalfRotated;
use crate::walkers::WalkerBatch;
use backend::{to_complex, CMatrix, NumericBackend, C64};
use rayon::prelude::*;
use tracing::debug;

/// `sum rH1a * Ghalfa + sum rH1b * Ghalfb + ecore` per walker.
pub fn one_body_energy_half(
    half: &HalfRotated,
    batch: &WalkerBatch,
    ecore: f64,
    restricted: bool,
) -> EstimatorResult<Vec<C64>> {
    ensure_dim("rotated alpha one-body rows", half.rh1a.nrows(), batch.nalpha)?;
    ensure_dim("rotated beta one-body rows", half.rh1b.nrows(), batch.nbeta)?;
    ensure_dim("rotated one-body columns", half.rh1a.ncols(), batch.nbasis)?;
    let ecore = C64::new(ecore, 0.0);
    Ok((0..batch.nwalkers)
        .map(|w| {
            let ea = half.rh1a.component_mul(&batch.ghalfa[w]).sum();
            if restricted {
                ea * 2.0 + ecore
            } else {
                ea + half.rh1b.component_mul(&batch.ghalfb[w]).sum() + ecore
            }
        })
        .collect())
}

/// Cholesky energy of a batch with every factor available locally.
///
/// The restricted kernels only read the alpha channel, so they refuse open-shell walkers.
pub fn local_energy_cholesky(
    ham: &GenericHamiltonian,
    batch: &WalkerBatch,
    half: &HalfRotated,
    restricted: bool,
    backend: &dyn NumericBackend,
) -> EstimatorResult<CMatrix> {
    if restricted {
        batch.check_closed_shell()?;
    }
    let e1 = one_body_energy_half(half, batch, ham.ecore, restricted)?;
    let parts = two_body_kernel(
        &half.rchol,
        &batch.ghalfa,
        &batch.ghalfb,
        restricted,
        backend,
    )?;
    Ok(EnergyAccumulator::from_columns(&e1, &parts.two_body()))
}

/// Cholesky energy with the factors spread over the ring behind `transport`.
///
/// This process keeps the slab `partition_aux(naux, size)[rank]` of the half-rotated
/// factors; the two-body part is summed over all slabs by the ring reducer.
pub fn local_energy_chunked(
    ham: &GenericHamiltonian,
    batch: &WalkerBatch,
    half: &HalfRotated,
    restricted: bool,
    transport: &dyn RingTransport,
    backend: &dyn NumericBackend,
) -> EstimatorResult<CMatrix> {
    if restricted {
        batch.check_closed_shell()?;
    }
    let topology = transport.topology();
    let ranges = partition_aux(half.rchol.naux(), topology.size)?;
    let slab = half.rchol.chunk(ranges[topology.rank].clone())?;
    debug!(
        "rank {} owns auxiliary slab {:?} of {}",
        topology.rank,
        slab.aux_range,
        half.rchol.naux()
    );

    let e1 = one_body_energy_half(half, batch, ham.ecore, restricted)?;
    let reducer = ChunkRingReducer::new(transport, &slab, restricted, backend);
    let parts = reducer.reduce(&batch.ghalfa, &batch.ghalfb)?;
    Ok(EnergyAccumulator::from_columns(&e1, &parts.two_body()))
}

struct FullGIntegrals {
    h1: [CMatrix; 2],
    chol: Vec<CMatrix>,
    ecore: C64,
}

impl FullGIntegrals {
    fn new(ham: &GenericHamiltonian) -> Self {
        FullGIntegrals {
            h1: [to_complex(&ham.h1[0]), to_complex(&ham.h1[1])],
            chol: ham.chol.iter().map(to_complex).collect(),
            ecore: C64::new(ham.ecore, 0.0),
        }
    }

    fn energy(
        &self,
        ga: &CMatrix,
        gb: &CMatrix,
        backend: &dyn NumericBackend,
    ) -> EnergyAccumulator {
        let e1 = self.h1[0].component_mul(ga).sum() + self.h1[1].component_mul(gb).sum();

        let mut ecoul = C64::new(0.0, 0.0);
        let mut exx = C64::new(0.0, 0.0);
        for l in self.chol.iter() {
            let x = l.component_mul(ga).sum() + l.component_mul(gb).sum();
            ecoul += x * x;
            exx += backend.contract_transpose(&(ga * l));
            exx += backend.contract_transpose(&(gb * l));
        }
        let e2 = (ecoul - exx) * 0.5;
        EnergyAccumulator::new(e1 + self.ecore, e2)
    }
}

/// Energy of one walker from its full Green's functions.
///
/// `e2 = 0.5 sum_x (Xa + Xb)^2 - 0.5 sum_x [tr(Ga L Ga L) + tr(Gb L Gb L)]` with
/// `X = sum L_x * G`. Requires symmetric factors.
pub fn local_energy_full_g(
    ham: &GenericHamiltonian,
    ga: &CMatrix,
    gb: &CMatrix,
    backend: &dyn NumericBackend,
) -> EnergyAccumulator {
    FullGIntegrals::new(ham).energy(ga, gb, backend)
}

/// [`local_energy_full_g`] for every walker of a batch.
pub fn local_energy_full_g_batch(
    ham: &GenericHamiltonian,
    batch: &WalkerBatch,
    backend: &dyn NumericBackend,
) -> EstimatorResult<CMatrix> {
    ensure_dim("walker basis size", batch.nbasis, ham.nbasis)?;
    let integrals = FullGIntegrals::new(ham);
    let energies: Vec<EnergyAccumulator> = (0..batch.nwalkers)
        .into_par_iter()
        .map(|w| integrals.energy(&batch.ga[w], &batch.gb[w], backend))
        .collect();
    Ok(EnergyAccumulator::assemble(&energies))
}
