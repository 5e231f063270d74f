//! Batched Coulomb and exchange contractions of half-rotated Green's functions against a
//! slab of Cholesky factors.
//!
//! Every function is pure and works on whatever auxiliary range the slab covers, so the
//! results over disjoint slabs add up to the result over their union.

use crate::error::{ensure_dim, EstimatorResult};
use crate::hamiltonian::{CholeskySlab, InteractionSlab};
use backend::{CMatrix, NumericBackend, C64};
use rayon::prelude::*;

/// Per-walker Coulomb and exchange energies, already scaled.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoBodyParts {
    pub ecoul: Vec<C64>,
    pub exx: Vec<C64>,
}

impl TwoBodyParts {
    pub fn zeros(nwalkers: usize) -> Self {
        TwoBodyParts {
            ecoul: vec![C64::new(0.0, 0.0); nwalkers],
            exx: vec![C64::new(0.0, 0.0); nwalkers],
        }
    }

    pub fn nwalkers(&self) -> usize {
        self.ecoul.len()
    }

    /// Element-wise sum with the parts of another slab.
    pub fn accumulate(&mut self, other: &TwoBodyParts) {
        for (a, b) in self.ecoul.iter_mut().zip(other.ecoul.iter()) {
            *a += b;
        }
        for (a, b) in self.exx.iter_mut().zip(other.exx.iter()) {
            *a += b;
        }
    }

    /// `ecoul - exx` per walker.
    pub fn two_body(&self) -> Vec<C64> {
        self.ecoul
            .iter()
            .zip(self.exx.iter())
            .map(|(j, k)| j - k)
            .collect()
    }
}

fn check_batch(slab: &CholeskySlab, ghalf: &[CMatrix]) -> EstimatorResult<()> {
    for g in ghalf.iter() {
        ensure_dim("half Green's function rows", g.nrows(), slab.nocc())?;
        ensure_dim("half Green's function columns", g.ncols(), slab.nbasis())?;
    }
    Ok(())
}

fn sum_of_squares(x: &CMatrix) -> Vec<C64> {
    x.column_iter()
        .map(|col| col.iter().map(|v| v * v).sum())
        .collect()
}

/// Closed shell Coulomb energy `2 sum_x X[x,w]^2` from the alpha channel only.
pub fn ecoul_kernel_rhf(slab: &CholeskySlab, ghalfa: &[CMatrix]) -> EstimatorResult<Vec<C64>> {
    check_batch(slab, ghalfa)?;
    let x = slab.coulomb_projection(ghalfa);
    Ok(sum_of_squares(&x)
        .into_iter()
        .map(|e| e * 2.0)
        .collect())
}

/// Open shell Coulomb energy `0.5 sum_x (Xa[x,w] + Xb[x,w])^2`.
pub fn ecoul_kernel_uhf(
    slab: &InteractionSlab,
    ghalfa: &[CMatrix],
    ghalfb: &[CMatrix],
) -> EstimatorResult<Vec<C64>> {
    check_batch(&slab.alpha, ghalfa)?;
    check_batch(&slab.beta, ghalfb)?;
    ensure_dim("beta walker count", ghalfb.len(), ghalfa.len())?;
    let x = slab.alpha.coulomb_projection(ghalfa) + slab.beta.coulomb_projection(ghalfb);
    Ok(sum_of_squares(&x)
        .into_iter()
        .map(|e| e * 0.5)
        .collect())
}

/// Exchange energy `0.5 sum_x sum_ij T_ij T_ji`, `T = L_x Ghalf^T`, of one spin channel.
pub fn exx_kernel(
    slab: &CholeskySlab,
    ghalf: &[CMatrix],
    backend: &dyn NumericBackend,
) -> EstimatorResult<Vec<C64>> {
    check_batch(slab, ghalf)?;
    Ok(ghalf
        .par_iter()
        .map(|g| slab.exchange(g, backend) * 0.5)
        .collect())
}

/// Coulomb and exchange energies of a batch on one slab.
///
/// The restricted variant reads only the alpha channel and doubles it; `ghalfb` is ignored.
pub fn two_body_kernel(
    slab: &InteractionSlab,
    ghalfa: &[CMatrix],
    ghalfb: &[CMatrix],
    restricted: bool,
    backend: &dyn NumericBackend,
) -> EstimatorResult<TwoBodyParts> {
    if restricted {
        let ecoul = ecoul_kernel_rhf(&slab.alpha, ghalfa)?;
        let exx = exx_kernel(&slab.alpha, ghalfa, backend)?
            .into_iter()
            .map(|e| e * 2.0)
            .collect();
        Ok(TwoBodyParts { ecoul, exx })
    } else {
        let ecoul = ecoul_kernel_uhf(slab, ghalfa, ghalfb)?;
        let exx = exx_kernel(&slab.alpha, ghalfa, backend)?
            .into_iter()
            .zip(exx_kernel(&slab.beta, ghalfb, backend)?)
            .map(|(a, b)| a + b)
            .collect();
        Ok(TwoBodyParts { ecoul, exx })
    }
}
