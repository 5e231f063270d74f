extern crate nalgebra as na;

use crate::error::{EstimatorError, EstimatorResult};
use crate::trial::Determinant;
use crate::walkers::WalkerBatch;
use backend::{CMatrix, NumericBackend, SignedLogDet, C64};
use rayon::prelude::*;
use tracing::trace;

/// Determinants whose overlap magnitude falls below this are dropped from an expansion.
pub const OVERLAP_THRESHOLD: f64 = 1e-16;

/// Overlap and Green's functions of one spin block against one set of trial orbitals.
#[derive(Debug, Clone)]
pub struct SpinGreens {
    pub logdet: SignedLogDet,
    /// nocc x nbasis
    pub ghalf: CMatrix,
    /// nbasis x nbasis
    pub g: CMatrix,
}

/// `O = phi^T psi^*`, `Ghalf = O^-1 phi^T`, `G = psi^* Ghalf`. `None` when `O` is singular.
pub fn spin_greens(
    backend: &dyn NumericBackend,
    phi: na::DMatrixView<'_, C64>,
    psi: &CMatrix,
) -> Option<SpinGreens> {
    let psi_conj = psi.conjugate();
    let phi_t = phi.transpose();
    let ovlp = &phi_t * &psi_conj;
    let logdet = backend.slogdet(&ovlp);
    if logdet.is_zero() {
        return None;
    }
    let ghalf = backend.inverse(&ovlp)? * phi_t;
    let g = psi_conj * &ghalf;
    Some(SpinGreens { logdet, ghalf, g })
}

/// Both spins of walker `w` against determinant `det`.
pub(crate) fn walker_greens(
    backend: &dyn NumericBackend,
    batch: &WalkerBatch,
    w: usize,
    det: &Determinant,
) -> Option<(SpinGreens, SpinGreens)> {
    let a = spin_greens(backend, batch.alpha(w), &det.alpha)?;
    let b = spin_greens(backend, batch.beta(w), &det.beta)?;
    Some((a, b))
}

/// Green's functions of every walker against a single determinant.
///
/// Fills `ga`, `gb`, `ghalfa`, `ghalfb` and `log_ovlp`; a singular overlap is fatal.
pub fn greens_function_single_det(
    batch: &mut WalkerBatch,
    det: &Determinant,
    backend: &dyn NumericBackend,
) -> EstimatorResult<Vec<SignedLogDet>> {
    let shared: &WalkerBatch = batch;
    let results = (0..shared.nwalkers)
        .into_par_iter()
        .map(|w| {
            walker_greens(backend, shared, w, det)
                .ok_or(EstimatorError::SingularOverlap {
                    walker: w,
                    determinant: 0,
                })
        })
        .collect::<EstimatorResult<Vec<_>>>()?;

    for (w, (a, b)) in results.into_iter().enumerate() {
        batch.log_ovlp[w] = a.logdet.combine(&b.logdet);
        batch.ga[w] = a.g;
        batch.gb[w] = b.g;
        batch.ghalfa[w] = a.ghalf;
        batch.ghalfb[w] = b.ghalf;
    }
    Ok(batch.log_ovlp.clone())
}

/// `G = sum_D c_D^* O_D G_D / sum_D c_D^* O_D` for an expansion of arbitrary determinants.
///
/// Determinants with a vanishing overlap are skipped and carry no weight in the
/// denominator. The weights are summed relative to the largest `|O_D|`, so the total
/// overlap stays representable when every `O_D` under- or overflows. Only the full Green's
/// functions are written; the half-rotated buffers have no meaning for an expansion.
pub fn greens_function_multi_det(
    batch: &mut WalkerBatch,
    coeffs: &[C64],
    determinants: &[Determinant],
    backend: &dyn NumericBackend,
) -> EstimatorResult<Vec<SignedLogDet>> {
    let shared: &WalkerBatch = batch;
    let nbasis = shared.nbasis;
    let log_threshold = OVERLAP_THRESHOLD.ln();
    let results = (0..shared.nwalkers)
        .into_par_iter()
        .map(|w| {
            let mut kept = Vec::with_capacity(determinants.len());
            for (d, (c, det)) in coeffs.iter().zip(determinants.iter()).enumerate() {
                let Some((a, b)) = walker_greens(backend, shared, w, det) else {
                    trace!("walker {}: determinant {} is singular, skipped", w, d);
                    continue;
                };
                let ovlp = a.logdet.combine(&b.logdet);
                if a.logdet.log_abs < log_threshold || ovlp.log_abs < log_threshold {
                    trace!(
                        "walker {}: determinant {} has log overlap {:.3}, skipped",
                        w,
                        d,
                        ovlp.log_abs
                    );
                    continue;
                }
                kept.push((c.conj(), ovlp, a.g, b.g));
            }

            let shift = kept
                .iter()
                .map(|(_, ovlp, _, _)| ovlp.log_abs)
                .fold(f64::NEG_INFINITY, f64::max);
            let mut ga = CMatrix::zeros(nbasis, nbasis);
            let mut gb = CMatrix::zeros(nbasis, nbasis);
            let mut total = C64::new(0.0, 0.0);
            for (c, ovlp, g_a, g_b) in kept {
                let weight = c * ovlp.scaled_value(shift);
                ga += g_a * weight;
                gb += g_b * weight;
                total += weight;
            }
            if total.norm() == 0.0 {
                return Err(EstimatorError::SingularOverlap {
                    walker: w,
                    determinant: 0,
                });
            }
            let log_ovlp = SignedLogDet::from_value(total).combine(&SignedLogDet {
                sign: C64::new(1.0, 0.0),
                log_abs: shift,
            });
            Ok((ga / total, gb / total, log_ovlp))
        })
        .collect::<EstimatorResult<Vec<_>>>()?;

    for (w, (ga, gb, log_ovlp)) in results.into_iter().enumerate() {
        batch.ga[w] = ga;
        batch.gb[w] = gb;
        batch.log_ovlp[w] = log_ovlp;
    }
    Ok(batch.log_ovlp.clone())
}
