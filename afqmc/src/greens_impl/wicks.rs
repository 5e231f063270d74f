use super::brute_force::walker_greens;
use super::cofactor::{excitation_determinant, excitation_matrix, scatter_rule};
use crate::error::{EstimatorError, EstimatorResult};
use crate::trial::ParticleHoleExpansion;
use crate::walkers::WalkerBatch;
use backend::{CMatrix, NumericBackend, SignedLogDet, C64};
use rayon::prelude::*;

/// Overlap ratio `phase * det(G0[cre, anh])` of one spin of an excited determinant.
fn spin_ratio(
    g0: &CMatrix,
    cre: &[usize],
    anh: &[usize],
    phase: f64,
    backend: &dyn NumericBackend,
) -> C64 {
    excitation_determinant(&excitation_matrix(g0, cre, anh), backend) * phase
}

/// Green's functions of every walker against an orthogonal particle-hole expansion using
/// the generalised Wick theorem.
///
/// Only the reference determinant is inverted; each excited determinant costs a small
/// determinant of its excitation matrix plus a scatter into the connected intermediates.
/// The reference overlap is the only thing that may be singular. It stays in log space, and
/// the Green's functions are normalised by the ratio sum alone, so walkers whose overlap
/// under- or overflows still get finite Green's functions.
pub fn greens_function_wicks(
    batch: &mut WalkerBatch,
    expansion: &ParticleHoleExpansion,
    backend: &dyn NumericBackend,
) -> EstimatorResult<Vec<SignedLogDet>> {
    let shared: &WalkerBatch = batch;
    let nbasis = shared.nbasis;
    let reference = &expansion.determinants[0];
    let identity = CMatrix::identity(nbasis, nbasis);

    let results = (0..shared.nwalkers)
        .into_par_iter()
        .map(|w| {
            let (a0, b0) = walker_greens(backend, shared, w, reference).ok_or(
                EstimatorError::SingularOverlap {
                    walker: w,
                    determinant: 0,
                },
            )?;
            let ovlp0 = a0.logdet.combine(&b0.logdet);
            let (g0a, g0b) = (&a0.g, &b0.g);

            let c0 = expansion.coeffs[0].conj();
            let mut ga = g0a * c0;
            let mut gb = g0b * c0;
            let mut total = c0;
            let mut cia = CMatrix::zeros(nbasis, nbasis);
            let mut cib = CMatrix::zeros(nbasis, nbasis);

            for (c, ex) in expansion
                .coeffs
                .iter()
                .zip(expansion.excitations.iter())
                .skip(1)
            {
                let c = c.conj();
                if ex.is_reference() {
                    total += c;
                    ga += g0a * c;
                    gb += g0b * c;
                    continue;
                }
                let ratio_a = spin_ratio(g0a, &ex.cre_a, &ex.anh_a, ex.phase_a, backend);
                let ratio_b = spin_ratio(g0b, &ex.cre_b, &ex.anh_b, ex.phase_b, backend);
                let weight = c * ratio_a * ratio_b;
                total += weight;
                ga += g0a * weight;
                gb += g0b * weight;

                if ex.degree_a() > 0 {
                    let scatter = scatter_rule(ex.degree_a());
                    let weight_a = c * ex.phase_a * ratio_b;
                    scatter(&mut cia, g0a, &ex.cre_a, &ex.anh_a, weight_a, backend);
                }
                if ex.degree_b() > 0 {
                    let scatter = scatter_rule(ex.degree_b());
                    let weight_b = c * ex.phase_b * ratio_a;
                    scatter(&mut cib, g0b, &ex.cre_b, &ex.anh_b, weight_b, backend);
                }
            }

            ga += (&identity - g0a) * cia * g0a;
            gb += (&identity - g0b) * cib * g0b;

            if total.norm() == 0.0 {
                return Err(EstimatorError::SingularOverlap {
                    walker: w,
                    determinant: 0,
                });
            }
            let ovlp = ovlp0.combine(&SignedLogDet::from_value(total));
            Ok((ga / total, gb / total, ovlp))
        })
        .collect::<EstimatorResult<Vec<_>>>()?;

    for (w, (ga, gb, ovlp)) in results.into_iter().enumerate() {
        batch.ga[w] = ga;
        batch.gb[w] = gb;
        batch.log_ovlp[w] = ovlp;
    }
    Ok(batch.log_ovlp.clone())
}
