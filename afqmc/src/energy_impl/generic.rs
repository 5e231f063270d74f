use super::kernel::ecoul_kernel_uhf;
use super::local_energy::one_body_energy_half;
use super::EnergyAccumulator;
use crate::error::{ensure_dim, EstimatorError, EstimatorResult};
use crate::hamiltonian::{CholeskySlab, GenericHamiltonian};
use crate::trial::{HalfRotated, HalfRotatedEri, PairFactor, PnoFactors};
use crate::walkers::WalkerBatch;
use backend::random::seeded_rng;
use backend::{CMatrix, NumericBackend, RMatrix, C64};
use rand::Rng;
use rayon::prelude::*;

// ---------------------------------------------------------------------
//  Exact half-rotated ERIs
// ---------------------------------------------------------------------

/// Row-major flattening of an nocc x nbasis matrix into a column vector.
fn flatten(g: &CMatrix) -> CMatrix {
    let nbasis = g.ncols();
    CMatrix::from_fn(g.nrows() * nbasis, 1, |k, _| g[(k / nbasis, k % nbasis)])
}

/// `row_p(g1) * B * row_q(g2)^T`
fn bilinear(g1: &CMatrix, p: usize, block: &CMatrix, g2: &CMatrix, q: usize) -> C64 {
    (g1.row(p) * block * g2.row(q).transpose())[(0, 0)]
}

/// `sum v[ir, js] G1[i,r] G2[j,s]`
fn coulomb_eri(v: &CMatrix, g1: &CMatrix, g2: &CMatrix) -> C64 {
    (flatten(g1).transpose() * v * flatten(g2))[(0, 0)]
}

/// `sum v[ir, js] G[i,s] G[j,r]`
fn exchange_eri(v: &CMatrix, g: &CMatrix) -> C64 {
    let (nocc, nbasis) = g.shape();
    let mut exx = C64::new(0.0, 0.0);
    for i in 0..nocc {
        for j in 0..nocc {
            let block = v
                .view((i * nbasis, j * nbasis), (nbasis, nbasis))
                .clone_owned();
            exx += bilinear(g, j, &block, g, i);
        }
    }
    exx
}

fn eri_two_body(eri: &HalfRotatedEri, ghalfa: &CMatrix, ghalfb: &CMatrix) -> C64 {
    coulomb_eri(&eri.aa, ghalfa, ghalfa) - exchange_eri(&eri.aa, ghalfa)
        + coulomb_eri(&eri.bb, ghalfb, ghalfb)
        - exchange_eri(&eri.bb, ghalfb)
        + coulomb_eri(&eri.ab, ghalfa, ghalfb)
}

fn missing(what: &str) -> EstimatorError {
    EstimatorError::UnsupportedStrategy(format!("trial was half-rotated without {}", what))
}

/// Energy from explicitly stored half-rotated four-index integrals. The one-body part uses
/// the full Green's functions.
pub fn local_energy_exact_eri(
    ham: &GenericHamiltonian,
    batch: &WalkerBatch,
    half: &HalfRotated,
) -> EstimatorResult<CMatrix> {
    let eri = half.eris.as_ref().ok_or_else(|| missing("ERIs"))?;
    ensure_dim("ERI rows", eri.aa.nrows(), batch.nalpha * batch.nbasis)?;
    let energies: Vec<EnergyAccumulator> = (0..batch.nwalkers)
        .into_par_iter()
        .map(|w| {
            let e1 = full_one_body(ham, &batch.ga[w], &batch.gb[w]);
            let e2 = eri_two_body(eri, &batch.ghalfa[w], &batch.ghalfb[w]);
            EnergyAccumulator::new(e1, e2)
        })
        .collect();
    Ok(EnergyAccumulator::assemble(&energies))
}

fn full_one_body(ham: &GenericHamiltonian, ga: &CMatrix, gb: &CMatrix) -> C64 {
    let contract = |h: &RMatrix, g: &CMatrix| -> C64 {
        h.iter().zip(g.iter()).map(|(h, g)| *g * *h).sum()
    };
    contract(&ham.h1[0], ga) + contract(&ham.h1[1], gb) + C64::new(ham.ecore, 0.0)
}

// ---------------------------------------------------------------------
//  PNO correction
// ---------------------------------------------------------------------

fn pair_coulomb(p: &PairFactor, g1: &CMatrix, g2: &CMatrix) -> C64 {
    let theta_u = g1.row(p.i) * &p.u;
    let theta_v = &p.vt * g2.row(p.j).transpose();
    (theta_u * theta_v)[(0, 0)]
}

fn pair_exchange(p: &PairFactor, g: &CMatrix) -> C64 {
    let theta_u = g.row(p.j) * &p.u;
    let theta_v = &p.vt * g.row(p.i).transpose();
    (theta_u * theta_v)[(0, 0)]
}

/// Two-body energy from truncated pair blocks. Same-spin lists hold `i <= j`; the
/// off-diagonal pairs stand for both orderings.
fn truncated_two_body(pairs: &PnoFactors, ga: &CMatrix, gb: &CMatrix) -> C64 {
    let same_spin = |list: &[PairFactor], g: &CMatrix| -> C64 {
        list.iter()
            .map(|p| {
                let c = if p.i == p.j { 1.0 } else { 2.0 };
                (pair_coulomb(p, g, g) - pair_exchange(p, g)) * c
            })
            .sum()
    };
    let ab: C64 = pairs.ab.iter().map(|p| pair_coulomb(p, ga, gb)).sum();
    same_spin(&pairs.aa, ga) + same_spin(&pairs.bb, gb) + ab
}

/// Exact reference two-body energy plus the truncated-pair difference between the walker
/// and the reference: `E2(G0) + E2_pno(G) - E2_pno(G0)`.
pub fn local_energy_pno(
    ham: &GenericHamiltonian,
    batch: &WalkerBatch,
    half: &HalfRotated,
) -> EstimatorResult<CMatrix> {
    let pairs = half.pno.as_ref().ok_or_else(|| missing("PNO pair factors"))?;
    let reference = half.ecoul0 - half.exxa0 - half.exxb0;
    let reference_pno = truncated_two_body(pairs, &half.ghalf0a, &half.ghalf0b);
    let energies: Vec<EnergyAccumulator> = (0..batch.nwalkers)
        .into_par_iter()
        .map(|w| {
            let e1 = full_one_body(ham, &batch.ga[w], &batch.gb[w]);
            let walker_pno = truncated_two_body(pairs, &batch.ghalfa[w], &batch.ghalfb[w]);
            EnergyAccumulator::new(e1, reference + walker_pno - reference_pno)
        })
        .collect();
    Ok(EnergyAccumulator::assemble(&energies))
}

// ---------------------------------------------------------------------
//  Stochastic resolution of identity
// ---------------------------------------------------------------------

/// Random +-1 combinations `L_s = sum_x xi_sx L_x` of the factors of one spin.
///
/// Since `E[xi_sx xi_sy] = delta_xy`, the sample mean of the exchange built from `L_s`
/// is an unbiased estimate of the exact exchange.
#[derive(Debug, Clone)]
pub struct StochasticProjection {
    factors: Vec<CMatrix>,
}

impl StochasticProjection {
    pub fn new(slab: &CholeskySlab, xi: &CMatrix) -> EstimatorResult<Self> {
        ensure_dim("projection width", xi.ncols(), slab.naux())?;
        let (nocc, nbasis) = (slab.nocc(), slab.nbasis());
        let projected = xi * slab.packed();
        let factors = projected
            .row_iter()
            .map(|row| CMatrix::from_fn(nocc, nbasis, |i, r| row[i * nbasis + r]))
            .collect();
        Ok(StochasticProjection { factors })
    }

    /// nsamples x naux matrix of independent +-1 entries.
    pub fn rademacher(nsamples: usize, naux: usize, seed: u64) -> CMatrix {
        let mut rng = seeded_rng(seed);
        CMatrix::from_fn(nsamples, naux, |_, _| {
            if rng.gen_bool(0.5) {
                C64::new(1.0, 0.0)
            } else {
                C64::new(-1.0, 0.0)
            }
        })
    }

    pub fn nsamples(&self) -> usize {
        self.factors.len()
    }

    /// Sampled `0.5 sum_x sum_ij T_ij T_ji` for one half Green's function.
    pub fn exchange(&self, ghalf: &CMatrix, backend: &dyn NumericBackend) -> C64 {
        if self.factors.is_empty() {
            return C64::new(0.0, 0.0);
        }
        let g_t = ghalf.transpose();
        let sum: C64 = self
            .factors
            .iter()
            .map(|l| backend.contract_transpose(&(l * &g_t)))
            .sum();
        sum * (0.5 / self.factors.len() as f64)
    }
}

/// Exact Coulomb energy with sampled exchange.
///
/// With the control variate the same samples are evaluated on the reference Green's
/// functions and the difference to the exact reference exchange is removed, so a walker
/// equal to the reference gets its exact energy back.
pub fn local_energy_stochastic_ri(
    ham: &GenericHamiltonian,
    batch: &WalkerBatch,
    half: &HalfRotated,
    control_variate: bool,
    backend: &dyn NumericBackend,
) -> EstimatorResult<CMatrix> {
    let slab = &half.rchol;
    let xi = StochasticProjection::rademacher(ham.flags.nsamples, slab.naux(), ham.flags.sri_seed);
    let proj_a = StochasticProjection::new(&slab.alpha, &xi)?;
    let proj_b = StochasticProjection::new(&slab.beta, &xi)?;

    let e1 = one_body_energy_half(half, batch, ham.ecore, false)?;
    let ecoul = ecoul_kernel_uhf(slab, &batch.ghalfa, &batch.ghalfb)?;
    let shift = if control_variate {
        let exact0 = half.exxa0 + half.exxb0;
        exact0
            - proj_a.exchange(&half.ghalf0a, backend)
            - proj_b.exchange(&half.ghalf0b, backend)
    } else {
        C64::new(0.0, 0.0)
    };

    let exx: Vec<C64> = (0..batch.nwalkers)
        .into_par_iter()
        .map(|w| {
            proj_a.exchange(&batch.ghalfa[w], backend)
                + proj_b.exchange(&batch.ghalfb[w], backend)
                + shift
        })
        .collect();
    let e2: Vec<C64> = ecoul.iter().zip(exx.iter()).map(|(j, k)| j - k).collect();
    Ok(EnergyAccumulator::from_columns(&e1, &e2))
}
