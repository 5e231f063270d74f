extern crate nalgebra as na;

use crate::error::{ensure_dim, EstimatorError, EstimatorResult};
use crate::trial::Trial;
use backend::random::random_orbitals;
use backend::{CMatrix, SignedLogDet, C64};
use rand::Rng;

/// Alpha and beta orbitals closer than this count as the same closed shell.
pub const CLOSED_SHELL_TOLERANCE: f64 = 1e-12;

/// Walker orbitals and the Green's-function buffers filled in for them.
///
/// `phi[w]` is nbasis x (nalpha + nbeta) with the alpha columns first; the spin blocks are
/// only ever handed out as column views. `ga`/`gb` are nbasis x nbasis, `ghalfa` is
/// nalpha x nbasis and `ghalfb` nbeta x nbasis. Overlaps with the trial are kept as
/// sign and log-magnitude. Every buffer of walker `w` is written by exactly one
/// Green's-function evaluation.
#[derive(Debug, Clone)]
pub struct WalkerBatch {
    pub nwalkers: usize,
    pub nbasis: usize,
    pub nalpha: usize,
    pub nbeta: usize,
    pub phi: Vec<CMatrix>,
    pub ga: Vec<CMatrix>,
    pub gb: Vec<CMatrix>,
    pub ghalfa: Vec<CMatrix>,
    pub ghalfb: Vec<CMatrix>,
    pub log_ovlp: Vec<SignedLogDet>,
}

impl WalkerBatch {
    pub fn new(phi: Vec<CMatrix>, nalpha: usize, nbeta: usize) -> EstimatorResult<Self> {
        let nwalkers = phi.len();
        let nbasis = phi.first().map_or(0, |p| p.nrows());
        for p in phi.iter() {
            ensure_dim("walker basis size", p.nrows(), nbasis)?;
            ensure_dim("walker orbital count", p.ncols(), nalpha + nbeta)?;
        }
        let zeros = |rows: usize, cols: usize| vec![CMatrix::zeros(rows, cols); nwalkers];
        Ok(WalkerBatch {
            nwalkers,
            nbasis,
            nalpha,
            nbeta,
            ga: zeros(nbasis, nbasis),
            gb: zeros(nbasis, nbasis),
            ghalfa: zeros(nalpha, nbasis),
            ghalfb: zeros(nbeta, nbasis),
            log_ovlp: vec![SignedLogDet::zero(); nwalkers],
            phi,
        })
    }

    /// Walkers with random orthonormal complex orbitals per spin.
    pub fn random<R: Rng>(
        rng: &mut R,
        nwalkers: usize,
        nbasis: usize,
        nalpha: usize,
        nbeta: usize,
    ) -> EstimatorResult<Self> {
        let phi = (0..nwalkers)
            .map(|_| {
                let a = random_orbitals(rng, nbasis, nalpha);
                let b = random_orbitals(rng, nbasis, nbeta);
                join_spins(&a, &b)
            })
            .collect();
        WalkerBatch::new(phi, nalpha, nbeta)
    }

    /// Closed-shell walkers whose beta orbitals repeat the alpha ones.
    pub fn random_restricted<R: Rng>(
        rng: &mut R,
        nwalkers: usize,
        nbasis: usize,
        nocc: usize,
    ) -> EstimatorResult<Self> {
        let phi = (0..nwalkers)
            .map(|_| {
                let a = random_orbitals(rng, nbasis, nocc);
                join_spins(&a, &a)
            })
            .collect();
        WalkerBatch::new(phi, nocc, nocc)
    }

    /// `nwalkers` copies of the trial reference determinant.
    pub fn from_trial(trial: &Trial, nwalkers: usize) -> EstimatorResult<Self> {
        let reference = trial.wavefunction.reference();
        let phi = vec![join_spins(&reference.alpha, &reference.beta); nwalkers];
        WalkerBatch::new(phi, trial.nalpha, trial.nbeta)
    }

    pub fn alpha(&self, w: usize) -> na::DMatrixView<'_, C64> {
        self.phi[w].columns(0, self.nalpha)
    }

    pub fn beta(&self, w: usize) -> na::DMatrixView<'_, C64> {
        self.phi[w].columns(self.nalpha, self.nbeta)
    }

    /// Fails unless every walker carries the same alpha and beta orbitals.
    pub fn check_closed_shell(&self) -> EstimatorResult<()> {
        if self.nalpha != self.nbeta {
            return Err(EstimatorError::UnsupportedStrategy(format!(
                "restricted energy of walkers with {} alpha and {} beta electrons",
                self.nalpha, self.nbeta
            )));
        }
        for w in 0..self.nwalkers {
            let open_shell = self
                .alpha(w)
                .iter()
                .zip(self.beta(w).iter())
                .any(|(a, b)| (a - b).norm() > CLOSED_SHELL_TOLERANCE);
            if open_shell {
                return Err(EstimatorError::UnsupportedStrategy(format!(
                    "restricted energy of walker {} whose alpha and beta orbitals differ",
                    w
                )));
            }
        }
        Ok(())
    }

    /// Fails unless the batch and the trial agree on basis size and electron counts.
    pub fn check_against(&self, trial: &Trial) -> EstimatorResult<()> {
        ensure_dim("walker basis size", self.nbasis, trial.nbasis)?;
        ensure_dim("walker alpha count", self.nalpha, trial.nalpha)?;
        ensure_dim("walker beta count", self.nbeta, trial.nbeta)
    }
}

fn join_spins(alpha: &CMatrix, beta: &CMatrix) -> CMatrix {
    let nalpha = alpha.ncols();
    CMatrix::from_fn(alpha.nrows(), nalpha + beta.ncols(), |p, k| {
        if k < nalpha {
            alpha[(p, k)]
        } else {
            beta[(p, k - nalpha)]
        }
    })
}
