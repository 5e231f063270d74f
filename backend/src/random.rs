//! Seeded generators for synthetic walkers, trials and Cholesky factors.

use crate::linalg::{CMatrix, RMatrix, C64};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_real_matrix<R: Rng>(rng: &mut R, rows: usize, cols: usize) -> RMatrix {
    RMatrix::from_fn(rows, cols, |_, _| rng.sample(StandardNormal))
}

pub fn random_complex_matrix<R: Rng>(rng: &mut R, rows: usize, cols: usize) -> CMatrix {
    CMatrix::from_fn(rows, cols, |_, _| {
        C64::new(rng.sample(StandardNormal), rng.sample(StandardNormal))
    })
}

/// `nocc` orthonormal columns in a space of dimension `nbasis`.
pub fn random_orbitals<R: Rng>(rng: &mut R, nbasis: usize, nocc: usize) -> CMatrix {
    assert!(nocc <= nbasis, "cannot fit {} orbitals in {} functions", nocc, nbasis);
    random_complex_matrix(rng, nbasis, nocc).qr().q()
}

/// Same as [`random_orbitals`] but purely real.
pub fn random_real_orbitals<R: Rng>(rng: &mut R, nbasis: usize, nocc: usize) -> RMatrix {
    assert!(nocc <= nbasis, "cannot fit {} orbitals in {} functions", nocc, nbasis);
    random_real_matrix(rng, nbasis, nocc).qr().q()
}

pub fn random_symmetric_matrix<R: Rng>(rng: &mut R, n: usize) -> RMatrix {
    let a = random_real_matrix(rng, n, n);
    (&a + a.transpose()) * 0.5
}

/// `naux` symmetric factors L_x with entries of order `scale`, mimicking a Cholesky
/// decomposition of the electron-repulsion integrals.
pub fn random_cholesky_factors<R: Rng>(
    rng: &mut R,
    nbasis: usize,
    naux: usize,
    scale: f64,
) -> Vec<RMatrix> {
    (0..naux)
        .map(|_| random_symmetric_matrix(rng, nbasis) * scale)
        .collect()
}
