use thiserror::Error;

/// Failures surfaced by Green's-function and local-energy evaluation.
///
/// Every variant is fatal for the call that produced it. The brute-force multi-determinant
/// path drops singular determinants and only reports `SingularOverlap` once nothing is left.
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("singular overlap for walker {walker}, determinant {determinant}")]
    SingularOverlap { walker: usize, determinant: usize },
    #[error("unsupported hamiltonian: {0}")]
    UnsupportedHamiltonian(String),
    #[error("unsupported strategy: {0}")]
    UnsupportedStrategy(String),
    #[error("invalid trial wavefunction: {0}")]
    InvalidTrial(String),
    #[error("communication failure: {0}")]
    Communication(String),
    #[error("process group size mismatch: expected {expected}, got {actual}")]
    GroupSize { expected: usize, actual: usize },
}

pub type EstimatorResult<T> = Result<T, EstimatorError>;

/// Fails with `ShapeMismatch` unless `actual == expected`.
pub(crate) fn ensure_dim(what: &str, actual: usize, expected: usize) -> EstimatorResult<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(EstimatorError::ShapeMismatch(format!(
            "{} is {} but {} was expected",
            what, actual, expected
        )))
    }
}
