//! Numeric backend for the AFQMC estimators.
//!
//! Dense complex linear algebra on nalgebra matrices, the [`NumericBackend`] capability
//! injected into the estimators, and seeded generators for synthetic systems.

pub mod linalg;
pub mod random;
#[cfg(test)]
mod linalg_test;

pub use linalg::{
    contract_transpose, from_parts, is_real, laplace_determinant, minor, split_parts,
    to_complex, BackendKind, CMatrix, CpuBackend, NumericBackend, RMatrix, SignedLogDet, C64,
};
