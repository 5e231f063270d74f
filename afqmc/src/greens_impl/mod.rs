//! One-particle Green's functions of walkers against a trial wavefunction.
//!
//! Two engines produce the same (overlap, Ga, Gb):
//!
//! - brute force, inverting the overlap matrix of every determinant, for single
//!   determinants and arbitrary expansions;
//! - the generalised Wick theorem for expansions of particle-hole excitations on one
//!   reference, which inverts only the reference overlap.
//!
//! With `O = phi^T psi^*` the half-rotated Green's function is `Ghalf = O^-1 phi^T`
//! (nocc x nbasis) and the full one `G = psi^* Ghalf`.

mod brute_force;
mod cofactor;
mod wicks;

pub use brute_force::{
    greens_function_multi_det, greens_function_single_det, spin_greens, SpinGreens,
    OVERLAP_THRESHOLD,
};
pub use cofactor::{
    excitation_determinant, excitation_matrix, scatter_general, scatter_rule, ScatterFn,
};
pub use wicks::greens_function_wicks;
