pub mod dispatch;
pub mod energy_impl;
pub mod error;
pub mod greens_impl;
pub mod hamiltonian;
pub mod ring_impl;
pub mod trial;
pub mod walkers;

pub use dispatch::{EnergyStrategy, GreensRoute, LocalEnergyDispatcher};
pub use error::{EstimatorError, EstimatorResult};
