//! AFQMC Local Energy Command-Line Interface
//!
//! Builds a seeded synthetic system from a YAML configuration and evaluates walker
//! Green's functions and local energies through the estimator dispatcher.

use color_eyre::eyre::Result;

mod app;
mod config;
mod io;

use app::EstimatorApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    EstimatorApplication::from_cli()?.run()
}
