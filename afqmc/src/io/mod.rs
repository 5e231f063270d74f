//! Input/Output operations for local-energy runs
//!
//! This module handles logging setup and the per-walker energy table.

mod output;

pub use output::{setup_output, write_energy_table};
