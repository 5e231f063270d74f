//! Command-line argument parsing for local-energy runs

use clap::Parser;

/// AFQMC local energies and Green's functions of a synthetic walker batch
#[derive(Parser, Debug)]
#[command(name = "afqmc")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    pub config_file: Option<String>,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Write the per-walker energy table to this file
    #[arg(long)]
    pub energies: Option<String>,

    /// Maximum log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Override the number of walkers
    #[arg(long)]
    pub nwalkers: Option<usize>,

    /// Override the number of ring processes the Cholesky factors are split over
    #[arg(long)]
    pub chunks: Option<usize>,

    /// Override the walker seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Evaluate the chunked energy over the MPI world, one Cholesky slab per rank
    #[cfg(feature = "mpi")]
    #[arg(long)]
    pub mpi: bool,

    /// Evaluate orthogonal expansions with Wick's theorem
    #[arg(long, conflicts_with = "brute_force")]
    pub wicks: bool,

    /// Evaluate orthogonal expansions determinant by determinant
    #[arg(long)]
    pub brute_force: bool,
}
