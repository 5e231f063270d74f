//! Configuration management for local-energy runs
//!
//! This module handles the YAML configuration of a synthetic AFQMC system, its
//! defaults, and the command-line overrides.
//!
//! # Usage
//!
//! ```yaml
//! system:
//!   nbasis: 10
//!   nalpha: 3
//!   nbeta: 3
//! hamiltonian:
//!   naux: 24
//!   chunks: 3
//! trial:
//!   kind: orthogonal
//!   ndets: 12
//!   max_excitation: 3
//! walkers:
//!   nwalkers: 8
//! ```
//!
//! Every field is optional; [`Config::with_defaults`] fills in whatever is missing.

mod args;

pub use args::Args;

use backend::BackendKind;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub system: SystemParams,
    #[serde(default)]
    pub hamiltonian: HamiltonianParams,
    #[serde(default)]
    pub trial: TrialParams,
    #[serde(default)]
    pub walkers: WalkerParams,
    pub backend: Option<BackendKind>,
}

/// Basis size and electron counts
#[derive(Debug, Deserialize, Serialize)]
pub struct SystemParams {
    pub nbasis: Option<usize>,
    pub nalpha: Option<usize>,
    pub nbeta: Option<usize>,
}

impl Default for SystemParams {
    fn default() -> Self {
        SystemParams {
            nbasis: Some(8),
            nalpha: Some(3),
            nbeta: Some(3),
        }
    }
}

impl SystemParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.nbasis.is_none() {
            self.nbasis = defaults.nbasis;
        }
        if self.nalpha.is_none() {
            self.nalpha = defaults.nalpha;
        }
        if self.nbeta.is_none() {
            self.nbeta = defaults.nbeta;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HamiltonianKind {
    Generic,
    Hubbard,
    HubbardHolstein,
    Ueg,
}

/// Interaction and energy-strategy parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct HamiltonianParams {
    pub kind: Option<HamiltonianKind>,
    pub naux: Option<usize>,
    pub ecore: Option<f64>,
    /// Magnitude of the entries of the synthetic Cholesky factors.
    pub interaction_scale: Option<f64>,
    pub exact_eri: Option<bool>,
    pub stochastic_ri: Option<bool>,
    pub control_variate: Option<bool>,
    pub pno: Option<bool>,
    pub nsamples: Option<usize>,
    pub pno_threshold: Option<f64>,
    pub sri_seed: Option<u64>,
    /// Number of ring processes the factors are split over (1 = unchunked).
    pub chunks: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for HamiltonianParams {
    fn default() -> Self {
        HamiltonianParams {
            kind: Some(HamiltonianKind::Generic),
            naux: Some(16),
            ecore: Some(0.0),
            interaction_scale: Some(0.3),
            exact_eri: Some(false),
            stochastic_ri: Some(false),
            control_variate: Some(false),
            pno: Some(false),
            nsamples: Some(20),
            pno_threshold: Some(1e-8),
            sri_seed: Some(7),
            chunks: Some(1),
            seed: Some(1),
        }
    }
}

impl HamiltonianParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.kind.is_none() {
            self.kind = defaults.kind;
        }
        if self.naux.is_none() {
            self.naux = defaults.naux;
        }
        if self.ecore.is_none() {
            self.ecore = defaults.ecore;
        }
        if self.interaction_scale.is_none() {
            self.interaction_scale = defaults.interaction_scale;
        }
        if self.exact_eri.is_none() {
            self.exact_eri = defaults.exact_eri;
        }
        if self.stochastic_ri.is_none() {
            self.stochastic_ri = defaults.stochastic_ri;
        }
        if self.control_variate.is_none() {
            self.control_variate = defaults.control_variate;
        }
        if self.pno.is_none() {
            self.pno = defaults.pno;
        }
        if self.nsamples.is_none() {
            self.nsamples = defaults.nsamples;
        }
        if self.pno_threshold.is_none() {
            self.pno_threshold = defaults.pno_threshold;
        }
        if self.sri_seed.is_none() {
            self.sri_seed = defaults.sri_seed;
        }
        if self.chunks.is_none() {
            self.chunks = defaults.chunks;
        }
        if self.seed.is_none() {
            self.seed = defaults.seed;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialKind {
    Single,
    NonOrthogonal,
    Orthogonal,
}

/// Trial wavefunction parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct TrialParams {
    pub kind: Option<TrialKind>,
    pub ndets: Option<usize>,
    pub max_excitation: Option<usize>,
    pub wicks: Option<bool>,
    pub restricted: Option<bool>,
    pub complex_orbitals: Option<bool>,
    pub seed: Option<u64>,
}

impl Default for TrialParams {
    fn default() -> Self {
        TrialParams {
            kind: Some(TrialKind::Single),
            ndets: Some(1),
            max_excitation: Some(2),
            wicks: Some(true),
            restricted: Some(false),
            complex_orbitals: Some(false),
            seed: Some(2),
        }
    }
}

impl TrialParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.kind.is_none() {
            self.kind = defaults.kind;
        }
        if self.ndets.is_none() {
            self.ndets = defaults.ndets;
        }
        if self.max_excitation.is_none() {
            self.max_excitation = defaults.max_excitation;
        }
        if self.wicks.is_none() {
            self.wicks = defaults.wicks;
        }
        if self.restricted.is_none() {
            self.restricted = defaults.restricted;
        }
        if self.complex_orbitals.is_none() {
            self.complex_orbitals = defaults.complex_orbitals;
        }
        if self.seed.is_none() {
            self.seed = defaults.seed;
        }
        self
    }
}

/// Walker batch parameters
#[derive(Debug, Deserialize, Serialize)]
pub struct WalkerParams {
    pub nwalkers: Option<usize>,
    pub seed: Option<u64>,
}

impl Default for WalkerParams {
    fn default() -> Self {
        WalkerParams {
            nwalkers: Some(4),
            seed: Some(3),
        }
    }
}

impl WalkerParams {
    /// Apply default values to any missing parameters
    pub fn with_defaults(mut self) -> Self {
        let defaults = Self::default();
        if self.nwalkers.is_none() {
            self.nwalkers = defaults.nwalkers;
        }
        if self.seed.is_none() {
            self.seed = defaults.seed;
        }
        self
    }
}

impl Config {
    /// Apply defaults to all configuration sections
    pub fn with_defaults(mut self) -> Self {
        self.system = self.system.with_defaults();
        self.hamiltonian = self.hamiltonian.with_defaults();
        self.trial = self.trial.with_defaults();
        self.walkers = self.walkers.with_defaults();
        if self.backend.is_none() {
            self.backend = Some(BackendKind::default());
        }
        self
    }

    /// Fold the command-line overrides into the configuration
    pub fn apply_overrides(mut self, args: &Args) -> Self {
        if let Some(nwalkers) = args.nwalkers {
            self.walkers.nwalkers = Some(nwalkers);
        }
        if let Some(seed) = args.seed {
            self.walkers.seed = Some(seed);
        }
        if let Some(chunks) = args.chunks {
            self.hamiltonian.chunks = Some(chunks);
        }
        if args.wicks {
            self.trial.wicks = Some(true);
        }
        if args.brute_force {
            self.trial.wicks = Some(false);
        }
        self
    }

    pub fn nbasis(&self) -> usize {
        self.system.nbasis.unwrap_or(8)
    }

    pub fn nalpha(&self) -> usize {
        self.system.nalpha.unwrap_or(3)
    }

    pub fn nbeta(&self) -> usize {
        self.system.nbeta.unwrap_or(3)
    }

    pub fn chunks(&self) -> usize {
        self.hamiltonian.chunks.unwrap_or(1)
    }

    pub fn nwalkers(&self) -> usize {
        self.walkers.nwalkers.unwrap_or(4)
    }

    pub fn backend(&self) -> BackendKind {
        self.backend.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_empty_document_gets_every_default() {
        let config: Config = serde_yml::from_str("{}").unwrap();
        let config = config.with_defaults();
        assert_eq!(config.nbasis(), 8);
        assert_eq!(config.hamiltonian.kind, Some(HamiltonianKind::Generic));
        assert_eq!(config.hamiltonian.pno_threshold, Some(1e-8));
        assert_eq!(config.trial.kind, Some(TrialKind::Single));
        assert_eq!(config.trial.wicks, Some(true));
        assert_eq!(config.nwalkers(), 4);
        assert_eq!(config.backend, Some(BackendKind::Cpu));
    }

    #[test]
    fn test_partial_sections_keep_given_values() {
        let yaml = r#"
system:
  nbasis: 12
hamiltonian:
  kind: hubbard_holstein
  exact_eri: true
trial:
  kind: non_orthogonal
  ndets: 5
backend: cpu
"#;
        let config = serde_yml::from_str::<Config>(yaml).unwrap().with_defaults();
        assert_eq!(config.nbasis(), 12);
        assert_eq!(config.nalpha(), 3);
        assert_eq!(config.hamiltonian.kind, Some(HamiltonianKind::HubbardHolstein));
        assert_eq!(config.hamiltonian.exact_eri, Some(true));
        assert_eq!(config.hamiltonian.naux, Some(16));
        assert_eq!(config.trial.kind, Some(TrialKind::NonOrthogonal));
        assert_eq!(config.trial.ndets, Some(5));
        assert_eq!(config.trial.max_excitation, Some(2));
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let yaml = "trial:\n  kind: selected_ci\n";
        assert!(serde_yml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_command_line_overrides() {
        let args = Args::parse_from([
            "afqmc",
            "--nwalkers",
            "16",
            "--chunks",
            "3",
            "--seed",
            "99",
            "--brute-force",
        ]);
        let config = Config::default().with_defaults().apply_overrides(&args);
        assert_eq!(config.nwalkers(), 16);
        assert_eq!(config.chunks(), 3);
        assert_eq!(config.walkers.seed, Some(99));
        assert_eq!(config.trial.wicks, Some(false));
    }

    #[test]
    fn test_wick_flags_conflict() {
        assert!(Args::try_parse_from(["afqmc", "--wicks", "--brute-force"]).is_err());
    }
}
