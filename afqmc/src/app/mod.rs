mod report;
mod system;

pub use system::{build_system, SyntheticSystem};

use self::report::{report_energies, report_ring_check};
use crate::config::{Args, Config};
use crate::io::{setup_output, write_energy_table};
use afqmc::hamiltonian::Hamiltonian;
use afqmc::ring_impl::{ChannelTransport, RingTransport};
use afqmc::LocalEnergyDispatcher;
use backend::CMatrix;
use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};
use std::fs::{self, File};
use std::thread;
use tracing::{info, warn};

pub struct EstimatorApplication {
    args: Args,
    config: Config,
}

impl EstimatorApplication {
    pub fn from_cli() -> Result<Self> {
        let args = Args::parse();
        let config = load_config(&args)?;
        Ok(Self { args, config })
    }

    pub fn run(self) -> Result<()> {
        #[cfg(feature = "mpi")]
        if self.args.mpi {
            return self.run_mpi();
        }
        setup_output(self.args.output.as_ref(), &self.args.log_level)?;
        info!("Configuration loaded:\n{:?}", self.config);

        let dispatcher = LocalEnergyDispatcher::new(self.config.backend().instantiate());
        let mut system = build_system(&self.config, dispatcher.backend())?;

        dispatcher
            .describe(&system.hamiltonian, &system.trial, false)
            .wrap_err("No local-energy strategy for this system")?;
        let (ovlp, energies) = dispatcher
            .evaluate(
                &system.hamiltonian,
                &mut system.walkers,
                &system.trial,
                None,
            )
            .wrap_err("Local energy evaluation failed")?;
        report_energies(&ovlp, &energies);

        if let Some(path) = &self.args.energies {
            let mut file = File::create(path)
                .wrap_err_with(|| format!("Unable to create energy table: {}", path))?;
            write_energy_table(&mut file, &ovlp, &energies)?;
            info!("Energy table written to: {}", path);
        }

        let chunks = self.config.chunks();
        if chunks > 1 {
            if let Some(ring) = run_chunked(&dispatcher, &system, chunks)? {
                report_ring_check(chunks, &energies, &ring);
            }
        }

        Ok(())
    }

    /// Every rank builds the same seeded system and keeps one slab of the Cholesky factors;
    /// rank 0 reports the ring-reduced energies.
    #[cfg(feature = "mpi")]
    fn run_mpi(self) -> Result<()> {
        use afqmc::ring_impl::MpiTransport;

        let transport = MpiTransport::init()?;
        let topology = transport.topology();
        if topology.rank == 0 {
            setup_output(self.args.output.as_ref(), &self.args.log_level)?;
        } else {
            setup_output(None, "error")?;
        }
        info!("Configuration loaded:\n{:?}", self.config);

        let dispatcher = LocalEnergyDispatcher::new(self.config.backend().instantiate());
        let mut system = build_system(&self.config, dispatcher.backend())?;
        let Hamiltonian::Generic(generic) = &system.hamiltonian else {
            return Err(eyre!(
                "MPI runs need a generic hamiltonian, got {}",
                system.hamiltonian.name()
            ));
        };
        let chunked = Hamiltonian::Generic(generic.clone().with_chunking(true));
        dispatcher
            .describe(&chunked, &system.trial, true)
            .wrap_err("No chunked strategy for this system")?;

        let ovlp = dispatcher
            .greens_function(&mut system.walkers, &system.trial)
            .wrap_err("Green's function evaluation failed")?;
        let ring: &dyn RingTransport = &transport;
        let energies = dispatcher
            .local_energy(&chunked, &system.walkers, &system.trial, Some(ring))
            .wrap_err_with(|| format!("Ring rank {} failed", topology.rank))?;
        if topology.rank == 0 {
            info!("\nCholesky factors split over {} MPI ranks", topology.size);
            report_energies(&ovlp, &energies);
        }
        Ok(())
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config_file {
        Some(path) => {
            let config_content = fs::read_to_string(path)
                .wrap_err_with(|| format!("Unable to read configuration file: {}", path))?;
            serde_yml::from_str::<Config>(&config_content)
                .wrap_err("Failed to parse configuration file")?
        }
        None => Config::default(),
    };
    Ok(config.with_defaults().apply_overrides(args))
}

/// Evaluate the energies again with the Cholesky factors split over an in-process ring of
/// `chunks` threads. `None` when the system has no chunked strategy.
fn run_chunked(
    dispatcher: &LocalEnergyDispatcher,
    system: &SyntheticSystem,
    chunks: usize,
) -> Result<Option<Vec<CMatrix>>> {
    let Hamiltonian::Generic(generic) = &system.hamiltonian else {
        warn!("Skipping the chunked check: {} hamiltonian", system.hamiltonian.name());
        return Ok(None);
    };
    let chunked = Hamiltonian::Generic(generic.clone().with_chunking(true));
    if let Err(err) = LocalEnergyDispatcher::select(&chunked, &system.trial, true) {
        warn!("Skipping the chunked check: {}", err);
        return Ok(None);
    }

    info!("\nRunning the chunked energy on a ring of {} threads", chunks);
    let transports = ChannelTransport::ring(chunks)?;
    let (ham, walkers, trial) = (&chunked, &system.walkers, &system.trial);
    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = transports
            .into_iter()
            .map(|transport| {
                scope.spawn(move || {
                    let transport: &dyn RingTransport = &transport;
                    dispatcher.local_energy(ham, walkers, trial, Some(transport))
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join()).collect::<Vec<_>>()
    });

    outcomes
        .into_iter()
        .enumerate()
        .map(|(rank, outcome)| match outcome {
            Ok(result) => result.wrap_err_with(|| format!("Ring rank {} failed", rank)),
            Err(_) => Err(eyre!("Ring rank {} panicked", rank)),
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

#[cfg(test)]
mod tests {
    use super::report::max_ring_deviation;
    use super::*;
    use std::path::PathBuf;

    fn example_config(filename: &str) -> Config {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("example")
            .join(filename);
        let content = fs::read_to_string(&path).unwrap();
        serde_yml::from_str::<Config>(&content)
            .unwrap()
            .with_defaults()
    }

    fn evaluate(config: &Config) -> (LocalEnergyDispatcher, SyntheticSystem, CMatrix) {
        let dispatcher = LocalEnergyDispatcher::new(config.backend().instantiate());
        let mut system = build_system(config, dispatcher.backend()).unwrap();
        let (_, energies) = dispatcher
            .evaluate(&system.hamiltonian, &mut system.walkers, &system.trial, None)
            .unwrap();
        (dispatcher, system, energies)
    }

    #[test]
    fn test_example_configurations_evaluate() {
        for filename in [
            "single_det.yaml",
            "wick_expansion.yaml",
            "chunked_ring.yaml",
            "stochastic_ri.yaml",
        ] {
            let config = example_config(filename);
            let (_, system, energies) = evaluate(&config);
            assert_eq!(energies.nrows(), system.walkers.nwalkers, "{}", filename);
            assert!(
                energies.iter().all(|e| e.re.is_finite() && e.im.is_finite()),
                "{}: non-finite energy",
                filename
            );
        }
    }

    #[test]
    fn test_chunked_example_matches_single_process() {
        let config = example_config("chunked_ring.yaml");
        assert_eq!(config.chunks(), 3);
        let (dispatcher, system, energies) = evaluate(&config);
        let ring = run_chunked(&dispatcher, &system, config.chunks())
            .unwrap()
            .unwrap();
        assert_eq!(ring.len(), 3);
        assert!(max_ring_deviation(&energies, &ring) < 1e-10);
    }

    #[test]
    fn test_chunked_check_is_skipped_for_expansions() {
        let config = example_config("wick_expansion.yaml");
        let (dispatcher, system, _) = evaluate(&config);
        assert!(run_chunked(&dispatcher, &system, 2).unwrap().is_none());
    }
}
