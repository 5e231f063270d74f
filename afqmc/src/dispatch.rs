//! Strategy selection for Green's functions and local energies.

use crate::energy_impl::{
    local_energy_cholesky, local_energy_chunked, local_energy_exact_eri, local_energy_full_g_batch,
    local_energy_pno, local_energy_stochastic_ri,
};
use crate::error::{EstimatorError, EstimatorResult};
use crate::greens_impl::{greens_function_multi_det, greens_function_single_det, greens_function_wicks};
use crate::hamiltonian::{GenericHamiltonian, Hamiltonian};
use crate::ring_impl::RingTransport;
use crate::trial::{HalfRotated, Trial, TrialWavefunction};
use crate::walkers::WalkerBatch;
use backend::{CMatrix, NumericBackend, SignedLogDet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyStrategy {
    ExactEri,
    StochasticRi { control_variate: bool },
    PnoCorrection,
    Cholesky { chunked: bool, restricted: bool },
    /// Cholesky factors contracted with full Green's functions.
    CholeskyFullG,
}

impl fmt::Display for EnergyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnergyStrategy::ExactEri => write!(f, "exact ERI"),
            EnergyStrategy::StochasticRi { control_variate } => {
                write!(f, "stochastic RI (control variate: {})", control_variate)
            }
            EnergyStrategy::PnoCorrection => write!(f, "PNO correction"),
            EnergyStrategy::Cholesky {
                chunked,
                restricted,
            } => write!(
                f,
                "{} Cholesky{}",
                if *restricted { "RHF" } else { "UHF" },
                if *chunked { " (chunked)" } else { "" }
            ),
            EnergyStrategy::CholeskyFullG => write!(f, "full-G Cholesky"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreensRoute {
    SingleDeterminant,
    BruteForceExpansion,
    Wick,
}

fn unsupported(reason: &str) -> EstimatorError {
    EstimatorError::UnsupportedStrategy(reason.to_string())
}

fn generic(ham: &Hamiltonian) -> EstimatorResult<&GenericHamiltonian> {
    match ham {
        Hamiltonian::Generic(generic) => Ok(generic),
        Hamiltonian::Hubbard(_) | Hamiltonian::HubbardHolstein(_) | Hamiltonian::Ueg(_) => Err(
            EstimatorError::UnsupportedHamiltonian(ham.name().to_string()),
        ),
    }
}

fn half_rotated(trial: &Trial) -> EstimatorResult<&HalfRotated> {
    trial
        .half_rotated
        .as_ref()
        .ok_or_else(|| unsupported("the trial has no half-rotated integrals"))
}

/// Routes walker batches to a Green's-function engine and an energy strategy.
///
/// The numeric backend is fixed at construction and shared by every evaluation.
pub struct LocalEnergyDispatcher {
    backend: Arc<dyn NumericBackend>,
}

impl LocalEnergyDispatcher {
    pub fn new(backend: Arc<dyn NumericBackend>) -> Self {
        LocalEnergyDispatcher { backend }
    }

    pub fn backend(&self) -> &dyn NumericBackend {
        self.backend.as_ref()
    }

    /// Choose the energy strategy for a hamiltonian and trial. `has_transport` tells whether
    /// a ring transport is available for chunked factors.
    pub fn select(
        ham: &Hamiltonian,
        trial: &Trial,
        has_transport: bool,
    ) -> EstimatorResult<EnergyStrategy> {
        let ham = generic(ham)?;
        let flags = &ham.flags;
        let special = flags.exact_eri || flags.stochastic_ri || flags.pno;

        match &trial.wavefunction {
            TrialWavefunction::SingleDeterminant(_) => {
                half_rotated(trial)?;
                if ham.chunked && special {
                    return Err(unsupported(
                        "chunked factors only support the Cholesky strategy",
                    ));
                }
                if flags.pno {
                    if !(flags.exact_eri && flags.control_variate) {
                        return Err(unsupported(
                            "PNO needs exact ERIs and the control variate",
                        ));
                    }
                    return Ok(EnergyStrategy::PnoCorrection);
                }
                if flags.exact_eri {
                    return Ok(EnergyStrategy::ExactEri);
                }
                if flags.stochastic_ri {
                    return Ok(EnergyStrategy::StochasticRi {
                        control_variate: flags.control_variate,
                    });
                }
                if ham.chunked && !has_transport {
                    return Err(unsupported("chunked factors need a ring transport"));
                }
                Ok(EnergyStrategy::Cholesky {
                    chunked: ham.chunked,
                    restricted: trial.restricted,
                })
            }
            TrialWavefunction::MultiDeterminantNonOrthogonal(_)
            | TrialWavefunction::MultiDeterminantOrthogonal(_) => {
                if special {
                    return Err(unsupported(
                        "ERI, stochastic RI and PNO strategies need a single determinant",
                    ));
                }
                if ham.chunked {
                    return Err(unsupported(
                        "chunked factors need a single-determinant trial",
                    ));
                }
                Ok(EnergyStrategy::CholeskyFullG)
            }
        }
    }

    pub fn greens_route(trial: &Trial) -> GreensRoute {
        match &trial.wavefunction {
            TrialWavefunction::SingleDeterminant(_) => GreensRoute::SingleDeterminant,
            TrialWavefunction::MultiDeterminantNonOrthogonal(_) => GreensRoute::BruteForceExpansion,
            TrialWavefunction::MultiDeterminantOrthogonal(_) if trial.use_wicks => GreensRoute::Wick,
            TrialWavefunction::MultiDeterminantOrthogonal(_) => GreensRoute::BruteForceExpansion,
        }
    }

    /// Fill the Green's-function buffers of `batch` and return the walker overlaps.
    pub fn greens_function(
        &self,
        batch: &mut WalkerBatch,
        trial: &Trial,
    ) -> EstimatorResult<Vec<SignedLogDet>> {
        batch.check_against(trial)?;
        let backend = self.backend();
        match &trial.wavefunction {
            TrialWavefunction::SingleDeterminant(det) => {
                greens_function_single_det(batch, det, backend)
            }
            TrialWavefunction::MultiDeterminantNonOrthogonal(expansion) => {
                greens_function_multi_det(batch, &expansion.coeffs, &expansion.determinants, backend)
            }
            TrialWavefunction::MultiDeterminantOrthogonal(expansion) if trial.use_wicks => {
                greens_function_wicks(batch, expansion, backend)
            }
            TrialWavefunction::MultiDeterminantOrthogonal(expansion) => {
                greens_function_multi_det(batch, &expansion.coeffs, &expansion.determinants, backend)
            }
        }
    }

    /// nwalkers x 3 (total, one-body, two-body) energies of a batch whose Green's functions
    /// are current.
    pub fn local_energy(
        &self,
        ham: &Hamiltonian,
        batch: &WalkerBatch,
        trial: &Trial,
        transport: Option<&dyn RingTransport>,
    ) -> EstimatorResult<CMatrix> {
        let strategy = Self::select(ham, trial, transport.is_some())?;
        let generic = generic(ham)?;
        batch.check_against(trial)?;
        debug!("local energy of {} walkers via {}", batch.nwalkers, strategy);
        let backend = self.backend();

        match strategy {
            EnergyStrategy::Cholesky {
                chunked: false,
                restricted,
            } => local_energy_cholesky(generic, batch, half_rotated(trial)?, restricted, backend),
            EnergyStrategy::Cholesky {
                chunked: true,
                restricted,
            } => {
                let transport =
                    transport.ok_or_else(|| unsupported("chunked factors need a ring transport"))?;
                let half = half_rotated(trial)?;
                local_energy_chunked(generic, batch, half, restricted, transport, backend)
            }
            EnergyStrategy::ExactEri => local_energy_exact_eri(generic, batch, half_rotated(trial)?),
            EnergyStrategy::StochasticRi { control_variate } => {
                let half = half_rotated(trial)?;
                local_energy_stochastic_ri(generic, batch, half, control_variate, backend)
            }
            EnergyStrategy::PnoCorrection => local_energy_pno(generic, batch, half_rotated(trial)?),
            EnergyStrategy::CholeskyFullG => local_energy_full_g_batch(generic, batch, backend),
        }
    }

    /// Green's functions followed by local energies; returns (overlaps, energies).
    pub fn evaluate(
        &self,
        ham: &Hamiltonian,
        batch: &mut WalkerBatch,
        trial: &Trial,
        transport: Option<&dyn RingTransport>,
    ) -> EstimatorResult<(Vec<SignedLogDet>, CMatrix)> {
        let ovlp = self.greens_function(batch, trial)?;
        let energies = self.local_energy(ham, batch, trial, transport)?;
        Ok((ovlp, energies))
    }

    /// Log the choices made for a hamiltonian and trial once.
    pub fn describe(&self, ham: &Hamiltonian, trial: &Trial, has_transport: bool) -> EstimatorResult<EnergyStrategy> {
        let strategy = Self::select(ham, trial, has_transport)?;
        info!(
            "{} hamiltonian, {} trial with {} determinant(s)",
            ham.name(),
            trial.wavefunction.name(),
            trial.wavefunction.ndets()
        );
        info!(
            "Green's function: {:?}, energy: {}, backend: {}",
            Self::greens_route(trial),
            strategy,
            self.backend.name()
        );
        Ok(strategy)
    }
}
