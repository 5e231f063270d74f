use crate::config::{Config, HamiltonianKind, TrialKind};
use afqmc::hamiltonian::{
    EnergyFlags, GenericHamiltonian, Hamiltonian, LatticeModel, PlaneWaveModel,
};
use afqmc::trial::{
    Determinant, DeterminantExpansion, ParticleHoleExpansion, Trial, TrialWavefunction,
};
use afqmc::walkers::WalkerBatch;
use backend::random::{
    random_cholesky_factors, random_complex_matrix, random_orbitals, random_real_orbitals,
    random_symmetric_matrix, seeded_rng,
};
use backend::{to_complex, NumericBackend, C64};
use color_eyre::eyre::{eyre, Result, WrapErr};
use rand::seq::index::sample;
use rand::Rng;
use tracing::info;

/// Everything one local-energy evaluation needs, generated from seeds.
pub struct SyntheticSystem {
    pub hamiltonian: Hamiltonian,
    pub trial: Trial,
    pub walkers: WalkerBatch,
}

pub fn build_system(config: &Config, backend: &dyn NumericBackend) -> Result<SyntheticSystem> {
    let hamiltonian = build_hamiltonian(config)?;
    let mut trial = build_trial(config)?;

    if let (Hamiltonian::Generic(generic), TrialWavefunction::SingleDeterminant(_)) =
        (&hamiltonian, &trial.wavefunction)
    {
        trial
            .half_rotate(generic, backend)
            .wrap_err("Failed to half-rotate the integrals")?;
    }

    let nwalkers = config.nwalkers();
    let mut rng = seeded_rng(config.walkers.seed.unwrap_or(3));
    let walkers = if trial.restricted {
        WalkerBatch::random_restricted(&mut rng, nwalkers, trial.nbasis, trial.nalpha)
    } else {
        WalkerBatch::random(&mut rng, nwalkers, trial.nbasis, trial.nalpha, trial.nbeta)
    }
    .wrap_err("Failed to generate walkers")?;

    info!(
        "Synthetic system: nbasis = {}, nalpha = {}, nbeta = {}, {} walkers",
        trial.nbasis, trial.nalpha, trial.nbeta, nwalkers
    );
    Ok(SyntheticSystem {
        hamiltonian,
        trial,
        walkers,
    })
}

pub fn build_hamiltonian(config: &Config) -> Result<Hamiltonian> {
    let params = &config.hamiltonian;
    let nbasis = config.nbasis();
    let lattice = || LatticeModel {
        nx: nbasis,
        ny: 1,
        hopping: 1.0,
        interaction: 4.0,
    };

    match params.kind.unwrap_or(HamiltonianKind::Generic) {
        HamiltonianKind::Generic => {
            let mut rng = seeded_rng(params.seed.unwrap_or(1));
            let h1 = random_symmetric_matrix(&mut rng, nbasis);
            let chol = random_cholesky_factors(
                &mut rng,
                nbasis,
                params.naux.unwrap_or(16),
                params.interaction_scale.unwrap_or(0.3),
            );
            let defaults = EnergyFlags::default();
            let flags = EnergyFlags {
                exact_eri: params.exact_eri.unwrap_or(false),
                stochastic_ri: params.stochastic_ri.unwrap_or(false),
                control_variate: params.control_variate.unwrap_or(false),
                pno: params.pno.unwrap_or(false),
                nsamples: params.nsamples.unwrap_or(defaults.nsamples),
                pno_threshold: params.pno_threshold.unwrap_or(defaults.pno_threshold),
                sri_seed: params.sri_seed.unwrap_or(defaults.sri_seed),
            };
            let generic = GenericHamiltonian::new([h1.clone(), h1], chol, params.ecore.unwrap_or(0.0))
                .wrap_err("Invalid synthetic hamiltonian")?
                .with_flags(flags);
            Ok(Hamiltonian::Generic(generic))
        }
        HamiltonianKind::Hubbard => Ok(Hamiltonian::Hubbard(lattice())),
        HamiltonianKind::HubbardHolstein => Ok(Hamiltonian::HubbardHolstein(lattice())),
        HamiltonianKind::Ueg => Ok(Hamiltonian::Ueg(PlaneWaveModel { rs: 1.0, ecut: 2.0 })),
    }
}

fn random_determinant<R: Rng>(
    rng: &mut R,
    nbasis: usize,
    nalpha: usize,
    nbeta: usize,
    restricted: bool,
    complex: bool,
) -> Result<Determinant> {
    let mut orbitals = |nocc: usize| {
        if complex {
            random_orbitals(rng, nbasis, nocc)
        } else {
            to_complex(&random_real_orbitals(rng, nbasis, nocc))
        }
    };
    let alpha = orbitals(nalpha);
    let beta = if restricted { alpha.clone() } else { orbitals(nbeta) };
    Ok(Determinant::new(alpha, beta)?)
}

/// Leading coefficient one, the rest small and complex.
fn random_coefficients<R: Rng>(rng: &mut R, ndets: usize) -> Vec<C64> {
    let mut coeffs: Vec<C64> = random_complex_matrix(rng, ndets, 1)
        .iter()
        .map(|c| *c * 0.2)
        .collect();
    coeffs[0] = C64::new(1.0, 0.0);
    coeffs
}

/// Reference occupation with `degree` random holes moved to random virtual orbitals.
fn excite<R: Rng>(rng: &mut R, nbasis: usize, nocc: usize, degree: usize) -> Vec<usize> {
    let degree = degree.min(nocc).min(nbasis - nocc);
    let mut occ: Vec<usize> = (0..nocc).collect();
    let holes = sample(rng, nocc, degree);
    let particles = sample(rng, nbasis - nocc, degree);
    for (hole, particle) in holes.iter().zip(particles.iter()) {
        occ[hole] = nocc + particle;
    }
    occ
}

fn excited_occupations<R: Rng>(
    rng: &mut R,
    nbasis: usize,
    nalpha: usize,
    nbeta: usize,
    ndets: usize,
    max_excitation: usize,
) -> (Vec<Vec<usize>>, Vec<Vec<usize>>) {
    let mut occa = vec![(0..nalpha).collect::<Vec<_>>()];
    let mut occb = vec![(0..nbeta).collect::<Vec<_>>()];
    for _ in 1..ndets {
        let degree = rng.gen_range(1..=max_excitation.max(1));
        let degree_a = rng.gen_range(0..=degree);
        occa.push(excite(rng, nbasis, nalpha, degree_a));
        occb.push(excite(rng, nbasis, nbeta, degree - degree_a));
    }
    (occa, occb)
}

pub fn build_trial(config: &Config) -> Result<Trial> {
    let params = &config.trial;
    let (nbasis, nalpha, nbeta) = (config.nbasis(), config.nalpha(), config.nbeta());
    if nalpha > nbasis || nbeta > nbasis {
        return Err(eyre!(
            "Cannot place {} alpha and {} beta electrons in {} basis functions",
            nalpha,
            nbeta,
            nbasis
        ));
    }
    let restricted = params.restricted.unwrap_or(false);
    if restricted && nalpha != nbeta {
        return Err(eyre!(
            "A restricted trial needs nalpha == nbeta, got {} and {}",
            nalpha,
            nbeta
        ));
    }
    let complex = params.complex_orbitals.unwrap_or(false);
    let ndets = params.ndets.unwrap_or(1).max(1);
    let mut rng = seeded_rng(params.seed.unwrap_or(2));

    let wavefunction = match params.kind.unwrap_or(TrialKind::Single) {
        TrialKind::Single => TrialWavefunction::SingleDeterminant(random_determinant(
            &mut rng, nbasis, nalpha, nbeta, restricted, complex,
        )?),
        TrialKind::NonOrthogonal => {
            let determinants = (0..ndets)
                .map(|_| random_determinant(&mut rng, nbasis, nalpha, nbeta, restricted, complex))
                .collect::<Result<Vec<_>>>()?;
            let coeffs = random_coefficients(&mut rng, ndets);
            TrialWavefunction::MultiDeterminantNonOrthogonal(DeterminantExpansion::new(
                coeffs,
                determinants,
            )?)
        }
        TrialKind::Orthogonal => {
            let (occa, occb) = excited_occupations(
                &mut rng,
                nbasis,
                nalpha,
                nbeta,
                ndets,
                params.max_excitation.unwrap_or(2),
            );
            let occb = if restricted { occa.clone() } else { occb };
            let coeffs = random_coefficients(&mut rng, ndets);
            let expansion = ParticleHoleExpansion::new(nbasis, coeffs, occa, occb)?;
            info!(
                "Particle-hole expansion of {} determinants, highest excitation {}",
                ndets,
                expansion.max_degree()
            );
            TrialWavefunction::MultiDeterminantOrthogonal(expansion)
        }
    };

    Ok(Trial::new(wavefunction)
        .with_restricted(restricted)?
        .with_wicks(params.wicks.unwrap_or(true)))
}
