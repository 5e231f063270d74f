//! Integration tests for the local-energy dispatcher
//!
//! These drive the public API end to end: a seeded system is built, Green's functions and
//! energies are evaluated through `LocalEnergyDispatcher`, and the different routes to the
//! same quantity are compared.

use afqmc::error::EstimatorError;
use afqmc::hamiltonian::{EnergyFlags, GenericHamiltonian, Hamiltonian, LatticeModel};
use afqmc::ring_impl::{ChannelTransport, RingTransport};
use afqmc::trial::{Determinant, ParticleHoleExpansion, Trial, TrialWavefunction};
use afqmc::walkers::WalkerBatch;
use afqmc::{EnergyStrategy, GreensRoute, LocalEnergyDispatcher};
use backend::random::{
    random_cholesky_factors, random_complex_matrix, random_orbitals, random_symmetric_matrix,
    seeded_rng,
};
use backend::{BackendKind, CMatrix, C64};
use std::thread;

#[cfg(test)]
mod integration_tests {
    use super::*;

    fn generic(seed: u64, nbasis: usize, naux: usize) -> GenericHamiltonian {
        let mut rng = seeded_rng(seed);
        let h1 = random_symmetric_matrix(&mut rng, nbasis);
        let chol = random_cholesky_factors(&mut rng, nbasis, naux, 0.25);
        GenericHamiltonian::new([h1.clone(), h1], chol, 0.75).unwrap()
    }

    fn dispatcher() -> LocalEnergyDispatcher {
        LocalEnergyDispatcher::new(BackendKind::Cpu.instantiate())
    }

    fn max_diff(a: &CMatrix, b: &CMatrix) -> f64 {
        (a - b).iter().map(|z| z.norm()).fold(0.0, f64::max)
    }

    #[test]
    fn test_single_determinant_end_to_end() {
        let (nbasis, nalpha, nbeta) = (8, 3, 2);
        let ham = generic(1, nbasis, 10);
        let mut rng = seeded_rng(2);
        let det = Determinant::new(
            random_orbitals(&mut rng, nbasis, nalpha),
            random_orbitals(&mut rng, nbasis, nbeta),
        )
        .unwrap();
        let mut trial = Trial::new(TrialWavefunction::SingleDeterminant(det));
        let dispatcher = dispatcher();
        trial.half_rotate(&ham, dispatcher.backend()).unwrap();

        let ham = Hamiltonian::Generic(ham);
        assert_eq!(
            dispatcher.describe(&ham, &trial, false).unwrap(),
            EnergyStrategy::Cholesky {
                chunked: false,
                restricted: false
            }
        );

        let mut batch = WalkerBatch::random(&mut seeded_rng(3), 5, nbasis, nalpha, nbeta).unwrap();
        let (ovlp, energies) = dispatcher.evaluate(&ham, &mut batch, &trial, None).unwrap();
        assert_eq!(energies.shape(), (5, 3));
        assert!(ovlp.iter().all(|o| !o.is_zero() && o.log_abs.is_finite()));

        let Hamiltonian::Generic(inner) = &ham else {
            unreachable!()
        };
        let full =
            afqmc::energy_impl::local_energy_full_g_batch(inner, &batch, dispatcher.backend())
                .unwrap();
        assert!(max_diff(&energies, &full) < 1e-10);
    }

    #[test]
    fn test_wick_and_brute_force_routes_agree() {
        let nbasis = 9;
        let ham = Hamiltonian::Generic(generic(4, nbasis, 8));
        let occa = vec![
            vec![0, 1, 2, 3],
            vec![0, 1, 2, 5],
            vec![0, 4, 6, 3],
            vec![5, 6, 7, 8],
            vec![0, 1, 2, 3],
        ];
        let occb = vec![
            vec![0, 1, 2],
            vec![0, 1, 2],
            vec![0, 4, 2],
            vec![3, 1, 8],
            vec![6, 7, 8],
        ];
        let coeffs: Vec<C64> = random_complex_matrix(&mut seeded_rng(5), occa.len(), 1)
            .iter()
            .copied()
            .collect();
        let expansion = ParticleHoleExpansion::new(nbasis, coeffs, occa, occb).unwrap();
        let wick = Trial::new(TrialWavefunction::MultiDeterminantOrthogonal(expansion));
        let brute = wick.clone().with_wicks(false);
        assert_eq!(LocalEnergyDispatcher::greens_route(&wick), GreensRoute::Wick);
        assert_eq!(
            LocalEnergyDispatcher::greens_route(&brute),
            GreensRoute::BruteForceExpansion
        );
        assert_eq!(
            LocalEnergyDispatcher::select(&ham, &wick, false).unwrap(),
            EnergyStrategy::CholeskyFullG
        );

        let batch = WalkerBatch::random(&mut seeded_rng(6), 4, nbasis, 4, 3).unwrap();
        let dispatcher = dispatcher();
        let (mut b1, mut b2) = (batch.clone(), batch);
        let (ovlp_wick, e_wick) = dispatcher.evaluate(&ham, &mut b1, &wick, None).unwrap();
        let (ovlp_brute, e_brute) = dispatcher.evaluate(&ham, &mut b2, &brute, None).unwrap();
        for (a, b) in ovlp_wick.iter().zip(ovlp_brute.iter()) {
            assert!((a.log_abs - b.log_abs).abs() < 1e-10);
            assert!((a.sign - b.sign).norm() < 1e-10);
        }
        assert!(max_diff(&e_wick, &e_brute) < 1e-8);
    }

    #[test]
    fn test_chunked_dispatch_over_a_thread_ring() {
        let (nbasis, nocc, naux) = (7, 3, 5);
        let ham = generic(7, nbasis, naux);
        let orbitals = random_orbitals(&mut seeded_rng(8), nbasis, nocc);
        let det = Determinant::new(orbitals.clone(), orbitals).unwrap();
        let mut trial = Trial::new(TrialWavefunction::SingleDeterminant(det))
            .with_restricted(true)
            .unwrap();
        let dispatcher = dispatcher();
        trial.half_rotate(&ham, dispatcher.backend()).unwrap();

        let mut batch = WalkerBatch::random_restricted(&mut seeded_rng(9), 3, nbasis, nocc).unwrap();
        let plain = Hamiltonian::Generic(ham.clone());
        let (_, expected) = dispatcher.evaluate(&plain, &mut batch, &trial, None).unwrap();

        let chunked = Hamiltonian::Generic(ham.with_chunking(true));
        assert!(matches!(
            dispatcher.local_energy(&chunked, &batch, &trial, None),
            Err(EstimatorError::UnsupportedStrategy(_))
        ));

        let transports = ChannelTransport::ring(2).unwrap();
        let (dispatcher, chunked, batch, trial) = (&dispatcher, &chunked, &batch, &trial);
        let results: Vec<CMatrix> = thread::scope(|scope| {
            let handles: Vec<_> = transports
                .into_iter()
                .map(|transport| {
                    scope.spawn(move || {
                        let transport: &dyn RingTransport = &transport;
                        dispatcher
                            .local_energy(chunked, batch, trial, Some(transport))
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for energies in results.iter() {
            assert!(max_diff(energies, &expected) < 1e-10);
        }
    }

    #[test]
    fn test_special_strategies_through_the_dispatcher() {
        let (nbasis, nalpha, nbeta) = (6, 2, 2);
        let base = generic(10, nbasis, 6);
        let mut rng = seeded_rng(11);
        let det = Determinant::new(
            random_orbitals(&mut rng, nbasis, nalpha),
            random_orbitals(&mut rng, nbasis, nbeta),
        )
        .unwrap();
        let dispatcher = dispatcher();
        let batch = WalkerBatch::random(&mut seeded_rng(12), 3, nbasis, nalpha, nbeta).unwrap();

        let evaluate = |flags: EnergyFlags| {
            let ham = base.clone().with_flags(flags);
            let mut trial = Trial::new(TrialWavefunction::SingleDeterminant(det.clone()));
            trial.half_rotate(&ham, dispatcher.backend()).unwrap();
            let ham = Hamiltonian::Generic(ham);
            let strategy = LocalEnergyDispatcher::select(&ham, &trial, false).unwrap();
            let mut batch = batch.clone();
            let (_, energies) = dispatcher.evaluate(&ham, &mut batch, &trial, None).unwrap();
            (strategy, energies)
        };

        let (strategy, cholesky) = evaluate(EnergyFlags::default());
        assert!(matches!(strategy, EnergyStrategy::Cholesky { .. }));

        let (strategy, eri) = evaluate(EnergyFlags {
            exact_eri: true,
            ..EnergyFlags::default()
        });
        assert_eq!(strategy, EnergyStrategy::ExactEri);
        assert!(max_diff(&eri, &cholesky) < 1e-10);

        let (strategy, pno) = evaluate(EnergyFlags {
            exact_eri: true,
            control_variate: true,
            pno: true,
            pno_threshold: 0.0,
            ..EnergyFlags::default()
        });
        assert_eq!(strategy, EnergyStrategy::PnoCorrection);
        assert!(max_diff(&pno, &cholesky) < 1e-9);

        let (strategy, sri) = evaluate(EnergyFlags {
            stochastic_ri: true,
            nsamples: 8,
            ..EnergyFlags::default()
        });
        assert_eq!(
            strategy,
            EnergyStrategy::StochasticRi {
                control_variate: false
            }
        );
        for w in 0..3 {
            assert!((sri[(w, 1)] - cholesky[(w, 1)]).norm() < 1e-10);
        }
    }

    #[test]
    fn test_model_hamiltonians_are_rejected() {
        let nbasis = 4;
        let det = Determinant::from_occupations(nbasis, &[0, 1], &[0]);
        let trial = Trial::new(TrialWavefunction::SingleDeterminant(det));
        let ham = Hamiltonian::Hubbard(LatticeModel {
            nx: 4,
            ny: 1,
            hopping: 1.0,
            interaction: 4.0,
        });
        let mut batch = WalkerBatch::random(&mut seeded_rng(13), 2, nbasis, 2, 1).unwrap();
        assert!(matches!(
            dispatcher().evaluate(&ham, &mut batch, &trial, None),
            Err(EstimatorError::UnsupportedHamiltonian(_))
        ));
    }

    #[test]
    fn test_walker_trial_mismatch_is_reported() {
        let det = Determinant::from_occupations(6, &[0, 1], &[0, 1]);
        let trial = Trial::new(TrialWavefunction::SingleDeterminant(det));
        let mut batch = WalkerBatch::random(&mut seeded_rng(14), 2, 6, 3, 2).unwrap();
        assert!(matches!(
            dispatcher().greens_function(&mut batch, &trial),
            Err(EstimatorError::ShapeMismatch(_))
        ));
    }
}
