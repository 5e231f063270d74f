#[cfg(test)]
mod tests {
    use crate::linalg::*;
    use crate::random::{random_complex_matrix, random_orbitals, seeded_rng};

    #[test]
    fn test_slogdet_matches_determinant() {
        let mut rng = seeded_rng(11);
        let backend = CpuBackend;
        for n in 1..6 {
            let m = random_complex_matrix(&mut rng, n, n);
            let direct = m.determinant();
            let logdet = backend.slogdet(&m);
            let diff = (logdet.value() - direct).norm();
            assert!(
                diff < 1e-10 * direct.norm().max(1.0),
                "slogdet disagrees for n={}: {} vs {}",
                n,
                logdet.value(),
                direct
            );
            assert!((logdet.sign.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_slogdet_of_singular_matrix_is_zero() {
        let mut rng = seeded_rng(3);
        let mut m = random_complex_matrix(&mut rng, 4, 4);
        m.column_mut(2).fill(C64::new(0.0, 0.0));
        let logdet = CpuBackend.slogdet(&m);
        assert!(logdet.is_zero());
        assert_eq!(logdet.value(), C64::new(0.0, 0.0));
        assert_eq!(logdet.log_abs, f64::NEG_INFINITY);
    }

    #[test]
    fn test_combine_adds_logs() {
        let a = SignedLogDet {
            sign: C64::new(0.0, 1.0),
            log_abs: 1.5,
        };
        let b = SignedLogDet {
            sign: C64::new(-1.0, 0.0),
            log_abs: -0.5,
        };
        let ab = a.combine(&b);
        assert!((ab.value() - a.value() * b.value()).norm() < 1e-12);
        assert!(a.combine(&SignedLogDet::zero()).is_zero());
    }

    #[test]
    fn test_from_value_and_scaled_value() {
        let z = C64::new(-3.0, 4.0);
        let logdet = SignedLogDet::from_value(z);
        assert!((logdet.log_abs - 5.0f64.ln()).abs() < 1e-14);
        assert!((logdet.value() - z).norm() < 1e-12);
        assert!((logdet.scaled_value(5.0f64.ln()) - z / 5.0).norm() < 1e-14);
        assert!(SignedLogDet::from_value(C64::new(0.0, 0.0)).is_zero());

        let tiny = SignedLogDet {
            sign: C64::new(0.0, -1.0),
            log_abs: -2000.0,
        };
        assert_eq!(tiny.value(), C64::new(0.0, 0.0));
        assert!((tiny.scaled_value(-2000.0) - C64::new(0.0, -1.0)).norm() < 1e-14);
    }

    #[test]
    fn test_laplace_determinant_matches_lu() {
        let mut rng = seeded_rng(5);
        for n in 0..6 {
            let m = random_complex_matrix(&mut rng, n, n);
            let diff = (laplace_determinant(&m) - CpuBackend.det(&m)).norm();
            assert!(diff < 1e-10, "Laplace expansion off by {} for n={}", diff, n);
        }
    }

    #[test]
    fn test_contract_transpose_is_trace_of_square() {
        let mut rng = seeded_rng(8);
        let t = random_complex_matrix(&mut rng, 3, 3);
        let expected = (&t * &t).trace();
        assert!((contract_transpose(&t) - expected).norm() < 1e-12);
    }

    #[test]
    fn test_minor_removes_row_and_column() {
        let m = CMatrix::from_fn(3, 3, |i, j| C64::new((3 * i + j) as f64, 0.0));
        let sub = minor(&m, 1, 2);
        assert_eq!(sub.shape(), (2, 2));
        assert_eq!(sub[(0, 0)], C64::new(0.0, 0.0));
        assert_eq!(sub[(0, 1)], C64::new(1.0, 0.0));
        assert_eq!(sub[(1, 0)], C64::new(6.0, 0.0));
        assert_eq!(sub[(1, 1)], C64::new(7.0, 0.0));
    }

    #[test]
    fn test_inverse_and_parts_roundtrip() {
        let mut rng = seeded_rng(21);
        let m = random_complex_matrix(&mut rng, 4, 4);
        let inv = CpuBackend.inverse(&m).expect("random matrix should be invertible");
        let identity = &m * &inv;
        for i in 0..4 {
            for j in 0..4 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((identity[(i, j)] - C64::new(expected, 0.0)).norm() < 1e-10);
            }
        }

        let (re, im) = split_parts(&m);
        assert_eq!(from_parts(&re, &im), m);
        assert!(!is_real(&m));
        assert!(is_real(&to_complex(&re)));
    }

    #[test]
    fn test_random_orbitals_are_orthonormal() {
        let mut rng = seeded_rng(2);
        let c = random_orbitals(&mut rng, 6, 3);
        let s = c.adjoint() * &c;
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((s[(i, j)] - C64::new(expected, 0.0)).norm() < 1e-10);
            }
        }
    }

    #[test]
    fn test_backend_kind_instantiates_cpu() {
        let backend = BackendKind::default().instantiate();
        assert_eq!(backend.name(), "cpu");
    }
}
