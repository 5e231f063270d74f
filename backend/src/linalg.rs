extern crate nalgebra as na;

use na::DMatrix;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type C64 = Complex64;
pub type CMatrix = DMatrix<C64>;
pub type RMatrix = DMatrix<f64>;

/// Phase and log-magnitude of a determinant.
///
/// Overlaps of large occupied spaces under- or overflow quickly, so they are carried as
/// `sign * exp(log_abs)` with `|sign| == 1`. A singular matrix is represented by a zero sign
/// and `log_abs == -inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignedLogDet {
    pub sign: C64,
    pub log_abs: f64,
}

impl SignedLogDet {
    pub fn one() -> Self {
        SignedLogDet {
            sign: C64::new(1.0, 0.0),
            log_abs: 0.0,
        }
    }

    pub fn zero() -> Self {
        SignedLogDet {
            sign: C64::new(0.0, 0.0),
            log_abs: f64::NEG_INFINITY,
        }
    }

    /// Log-space form of a plain complex number.
    pub fn from_value(z: C64) -> Self {
        let magnitude = z.norm();
        if magnitude == 0.0 || !magnitude.is_finite() {
            return SignedLogDet::zero();
        }
        SignedLogDet {
            sign: z / magnitude,
            log_abs: magnitude.ln(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.sign.norm() == 0.0
    }

    /// Product of two determinants, staying in log space.
    pub fn combine(&self, other: &SignedLogDet) -> SignedLogDet {
        if self.is_zero() || other.is_zero() {
            return SignedLogDet::zero();
        }
        SignedLogDet {
            sign: self.sign * other.sign,
            log_abs: self.log_abs + other.log_abs,
        }
    }

    /// `self * exp(-shift)` as a plain number, for sums over terms of very different size.
    pub fn scaled_value(&self, shift: f64) -> C64 {
        if self.is_zero() {
            C64::new(0.0, 0.0)
        } else {
            self.sign * (self.log_abs - shift).exp()
        }
    }

    pub fn value(&self) -> C64 {
        if self.is_zero() {
            C64::new(0.0, 0.0)
        } else {
            self.sign * self.log_abs.exp()
        }
    }
}

/// Dense linear-algebra operations the estimators need from a backend.
///
/// Implementations must use the same complex semantics as nalgebra: no implicit
/// conjugation in products or in [`NumericBackend::contract_transpose`].
pub trait NumericBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inverse of a square matrix, `None` when it is numerically singular.
    fn inverse(&self, m: &CMatrix) -> Option<CMatrix>;

    /// Signed log-determinant of a square matrix.
    fn slogdet(&self, m: &CMatrix) -> SignedLogDet;

    /// Determinant of a square matrix (1 for the empty matrix).
    fn det(&self, m: &CMatrix) -> C64 {
        m.determinant()
    }

    /// `sum_ij T_ij T_ji`, i.e. `trace(T * T)` without forming the product.
    fn contract_transpose(&self, t: &CMatrix) -> C64 {
        contract_transpose(t)
    }
}

/// nalgebra implementation running on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuBackend;

impl NumericBackend for CpuBackend {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn inverse(&self, m: &CMatrix) -> Option<CMatrix> {
        m.clone().try_inverse()
    }

    fn slogdet(&self, m: &CMatrix) -> SignedLogDet {
        debug_assert!(m.is_square(), "slogdet of a non-square matrix");
        if m.nrows() == 0 {
            return SignedLogDet::one();
        }

        let lu = m.clone().lu();
        let mut sign: C64 = lu.p().determinant();
        let mut log_abs = 0.0;
        for pivot in lu.u().diagonal().iter() {
            let magnitude = pivot.norm();
            if magnitude == 0.0 {
                return SignedLogDet::zero();
            }
            sign *= pivot / magnitude;
            log_abs += magnitude.ln();
        }

        SignedLogDet { sign, log_abs }
    }
}

/// Backend selection as it appears in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Cpu,
}

impl BackendKind {
    pub fn instantiate(&self) -> Arc<dyn NumericBackend> {
        match self {
            BackendKind::Cpu => Arc::new(CpuBackend),
        }
    }
}

pub fn contract_transpose(t: &CMatrix) -> C64 {
    t.component_mul(&t.transpose()).sum()
}

/// Copy of `m` with row `i` and column `j` removed.
pub fn minor(m: &CMatrix, i: usize, j: usize) -> CMatrix {
    m.clone().remove_row(i).remove_column(j)
}

/// Determinant by recursive Laplace (cofactor) expansion along the first row.
///
/// Only meant for the small excitation matrices of particle-hole expansions; the cost
/// grows factorially.
pub fn laplace_determinant(m: &CMatrix) -> C64 {
    let n = m.nrows();
    match n {
        0 => C64::new(1.0, 0.0),
        1 => m[(0, 0)],
        2 => m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
        _ => (0..n)
            .map(|j| {
                let sign = if j % 2 == 0 { 1.0 } else { -1.0 };
                m[(0, j)] * laplace_determinant(&minor(m, 0, j)) * sign
            })
            .sum(),
    }
}

pub fn to_complex(m: &RMatrix) -> CMatrix {
    m.map(|x| C64::new(x, 0.0))
}

/// Real and imaginary parts as two real matrices.
pub fn split_parts(m: &CMatrix) -> (RMatrix, RMatrix) {
    (m.map(|z| z.re), m.map(|z| z.im))
}

pub fn from_parts(re: &RMatrix, im: &RMatrix) -> CMatrix {
    re.zip_map(im, C64::new)
}

pub fn is_real(m: &CMatrix) -> bool {
    m.iter().all(|z| z.im == 0.0)
}
