//! Hamiltonians and the factorised (Cholesky) interaction tensor.
//!
//! The two-body interaction of a generic hamiltonian is stored as `naux` symmetric factors
//! `L_x` (nbasis x nbasis) with `V_prqs = sum_x L_x[p,r] L_x[q,s]`. After half rotation by
//! the trial orbitals every factor becomes nocc x nbasis; a [`CholeskySlab`] holds a
//! contiguous range of those half-rotated factors for one spin.

extern crate nalgebra as na;

use crate::error::{ensure_dim, EstimatorError, EstimatorResult};
use backend::{from_parts, split_parts, to_complex, CMatrix, NumericBackend, RMatrix, C64};
use std::ops::Range;

#[derive(Debug, Clone)]
enum SlabData {
    Real { factors: Vec<RMatrix>, packed: RMatrix },
    Complex { factors: Vec<CMatrix>, packed: CMatrix },
}

/// `naux_local` half-rotated factors of shape nocc x nbasis for a single spin.
///
/// The factors are kept twice: one matrix per auxiliary index for the exchange contraction,
/// and packed as naux_local x (nocc * nbasis) rows (row-major flattening of each factor) so
/// the Coulomb projection is a single matrix product.
#[derive(Debug, Clone)]
pub struct CholeskySlab {
    nocc: usize,
    nbasis: usize,
    data: SlabData,
}

fn pack<T: na::Scalar>(factors: &[na::DMatrix<T>], nocc: usize, nbasis: usize) -> na::DMatrix<T> {
    na::DMatrix::from_fn(factors.len(), nocc * nbasis, |x, k| {
        factors[x][(k / nbasis, k % nbasis)].clone()
    })
}

/// Columns of the result are the row-major flattened half Green's functions.
fn flatten_batch(ghalf: &[CMatrix], nocc: usize, nbasis: usize) -> CMatrix {
    CMatrix::from_fn(nocc * nbasis, ghalf.len(), |k, w| {
        ghalf[w][(k / nbasis, k % nbasis)]
    })
}

impl CholeskySlab {
    pub fn from_real(factors: Vec<RMatrix>, nocc: usize, nbasis: usize) -> EstimatorResult<Self> {
        for factor in factors.iter() {
            ensure_dim("cholesky factor rows", factor.nrows(), nocc)?;
            ensure_dim("cholesky factor columns", factor.ncols(), nbasis)?;
        }
        let packed = pack(&factors, nocc, nbasis);
        Ok(CholeskySlab {
            nocc,
            nbasis,
            data: SlabData::Real { factors, packed },
        })
    }

    pub fn from_complex(
        factors: Vec<CMatrix>,
        nocc: usize,
        nbasis: usize,
    ) -> EstimatorResult<Self> {
        for factor in factors.iter() {
            ensure_dim("cholesky factor rows", factor.nrows(), nocc)?;
            ensure_dim("cholesky factor columns", factor.ncols(), nbasis)?;
        }
        let packed = pack(&factors, nocc, nbasis);
        Ok(CholeskySlab {
            nocc,
            nbasis,
            data: SlabData::Complex { factors, packed },
        })
    }

    pub fn naux(&self) -> usize {
        match &self.data {
            SlabData::Real { factors, .. } => factors.len(),
            SlabData::Complex { factors, .. } => factors.len(),
        }
    }

    pub fn nocc(&self) -> usize {
        self.nocc
    }

    pub fn nbasis(&self) -> usize {
        self.nbasis
    }

    pub fn is_real(&self) -> bool {
        matches!(self.data, SlabData::Real { .. })
    }

    /// Factor `x` as a complex matrix.
    pub fn factor(&self, x: usize) -> CMatrix {
        match &self.data {
            SlabData::Real { factors, .. } => to_complex(&factors[x]),
            SlabData::Complex { factors, .. } => factors[x].clone(),
        }
    }

    /// Packed naux_local x (nocc * nbasis) factors as a complex matrix.
    pub fn packed(&self) -> CMatrix {
        match &self.data {
            SlabData::Real { packed, .. } => to_complex(packed),
            SlabData::Complex { packed, .. } => packed.clone(),
        }
    }

    /// The same slab with complex storage.
    pub fn to_complex(&self) -> CholeskySlab {
        match &self.data {
            SlabData::Real { factors, packed } => CholeskySlab {
                nocc: self.nocc,
                nbasis: self.nbasis,
                data: SlabData::Complex {
                    factors: factors.iter().map(to_complex).collect(),
                    packed: to_complex(packed),
                },
            },
            SlabData::Complex { .. } => self.clone(),
        }
    }

    /// Factors `range` of this slab as a new slab.
    pub fn chunk(&self, range: Range<usize>) -> EstimatorResult<CholeskySlab> {
        if range.end > self.naux() || range.start > range.end {
            return Err(EstimatorError::ShapeMismatch(format!(
                "aux range {:?} outside a slab of {} factors",
                range,
                self.naux()
            )));
        }
        match &self.data {
            SlabData::Real { factors, .. } => {
                CholeskySlab::from_real(factors[range].to_vec(), self.nocc, self.nbasis)
            }
            SlabData::Complex { factors, .. } => {
                CholeskySlab::from_complex(factors[range].to_vec(), self.nocc, self.nbasis)
            }
        }
    }

    /// X[x, w] = sum_ir L_x[i,r] Ghalf_w[i,r], an naux_local x nwalkers matrix.
    ///
    /// For real factors the real and imaginary parts of the Green's functions are
    /// contracted separately, which halves the floating point work.
    pub fn coulomb_projection(&self, ghalf: &[CMatrix]) -> CMatrix {
        let gflat = flatten_batch(ghalf, self.nocc, self.nbasis);
        match &self.data {
            SlabData::Real { packed, .. } => {
                let (g_re, g_im) = split_parts(&gflat);
                from_parts(&(packed * g_re), &(packed * g_im))
            }
            SlabData::Complex { packed, .. } => packed * gflat,
        }
    }

    /// sum_x sum_ij T_ij T_ji with T = L_x Ghalf^T for one walker (unscaled).
    pub fn exchange(&self, ghalf: &CMatrix, backend: &dyn NumericBackend) -> C64 {
        match &self.data {
            SlabData::Real { factors, .. } => {
                let (g_re, g_im) = split_parts(ghalf);
                let (g_re_t, g_im_t) = (g_re.transpose(), g_im.transpose());
                factors
                    .iter()
                    .map(|l| {
                        backend.contract_transpose(&from_parts(&(l * &g_re_t), &(l * &g_im_t)))
                    })
                    .sum()
            }
            SlabData::Complex { factors, .. } => {
                let g_t = ghalf.transpose();
                factors
                    .iter()
                    .map(|l| backend.contract_transpose(&(l * &g_t)))
                    .sum()
            }
        }
    }
}

/// Alpha and beta slabs covering the same auxiliary range.
#[derive(Debug, Clone)]
pub struct InteractionSlab {
    pub alpha: CholeskySlab,
    pub beta: CholeskySlab,
    pub aux_range: Range<usize>,
}

impl InteractionSlab {
    pub fn new(alpha: CholeskySlab, beta: CholeskySlab) -> EstimatorResult<Self> {
        ensure_dim("beta slab naux", beta.naux(), alpha.naux())?;
        ensure_dim("beta slab nbasis", beta.nbasis(), alpha.nbasis())?;
        let aux_range = 0..alpha.naux();
        Ok(InteractionSlab {
            alpha,
            beta,
            aux_range,
        })
    }

    pub fn naux(&self) -> usize {
        self.alpha.naux()
    }

    pub fn is_real(&self) -> bool {
        self.alpha.is_real() && self.beta.is_real()
    }

    /// Cut `range` (relative to this slab) out of both spins.
    pub fn chunk(&self, range: Range<usize>) -> EstimatorResult<InteractionSlab> {
        let alpha = self.alpha.chunk(range.clone())?;
        let beta = self.beta.chunk(range.clone())?;
        let start = self.aux_range.start;
        Ok(InteractionSlab {
            alpha,
            beta,
            aux_range: start + range.start..start + range.end,
        })
    }

    pub fn to_complex(&self) -> InteractionSlab {
        InteractionSlab {
            alpha: self.alpha.to_complex(),
            beta: self.beta.to_complex(),
            aux_range: self.aux_range.clone(),
        }
    }
}

/// Split `0..naux` into `ngroups` contiguous, disjoint, non-empty ranges. The first
/// `naux % ngroups` ranges receive one extra index.
pub fn partition_aux(naux: usize, ngroups: usize) -> EstimatorResult<Vec<Range<usize>>> {
    if ngroups == 0 || ngroups > naux {
        return Err(EstimatorError::GroupSize {
            expected: naux,
            actual: ngroups,
        });
    }
    let base = naux / ngroups;
    let extra = naux % ngroups;
    let mut start = 0;
    Ok((0..ngroups)
        .map(|g| {
            let len = base + usize::from(g < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect())
}

/// Which variant of the energy evaluation a generic hamiltonian asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyFlags {
    pub exact_eri: bool,
    pub stochastic_ri: bool,
    pub control_variate: bool,
    pub pno: bool,
    /// Number of random projections for the stochastic resolution of identity.
    pub nsamples: usize,
    /// Singular values below this are dropped from the PNO pair blocks.
    pub pno_threshold: f64,
    pub sri_seed: u64,
}

impl Default for EnergyFlags {
    fn default() -> Self {
        EnergyFlags {
            exact_eri: false,
            stochastic_ri: false,
            control_variate: false,
            pno: false,
            nsamples: 20,
            pno_threshold: 1e-8,
            sri_seed: 7,
        }
    }
}

/// Ab initio hamiltonian in an orthonormal basis with a Cholesky-factorised interaction.
#[derive(Debug, Clone)]
pub struct GenericHamiltonian {
    pub nbasis: usize,
    /// One-body integrals for alpha and beta.
    pub h1: [RMatrix; 2],
    pub chol: Vec<RMatrix>,
    pub ecore: f64,
    pub flags: EnergyFlags,
    /// The half-rotated factors are distributed over a process group.
    pub chunked: bool,
}

impl GenericHamiltonian {
    pub fn new(h1: [RMatrix; 2], chol: Vec<RMatrix>, ecore: f64) -> EstimatorResult<Self> {
        let nbasis = h1[0].nrows();
        for h in h1.iter() {
            ensure_dim("one-body rows", h.nrows(), nbasis)?;
            ensure_dim("one-body columns", h.ncols(), nbasis)?;
        }
        for l in chol.iter() {
            ensure_dim("cholesky rows", l.nrows(), nbasis)?;
            ensure_dim("cholesky columns", l.ncols(), nbasis)?;
        }
        Ok(GenericHamiltonian {
            nbasis,
            h1,
            chol,
            ecore,
            flags: EnergyFlags::default(),
            chunked: false,
        })
    }

    pub fn with_flags(mut self, flags: EnergyFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_chunking(mut self, chunked: bool) -> Self {
        self.chunked = chunked;
        self
    }

    pub fn naux(&self) -> usize {
        self.chol.len()
    }
}

/// Lattice model parameters. Only recognised so the dispatcher can reject them.
#[derive(Debug, Clone, PartialEq)]
pub struct LatticeModel {
    pub nx: usize,
    pub ny: usize,
    pub hopping: f64,
    pub interaction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaneWaveModel {
    pub rs: f64,
    pub ecut: f64,
}

#[derive(Debug, Clone)]
pub enum Hamiltonian {
    Generic(GenericHamiltonian),
    Hubbard(LatticeModel),
    HubbardHolstein(LatticeModel),
    Ueg(PlaneWaveModel),
}

impl Hamiltonian {
    pub fn name(&self) -> &'static str {
        match self {
            Hamiltonian::Generic(_) => "Generic",
            Hamiltonian::Hubbard(_) => "Hubbard",
            Hamiltonian::HubbardHolstein(_) => "HubbardHolstein",
            Hamiltonian::Ueg(_) => "UEG",
        }
    }
}
