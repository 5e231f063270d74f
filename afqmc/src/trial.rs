//! Trial wavefunctions and their half-rotated integrals.

extern crate nalgebra as na;

use crate::energy_impl::kernel::{ecoul_kernel_uhf, exx_kernel};
use crate::error::{ensure_dim, EstimatorError, EstimatorResult};
use crate::hamiltonian::{CholeskySlab, GenericHamiltonian, InteractionSlab};
use crate::walkers::CLOSED_SHELL_TOLERANCE;
use backend::{is_real, split_parts, CMatrix, NumericBackend, C64};
use itertools::Itertools;
use tracing::{debug, info};

/// Occupied orbitals of one Slater determinant, nbasis x nalpha and nbasis x nbeta.
#[derive(Debug, Clone, PartialEq)]
pub struct Determinant {
    pub alpha: CMatrix,
    pub beta: CMatrix,
}

impl Determinant {
    pub fn new(alpha: CMatrix, beta: CMatrix) -> EstimatorResult<Self> {
        ensure_dim("beta orbital rows", beta.nrows(), alpha.nrows())?;
        Ok(Determinant { alpha, beta })
    }

    /// Determinant occupying the basis functions listed in `occa` and `occb`.
    pub fn from_occupations(nbasis: usize, occa: &[usize], occb: &[usize]) -> Self {
        let unit_columns = |occ: &[usize]| {
            CMatrix::from_fn(nbasis, occ.len(), |p, k| {
                if p == occ[k] {
                    C64::new(1.0, 0.0)
                } else {
                    C64::new(0.0, 0.0)
                }
            })
        };
        Determinant {
            alpha: unit_columns(occa),
            beta: unit_columns(occb),
        }
    }

    pub fn nbasis(&self) -> usize {
        self.alpha.nrows()
    }

    pub fn nalpha(&self) -> usize {
        self.alpha.ncols()
    }

    pub fn nbeta(&self) -> usize {
        self.beta.ncols()
    }
}

/// Linear combination of arbitrary (mutually non-orthogonal) determinants.
#[derive(Debug, Clone)]
pub struct DeterminantExpansion {
    pub coeffs: Vec<C64>,
    pub determinants: Vec<Determinant>,
}

impl DeterminantExpansion {
    pub fn new(coeffs: Vec<C64>, determinants: Vec<Determinant>) -> EstimatorResult<Self> {
        if determinants.is_empty() {
            return Err(EstimatorError::InvalidTrial(
                "expansion without determinants".to_string(),
            ));
        }
        ensure_dim("number of coefficients", coeffs.len(), determinants.len())?;
        let first = &determinants[0];
        for det in determinants.iter() {
            ensure_dim("determinant basis size", det.nbasis(), first.nbasis())?;
            ensure_dim("determinant alpha count", det.nalpha(), first.nalpha())?;
            ensure_dim("determinant beta count", det.nbeta(), first.nbeta())?;
        }
        Ok(DeterminantExpansion {
            coeffs,
            determinants,
        })
    }
}

/// How one determinant of an orthogonal expansion differs from the reference.
///
/// `cre` holds reference orbitals that are vacated, `anh` the orbitals that are filled
/// instead, both sorted; `cre[k]` is paired with `anh[k]`. The phase is the parity of the
/// reference occupation with every `cre[k]` replaced in place by `anh[k]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleHole {
    pub cre_a: Vec<usize>,
    pub anh_a: Vec<usize>,
    pub cre_b: Vec<usize>,
    pub anh_b: Vec<usize>,
    pub phase_a: f64,
    pub phase_b: f64,
}

impl ParticleHole {
    pub fn degree_a(&self) -> usize {
        self.cre_a.len()
    }

    pub fn degree_b(&self) -> usize {
        self.cre_b.len()
    }

    pub fn is_reference(&self) -> bool {
        self.cre_a.is_empty() && self.cre_b.is_empty()
    }
}

fn same_orbitals(alpha: &CMatrix, beta: &CMatrix) -> bool {
    alpha.shape() == beta.shape()
        && alpha
            .iter()
            .zip(beta.iter())
            .all(|(a, b)| (a - b).norm() <= CLOSED_SHELL_TOLERANCE)
}

fn parity(list: &[usize]) -> f64 {
    let inversions = list
        .iter()
        .tuple_combinations()
        .filter(|(a, b)| a > b)
        .count();
    if inversions % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

fn validate_occupation(occ: &[usize], nbasis: usize, nocc: usize) -> EstimatorResult<Vec<usize>> {
    ensure_dim("occupation length", occ.len(), nocc)?;
    let sorted: Vec<usize> = occ.iter().copied().sorted().collect();
    if let Some(&p) = sorted.iter().find(|&&p| p >= nbasis) {
        return Err(EstimatorError::InvalidTrial(format!(
            "orbital {} outside a basis of {}",
            p, nbasis
        )));
    }
    if sorted.iter().tuple_windows().any(|(a, b)| a == b) {
        return Err(EstimatorError::InvalidTrial(format!(
            "orbital occupied twice in {:?}",
            occ
        )));
    }
    Ok(sorted)
}

/// (cre, anh, phase) taking the sorted `reference` occupation to the sorted `occ`.
fn excitation(reference: &[usize], occ: &[usize]) -> (Vec<usize>, Vec<usize>, f64) {
    let cre: Vec<usize> = reference
        .iter()
        .copied()
        .filter(|p| !occ.contains(p))
        .collect();
    let anh: Vec<usize> = occ
        .iter()
        .copied()
        .filter(|p| !reference.contains(p))
        .collect();
    let mut replaced = reference.to_vec();
    for (c, a) in cre.iter().zip(anh.iter()) {
        if let Some(slot) = replaced.iter_mut().find(|p| **p == *c) {
            *slot = *a;
        }
    }
    (cre, anh, parity(&replaced))
}

/// Multi-determinant trial whose determinants are orbital excitations of the first one,
/// all built from the same orthonormal basis.
#[derive(Debug, Clone)]
pub struct ParticleHoleExpansion {
    pub coeffs: Vec<C64>,
    pub occa: Vec<Vec<usize>>,
    pub occb: Vec<Vec<usize>>,
    pub excitations: Vec<ParticleHole>,
    /// The same determinants as explicit orbital matrices.
    pub determinants: Vec<Determinant>,
}

impl ParticleHoleExpansion {
    pub fn new(
        nbasis: usize,
        coeffs: Vec<C64>,
        occa: Vec<Vec<usize>>,
        occb: Vec<Vec<usize>>,
    ) -> EstimatorResult<Self> {
        if coeffs.is_empty() {
            return Err(EstimatorError::InvalidTrial(
                "expansion without determinants".to_string(),
            ));
        }
        ensure_dim("alpha occupation lists", occa.len(), coeffs.len())?;
        ensure_dim("beta occupation lists", occb.len(), coeffs.len())?;

        let (nalpha, nbeta) = (occa[0].len(), occb[0].len());
        let occa = occa
            .iter()
            .map(|occ| validate_occupation(occ, nbasis, nalpha))
            .collect::<EstimatorResult<Vec<_>>>()?;
        let occb = occb
            .iter()
            .map(|occ| validate_occupation(occ, nbasis, nbeta))
            .collect::<EstimatorResult<Vec<_>>>()?;

        let excitations = occa
            .iter()
            .zip(occb.iter())
            .map(|(oa, ob)| {
                let (cre_a, anh_a, phase_a) = excitation(&occa[0], oa);
                let (cre_b, anh_b, phase_b) = excitation(&occb[0], ob);
                ParticleHole {
                    cre_a,
                    anh_a,
                    cre_b,
                    anh_b,
                    phase_a,
                    phase_b,
                }
            })
            .collect();
        let determinants = occa
            .iter()
            .zip(occb.iter())
            .map(|(oa, ob)| Determinant::from_occupations(nbasis, oa, ob))
            .collect();

        Ok(ParticleHoleExpansion {
            coeffs,
            occa,
            occb,
            excitations,
            determinants,
        })
    }

    pub fn max_degree(&self) -> usize {
        self.excitations
            .iter()
            .map(|e| e.degree_a().max(e.degree_b()))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone)]
pub enum TrialWavefunction {
    SingleDeterminant(Determinant),
    MultiDeterminantNonOrthogonal(DeterminantExpansion),
    MultiDeterminantOrthogonal(ParticleHoleExpansion),
}

impl TrialWavefunction {
    pub fn name(&self) -> &'static str {
        match self {
            TrialWavefunction::SingleDeterminant(_) => "SingleDeterminant",
            TrialWavefunction::MultiDeterminantNonOrthogonal(_) => "MultiDeterminantNonOrthogonal",
            TrialWavefunction::MultiDeterminantOrthogonal(_) => "MultiDeterminantOrthogonal",
        }
    }

    pub fn ndets(&self) -> usize {
        match self {
            TrialWavefunction::SingleDeterminant(_) => 1,
            TrialWavefunction::MultiDeterminantNonOrthogonal(e) => e.determinants.len(),
            TrialWavefunction::MultiDeterminantOrthogonal(e) => e.determinants.len(),
        }
    }

    pub fn determinants(&self) -> &[Determinant] {
        match self {
            TrialWavefunction::SingleDeterminant(d) => std::slice::from_ref(d),
            TrialWavefunction::MultiDeterminantNonOrthogonal(e) => &e.determinants,
            TrialWavefunction::MultiDeterminantOrthogonal(e) => &e.determinants,
        }
    }

    /// The single determinant, or the first determinant of an expansion.
    pub fn reference(&self) -> &Determinant {
        match self {
            TrialWavefunction::SingleDeterminant(d) => d,
            TrialWavefunction::MultiDeterminantNonOrthogonal(e) => &e.determinants[0],
            TrialWavefunction::MultiDeterminantOrthogonal(e) => &e.determinants[0],
        }
    }
}

/// Half-rotated two-electron integrals `v[i r, j s]` stored as
/// (nocc_1 * nbasis) x (nocc_2 * nbasis) matrices. The same-spin blocks carry the factor
/// one half so that `sum v G G` is directly an energy.
#[derive(Debug, Clone)]
pub struct HalfRotatedEri {
    pub aa: CMatrix,
    pub bb: CMatrix,
    pub ab: CMatrix,
}

impl HalfRotatedEri {
    fn from_slab(slab: &InteractionSlab) -> Self {
        let pa = slab.alpha.packed();
        let pb = slab.beta.packed();
        let pa_t = pa.transpose();
        HalfRotatedEri {
            aa: &pa_t * &pa * C64::new(0.5, 0.0),
            bb: pb.transpose() * &pb * C64::new(0.5, 0.0),
            ab: pa_t * pb,
        }
    }
}

/// A low-rank pair block `B_ij ~ u * vt` (nbasis x k and k x nbasis).
#[derive(Debug, Clone)]
pub struct PairFactor {
    pub i: usize,
    pub j: usize,
    pub u: CMatrix,
    pub vt: CMatrix,
}

/// SVD-truncated per-occupied-pair ERI blocks. Same-spin lists only hold `i <= j`.
#[derive(Debug, Clone)]
pub struct PnoFactors {
    pub aa: Vec<PairFactor>,
    pub bb: Vec<PairFactor>,
    pub ab: Vec<PairFactor>,
}

fn truncate_block(
    eri: &CMatrix,
    i: usize,
    j: usize,
    nbasis: usize,
    threshold: f64,
) -> EstimatorResult<PairFactor> {
    let block = eri.view((i * nbasis, j * nbasis), (nbasis, nbasis)).clone_owned();
    let svd = block.svd(true, true);
    let (u, vt) = match (svd.u, svd.v_t) {
        (Some(u), Some(vt)) => (u, vt),
        _ => {
            return Err(EstimatorError::InvalidTrial(format!(
                "SVD of pair block ({}, {}) failed",
                i, j
            )))
        }
    };
    let kept: Vec<usize> = svd
        .singular_values
        .iter()
        .enumerate()
        .filter(|(_, s)| **s > threshold)
        .map(|(k, _)| k)
        .collect();
    let u = CMatrix::from_fn(nbasis, kept.len(), |r, k| {
        u[(r, kept[k])] * svd.singular_values[kept[k]]
    });
    let vt = CMatrix::from_fn(kept.len(), nbasis, |k, s| vt[(kept[k], s)]);
    Ok(PairFactor { i, j, u, vt })
}

impl PnoFactors {
    fn from_eri(
        eri: &HalfRotatedEri,
        nalpha: usize,
        nbeta: usize,
        nbasis: usize,
        threshold: f64,
    ) -> EstimatorResult<Self> {
        let same_spin = |v: &CMatrix, nocc: usize| {
            (0..nocc)
                .flat_map(|i| (i..nocc).map(move |j| (i, j)))
                .map(|(i, j)| truncate_block(v, i, j, nbasis, threshold))
                .collect::<EstimatorResult<Vec<_>>>()
        };
        let ab = (0..nalpha)
            .cartesian_product(0..nbeta)
            .map(|(i, j)| truncate_block(&eri.ab, i, j, nbasis, threshold))
            .collect::<EstimatorResult<Vec<_>>>()?;
        Ok(PnoFactors {
            aa: same_spin(&eri.aa, nalpha)?,
            bb: same_spin(&eri.bb, nbeta)?,
            ab,
        })
    }

    pub fn rank(&self) -> usize {
        self.aa
            .iter()
            .chain(self.bb.iter())
            .chain(self.ab.iter())
            .map(|p| p.u.ncols())
            .sum()
    }
}

/// Integrals projected onto the occupied orbitals of the trial reference determinant.
#[derive(Debug, Clone)]
pub struct HalfRotated {
    pub rh1a: CMatrix,
    pub rh1b: CMatrix,
    pub rchol: InteractionSlab,
    pub eris: Option<HalfRotatedEri>,
    pub pno: Option<PnoFactors>,
    /// Half Green's functions of the reference with itself.
    pub ghalf0a: CMatrix,
    pub ghalf0b: CMatrix,
    pub ecoul0: C64,
    pub exxa0: C64,
    pub exxb0: C64,
}

/// A trial wavefunction together with the sizes and options the estimators need.
#[derive(Debug, Clone)]
pub struct Trial {
    pub wavefunction: TrialWavefunction,
    pub nbasis: usize,
    pub nalpha: usize,
    pub nbeta: usize,
    /// Closed shell: alpha and beta orbitals coincide.
    pub restricted: bool,
    /// Evaluate orthogonal expansions with Wick's theorem instead of brute force.
    pub use_wicks: bool,
    pub half_rotated: Option<HalfRotated>,
}

impl Trial {
    pub fn new(wavefunction: TrialWavefunction) -> Self {
        let reference = wavefunction.reference();
        Trial {
            nbasis: reference.nbasis(),
            nalpha: reference.nalpha(),
            nbeta: reference.nbeta(),
            wavefunction,
            restricted: false,
            use_wicks: true,
            half_rotated: None,
        }
    }

    /// Mark the trial closed shell. Every determinant must carry the same alpha and beta
    /// orbitals, since restricted energies only read the alpha channel.
    pub fn with_restricted(mut self, restricted: bool) -> EstimatorResult<Self> {
        if restricted {
            ensure_dim("restricted beta count", self.nbeta, self.nalpha)?;
            if let Some(d) = self
                .wavefunction
                .determinants()
                .iter()
                .position(|det| !same_orbitals(&det.alpha, &det.beta))
            {
                return Err(EstimatorError::InvalidTrial(format!(
                    "restricted trial with different alpha and beta orbitals in determinant {}",
                    d
                )));
            }
        }
        self.restricted = restricted;
        Ok(self)
    }

    pub fn with_wicks(mut self, use_wicks: bool) -> Self {
        self.use_wicks = use_wicks;
        self
    }

    /// Rotate the one- and two-body integrals of `ham` by the reference determinant and
    /// evaluate the reference energies. Real orbitals yield a real Cholesky slab.
    pub fn half_rotate(
        &mut self,
        ham: &GenericHamiltonian,
        backend: &dyn NumericBackend,
    ) -> EstimatorResult<()> {
        ensure_dim("hamiltonian basis size", ham.nbasis, self.nbasis)?;
        let reference = self.wavefunction.reference();
        let (psia, psib) = (&reference.alpha, &reference.beta);
        let (psia_h, psib_h) = (psia.adjoint(), psib.adjoint());

        let rh1a = &psia_h * ham.h1[0].map(|x| C64::new(x, 0.0));
        let rh1b = &psib_h * ham.h1[1].map(|x| C64::new(x, 0.0));

        let rotate = |psi_h: &CMatrix| -> EstimatorResult<CholeskySlab> {
            let nocc = psi_h.nrows();
            let rotated: Vec<CMatrix> = ham
                .chol
                .iter()
                .map(|l| psi_h * l.map(|x| C64::new(x, 0.0)))
                .collect();
            if is_real(psi_h) {
                let real = rotated.iter().map(|m| split_parts(m).0).collect();
                CholeskySlab::from_real(real, nocc, ham.nbasis)
            } else {
                CholeskySlab::from_complex(rotated, nocc, ham.nbasis)
            }
        };
        let rchol = InteractionSlab::new(rotate(&psia_h)?, rotate(&psib_h)?)?;

        let self_green = |psi: &CMatrix| -> EstimatorResult<CMatrix> {
            let ovlp = psi.transpose() * psi.conjugate();
            let inv = backend.inverse(&ovlp).ok_or_else(|| {
                EstimatorError::InvalidTrial("reference orbitals are linearly dependent".into())
            })?;
            Ok(inv * psi.transpose())
        };
        let ghalf0a = self_green(psia)?;
        let ghalf0b = self_green(psib)?;

        let g0a = std::slice::from_ref(&ghalf0a);
        let g0b = std::slice::from_ref(&ghalf0b);
        let ecoul0 = ecoul_kernel_uhf(&rchol, g0a, g0b)?[0];
        let exxa0 = exx_kernel(&rchol.alpha, g0a, backend)?[0];
        let exxb0 = exx_kernel(&rchol.beta, g0b, backend)?[0];
        debug!(
            "reference two-body energies: ecoul0 = {:.10}, exxa0 = {:.10}, exxb0 = {:.10}",
            ecoul0.re, exxa0.re, exxb0.re
        );

        let eris = if ham.flags.exact_eri {
            Some(HalfRotatedEri::from_slab(&rchol))
        } else {
            None
        };
        let pno = match (&eris, ham.flags.pno) {
            (Some(eris), true) => {
                let factors = PnoFactors::from_eri(
                    eris,
                    self.nalpha,
                    self.nbeta,
                    ham.nbasis,
                    ham.flags.pno_threshold,
                )?;
                info!(
                    "PNO pair blocks truncated at {:e}: total rank {}",
                    ham.flags.pno_threshold,
                    factors.rank()
                );
                Some(factors)
            }
            _ => None,
        };

        self.half_rotated = Some(HalfRotated {
            rh1a,
            rh1b,
            rchol,
            eris,
            pno,
            ghalf0a,
            ghalf0b,
            ecoul0,
            exxa0,
            exxb0,
        });
        Ok(())
    }
}
