//! Connected contributions of one excited determinant to the Wick intermediate.
//!
//! For an excitation `cre -> anh` of degree d the overlap ratio to the reference is
//! `phase * det(M)` with `M[k, l] = G0[cre_k, anh_l]`. Its derivative with respect to
//! `G0[cre_i, anh_j]` is the cofactor of `M[i, j]`, which is scattered into
//! `CI[anh_j, cre_i]`. Degrees one to three have closed forms; everything else expands the
//! cofactors of `M` explicitly.

use backend::{laplace_determinant, minor, CMatrix, NumericBackend, C64};

/// `(ci, g0, cre, anh, weight, backend)`
pub type ScatterFn = fn(&mut CMatrix, &CMatrix, &[usize], &[usize], C64, &dyn NumericBackend);

const CLOSED_FORMS: [ScatterFn; 3] = [scatter_single, scatter_pair, scatter_triple];

/// The scatter rule used for an excitation of `degree`.
pub fn scatter_rule(degree: usize) -> ScatterFn {
    match degree {
        1..=3 => CLOSED_FORMS[degree - 1],
        _ => scatter_general,
    }
}

pub fn excitation_matrix(g0: &CMatrix, cre: &[usize], anh: &[usize]) -> CMatrix {
    CMatrix::from_fn(cre.len(), anh.len(), |k, l| g0[(cre[k], anh[l])])
}

/// Determinant of an excitation matrix. Up to 3 x 3 it is expanded directly.
pub fn excitation_determinant(m: &CMatrix, backend: &dyn NumericBackend) -> C64 {
    if m.nrows() <= 3 {
        laplace_determinant(m)
    } else {
        backend.det(m)
    }
}

fn pair_det(g0: &CMatrix, (cp, cq): (usize, usize), (ar, as_): (usize, usize)) -> C64 {
    g0[(cp, ar)] * g0[(cq, as_)] - g0[(cp, as_)] * g0[(cq, ar)]
}

pub fn scatter_single(
    ci: &mut CMatrix,
    _g0: &CMatrix,
    cre: &[usize],
    anh: &[usize],
    w: C64,
    _backend: &dyn NumericBackend,
) {
    ci[(anh[0], cre[0])] += w;
}

pub fn scatter_pair(
    ci: &mut CMatrix,
    g0: &CMatrix,
    cre: &[usize],
    anh: &[usize],
    w: C64,
    _backend: &dyn NumericBackend,
) {
    let (c0, c1) = (cre[0], cre[1]);
    let (a0, a1) = (anh[0], anh[1]);
    ci[(a0, c0)] += w * g0[(c1, a1)];
    ci[(a1, c1)] += w * g0[(c0, a0)];
    ci[(a1, c0)] -= w * g0[(c1, a0)];
    ci[(a0, c1)] -= w * g0[(c0, a1)];
}

pub fn scatter_triple(
    ci: &mut CMatrix,
    g0: &CMatrix,
    cre: &[usize],
    anh: &[usize],
    w: C64,
    _backend: &dyn NumericBackend,
) {
    let (c0, c1, c2) = (cre[0], cre[1], cre[2]);
    let (a0, a1, a2) = (anh[0], anh[1], anh[2]);

    ci[(a0, c0)] += w * pair_det(g0, (c1, c2), (a1, a2));
    ci[(a1, c0)] -= w * pair_det(g0, (c1, c2), (a0, a2));
    ci[(a2, c0)] += w * pair_det(g0, (c1, c2), (a0, a1));

    ci[(a0, c1)] -= w * pair_det(g0, (c0, c2), (a1, a2));
    ci[(a1, c1)] += w * pair_det(g0, (c0, c2), (a0, a2));
    ci[(a2, c1)] -= w * pair_det(g0, (c0, c2), (a0, a1));

    ci[(a0, c2)] += w * pair_det(g0, (c0, c1), (a1, a2));
    ci[(a1, c2)] -= w * pair_det(g0, (c0, c1), (a0, a2));
    ci[(a2, c2)] += w * pair_det(g0, (c0, c1), (a0, a1));
}

/// Cofactor expansion over the minors of the same-spin excitation matrix. Valid for every
/// degree.
pub fn scatter_general(
    ci: &mut CMatrix,
    g0: &CMatrix,
    cre: &[usize],
    anh: &[usize],
    w: C64,
    backend: &dyn NumericBackend,
) {
    let m = excitation_matrix(g0, cre, anh);
    for i in 0..cre.len() {
        for j in 0..anh.len() {
            let sign = if (i + j) % 2 == 0 { 1.0 } else { -1.0 };
            let cofactor = excitation_determinant(&minor(&m, i, j), backend) * sign;
            ci[(anh[j], cre[i])] += w * cofactor;
        }
    }
}
