//! Rank-revealing QR: column-pivoted Householder QR with early truncation.

use ndarray::{s, Array1, Array2, ArrayView2, Axis};

use crate::error::Error;
use crate::float::Float;
use crate::Result;

/// Plain (non-pivoted, non-truncating) full Householder QR: `A = Q R` with
/// `Q` square orthogonal (`m x m`) and `R` upper trapezoidal (`m x n`).
/// Shared by [`rrqr`] (which layers pivoting and truncation on top) and by
/// the QL/LQ facade, which derives those factorizations from this one via
/// column/row reversal.
pub(crate) fn qr_plain<T: Float>(a: &ArrayView2<T>) -> (Array2<T>, Array2<T>) {
    let (m, n) = a.dim();
    let mut r = a.to_owned();
    let mut q = Array2::<T>::eye(m);

    let steps = m.min(n);
    for k in 0..steps {
        apply_householder_step(&mut r, &mut q, k);
    }
    (q, r)
}

/// Zeroes `r[k+1.., k]` via a Householder reflection applied from the left
/// to `r[k.., k..]`, accumulating the reflection into `q[:, k..]` on the
/// right so that `q` keeps tracking the orthogonal factor.
fn apply_householder_step<T: Float>(r: &mut Array2<T>, q: &mut Array2<T>, k: usize) {
    let m = r.nrows();
    let col = r.slice(s![k..m, k]).to_owned();
    let norm = col.iter().map(|&v| v * v).fold(T::zero(), |a, b| a + b).sqrt();
    if norm <= T::epsilon() {
        return;
    }

    let alpha = if col[0] >= T::zero() { -norm } else { norm };
    let mut v = col;
    v[0] = v[0] - alpha;
    let v_norm = v.iter().map(|&x| x * x).fold(T::zero(), |a, b| a + b).sqrt();
    if v_norm <= T::epsilon() {
        return;
    }
    v.mapv_inplace(|x| x / v_norm);

    // R[k.., k..] -= 2 v (v^T R[k.., k..])
    let two = T::one() + T::one();
    {
        let mut sub = r.slice_mut(s![k..m, k..]);
        let vt_r = v.dot(&sub);
        for (mut row, &vi) in sub.axis_iter_mut(Axis(0)).zip(v.iter()) {
            row.scaled_add(-two * vi, &vt_r);
        }
    }

    // Q[:, k..] -= 2 (Q[:, k..] v) v^T
    {
        let mut sub = q.slice_mut(s![.., k..m]);
        let qv: Array1<T> = sub.dot(&v);
        for (mut col, &vi) in sub.axis_iter_mut(Axis(1)).zip(v.iter()) {
            col.scaled_add(-two * vi, &qv);
        }
    }
}

/// `rrqr(A, tol, reltol) -> (Q, R, p, k)`: column-pivoted Householder QR
/// with truncation as soon as the trailing pivot-column norm falls below
/// the threshold. `Q` has orthonormal columns (`m x k`), `R` is upper
/// triangular with `k` rows (`k x n`), `p` permutes `A`'s columns
/// (`A[:, p] = Q @ R`, to within the tolerance).
pub fn rrqr<T: Float>(a: &Array2<T>, tol: T, reltol: bool) -> Result<(Array2<T>, Array2<T>, Vec<usize>, usize)> {
    if tol < T::zero() || !tol.is_finite() {
        return Err(Error::invalid_argument("rrqr: tol must be a nonnegative finite value"));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid_argument("rrqr: input contains NaN/Inf"));
    }

    let (m, n) = a.dim();
    let mut perm: Vec<usize> = (0..n).collect();
    if m == 0 || n == 0 {
        return Ok((Array2::zeros((m, 0)), Array2::zeros((0, n)), perm, 0));
    }

    let a_fro = a.iter().map(|&v| v * v).fold(T::zero(), |acc, v| acc + v).sqrt();
    if a_fro <= T::epsilon() {
        return Ok((Array2::zeros((m, 0)), Array2::zeros((0, n)), perm, 0));
    }
    let threshold = if reltol { tol * a_fro } else { tol };

    let mut r = a.to_owned();
    let mut q = Array2::<T>::eye(m);
    let max_rank = m.min(n);
    let mut k = 0usize;

    while k < max_rank {
        // Pick the remaining column with the largest trailing norm.
        let (pivot_rel, pivot_norm) = (k..n)
            .map(|j| {
                let norm = r
                    .slice(s![k..m, j])
                    .iter()
                    .map(|&v| v * v)
                    .fold(T::zero(), |acc, v| acc + v)
                    .sqrt();
                (j - k, norm)
            })
            .fold((0usize, T::zero()), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) });
        let pivot = k + pivot_rel;

        if pivot_norm <= threshold {
            break;
        }

        if pivot != k {
            swap_columns(&mut r, k, pivot);
            perm.swap(k, pivot);
        }

        apply_householder_step(&mut r, &mut q, k);
        k += 1;
    }

    let q_trunc = q.slice(s![.., 0..k]).to_owned();
    let r_trunc = r.slice(s![0..k, ..]).to_owned();
    Ok((q_trunc, r_trunc, perm, k))
}

fn swap_columns<T: Float>(a: &mut Array2<T>, i: usize, j: usize) {
    if i == j {
        return;
    }
    for row in 0..a.nrows() {
        let tmp = a[[row, i]];
        a[[row, i]] = a[[row, j]];
        a[[row, j]] = tmp;
    }
}
