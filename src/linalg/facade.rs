//! QL/LQ, triangular solve, and dense solve: the parts of the facade this
//! crate hand-implements (see `linalg` module docs).

use ndarray::Array2;

use super::rrqr::qr_plain;
use crate::error::Error;
use crate::float::Float;
use crate::Result;

/// Full QL factorization: `a` is `m x k` (`k <= m`). `q` is `m x m`
/// orthogonal; `l` is `m x k` with its top `m - k` rows zero and its
/// bottom `k x k` block lower triangular, i.e. `q.t().dot(a) == l`.
///
/// Derived from a plain QR by reversing `a`'s columns, taking its QR, then
/// reversing the columns of `Q` and rotating `R` by 180 degrees (reversing
/// both its rows and its columns) — the standard exchange-matrix reduction
/// of QL to QR.
pub struct QlFactors<T> {
    pub q: Array2<T>,
    pub l: Array2<T>,
}

pub fn ql<T: Float>(a: &Array2<T>) -> QlFactors<T> {
    let (m, k) = a.dim();
    let reversed_cols = reverse_columns(a);
    let (qc, rc) = qr_plain(&reversed_cols.view());
    let q = reverse_columns(&qc);
    let l = rotate_180(&rc, m, k);
    QlFactors { q, l }
}

/// Full LQ factorization: `a` is `p x n` (`p <= n`). `q` is `n x n`
/// orthogonal; `l` is `p x n` with its first `p` columns forming a lower
/// triangular block and the rest zero, i.e. `a.dot(q.t()) == l`.
///
/// Derived from a plain QR of `a`'s transpose: `a^T = Qt Rt` (tall, top
/// `p x p` block of `Rt` upper triangular); then `q = Qt^T`,
/// `l = Rt^T`, whose first `p` columns are the transpose of an upper
/// triangular block and therefore lower triangular.
pub struct LqFactors<T> {
    pub q: Array2<T>,
    pub l: Array2<T>,
}

pub fn lq<T: Float>(a: &Array2<T>) -> LqFactors<T> {
    let at = a.t().to_owned();
    let (qt, rt) = qr_plain(&at.view());
    let q = qt.t().to_owned();
    let l = rt.t().to_owned();
    LqFactors { q, l }
}

fn reverse_columns<T: Float>(a: &Array2<T>) -> Array2<T> {
    let n = a.ncols();
    let mut out = Array2::zeros(a.dim());
    for j in 0..n {
        out.column_mut(j).assign(&a.column(n - 1 - j));
    }
    out
}

/// Reverses both the rows and the columns of an `m x k` matrix.
fn rotate_180<T: Float>(a: &Array2<T>, m: usize, k: usize) -> Array2<T> {
    let mut out = Array2::zeros((m, k));
    for i in 0..m {
        for j in 0..k {
            out[[i, j]] = a[[m - 1 - i, k - 1 - j]];
        }
    }
    out
}

/// Which side of the diagonal a square matrix is triangular on, for
/// [`solve_triangular`]-style operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Triangle {
    Lower,
    Upper,
}

/// Solves `l @ x = b` where `l` (`n x n`) is lower triangular, via forward
/// substitution. Used for §4.5.1's `L1 @ z_local = b_top`.
pub fn solve_triangular_lower<T: Float>(l: &Array2<T>, b: &Array2<T>) -> Result<Array2<T>> {
    solve_triangular(Triangle::Lower, l, b)
}

pub fn solve_triangular<T: Float>(kind: Triangle, t: &Array2<T>, b: &Array2<T>) -> Result<Array2<T>> {
    let (n, n2) = t.dim();
    if n != n2 {
        return Err(Error::dimension_mismatch(format!(
            "solve_triangular: triangle must be square, got {n}x{n2}"
        )));
    }
    if b.nrows() != n {
        return Err(Error::dimension_mismatch(format!(
            "solve_triangular: rhs has {} rows, expected {n}",
            b.nrows()
        )));
    }
    let rhs = b.ncols();
    let mut x = Array2::<T>::zeros((n, rhs));

    let order: Box<dyn Iterator<Item = usize>> = match kind {
        Triangle::Lower => Box::new(0..n),
        Triangle::Upper => Box::new((0..n).rev()),
    };

    for i in order {
        let diag = t[[i, i]];
        if diag.abs() <= T::epsilon() {
            return Err(Error::numerical_failure(format!(
                "solve_triangular: zero pivot at row {i}"
            )));
        }
        for c in 0..rhs {
            let mut acc = b[[i, c]];
            match kind {
                Triangle::Lower => {
                    for j in 0..i {
                        acc = acc - t[[i, j]] * x[[j, c]];
                    }
                }
                Triangle::Upper => {
                    for j in i + 1..n {
                        acc = acc - t[[i, j]] * x[[j, c]];
                    }
                }
            }
            x[[i, c]] = acc / diag;
        }
    }
    Ok(x)
}

/// Dense `solve(A, B) -> X` with `A @ X = B`, via Gaussian elimination with
/// partial pivoting. The root-level `gesv`-equivalent of §4.5.2.
pub fn solve_dense<T: Float>(a: &Array2<T>, b: &Array2<T>) -> Result<Array2<T>> {
    let (n, n2) = a.dim();
    if n != n2 {
        return Err(Error::dimension_mismatch(format!(
            "solve_dense: matrix must be square, got {n}x{n2}"
        )));
    }
    if b.nrows() != n {
        return Err(Error::dimension_mismatch(format!(
            "solve_dense: rhs has {} rows, expected {n}",
            b.nrows()
        )));
    }
    if n == 0 {
        return Ok(Array2::zeros((0, b.ncols())));
    }

    let mut m = a.clone();
    let mut rhs = b.clone();

    for k in 0..n {
        let (pivot, pivot_val) = (k..n)
            .map(|i| (i, m[[i, k]].abs()))
            .fold((k, T::zero()), |(bi, bv), (i, v)| if v > bv { (i, v) } else { (bi, bv) });
        if pivot_val <= T::epsilon() {
            return Err(Error::numerical_failure(format!(
                "solve_dense: singular matrix (zero pivot at column {k})"
            )));
        }
        if pivot != k {
            swap_rows(&mut m, k, pivot);
            swap_rows(&mut rhs, k, pivot);
        }

        let pivot_val = m[[k, k]];
        for i in k + 1..n {
            let factor = m[[i, k]] / pivot_val;
            if factor == T::zero() {
                continue;
            }
            for j in k..n {
                m[[i, j]] = m[[i, j]] - factor * m[[k, j]];
            }
            for j in 0..rhs.ncols() {
                rhs[[i, j]] = rhs[[i, j]] - factor * rhs[[k, j]];
            }
        }
    }

    solve_triangular(Triangle::Upper, &m, &rhs)
}

fn swap_rows<T: Float>(a: &mut Array2<T>, i: usize, j: usize) {
    if i == j {
        return;
    }
    for col in 0..a.ncols() {
        let tmp = a[[i, col]];
        a[[i, col]] = a[[j, col]];
        a[[j, col]] = tmp;
    }
}
