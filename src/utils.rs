//! Small free-standing helpers shared by compression, mat-vec, and solve:
//! free functions operating on generic numeric arrays rather than methods.

use ndarray::{s, Array2};

use crate::float::Float;

/// Frobenius norm of a dense matrix.
pub fn frobenius_norm<T: Float>(a: &Array2<T>) -> T {
    a.iter().map(|&v| v * v).fold(T::zero(), |acc, v| acc + v).sqrt()
}

/// Stacks `top` above `bottom`; both must share the same column count.
pub fn vstack<T: Float>(top: &Array2<T>, bottom: &Array2<T>) -> Array2<T> {
    assert_eq!(top.ncols(), bottom.ncols(), "vstack: column count mismatch");
    let mut out = Array2::zeros((top.nrows() + bottom.nrows(), top.ncols()));
    out.slice_mut(s![0..top.nrows(), ..]).assign(top);
    out.slice_mut(s![top.nrows().., ..]).assign(bottom);
    out
}

/// Places `left` beside `right`; both must share the same row count.
pub fn hstack<T: Float>(left: &Array2<T>, right: &Array2<T>) -> Array2<T> {
    assert_eq!(left.nrows(), right.nrows(), "hstack: row count mismatch");
    let mut out = Array2::zeros((left.nrows(), left.ncols() + right.ncols()));
    out.slice_mut(s![.., 0..left.ncols()]).assign(left);
    out.slice_mut(s![.., left.ncols()..]).assign(right);
    out
}

/// Assembles a 2x2 block matrix from its four quadrants.
pub fn block2x2<T: Float>(a11: &Array2<T>, a12: &Array2<T>, a21: &Array2<T>, a22: &Array2<T>) -> Array2<T> {
    vstack(&hstack(a11, a12), &hstack(a21, a22))
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use ndarray::array;

    #[test]
    fn frobenius_norm_matches_hand_computation() {
        let a = array![[3.0, 0.0], [0.0, 4.0]];
        assert!(approx_eq!(f64, frobenius_norm(&a), 5.0, epsilon = 1e-12));
    }

    #[test]
    fn vstack_and_hstack_reassemble_blocks() {
        let a11 = array![[1.0]];
        let a12 = array![[2.0]];
        let a21 = array![[3.0]];
        let a22 = array![[4.0]];
        let full = block2x2(&a11, &a12, &a21, &a22);
        assert_eq!(full, array![[1.0, 2.0], [3.0, 4.0]]);
    }
}
