//! Dense linear-algebra facade consumed by compression, mat-vec, and solve:
//! QL/LQ, triangular solve, and a dense general solve, playing the role an
//! external BLAS/LAPACK binding would in a larger numerical stack. No such
//! binding is pulled in here, so this module hand-implements the facade on
//! top of plain `ndarray` storage. `Q` factors are kept as explicit dense
//! orthogonal matrices rather than a compact Householder-vector
//! representation, trading some memory for a simpler, easier-to-get-right
//! implementation.

mod facade;
mod rrqr;

pub use facade::{lq, ql, solve_dense, solve_triangular_lower, LqFactors, QlFactors, Triangle};
pub use rrqr::rrqr;
