//! Implicit ULV solve: the centerpiece of this crate.
//!
//! A bottom-up sweep reduces each node's diagonal block with an interleaved
//! QL/LQ factorization, peeling off and solving as many rows/columns
//! locally as the node's generator rank allows, and passes the remaining
//! ("residual") block up to be merged with its sibling. The recursion
//! bottoms out at the root, where the final residual is square by
//! construction and solved densely. A top-down pass then walks the
//! factorization side-tree built during the bottom-up sweep and un-rotates
//! each node's locally-solved piece back into the original column basis.
//!
//! Unlike `compress`/`matvec`, which thread partial results purely through
//! return values and never need anything resembling a shared output
//! buffer, the un-rotation here genuinely depends on a value that isn't
//! known until an ancestor (possibly the root) finishes its own solve.
//! Rather than writing into a shared buffer sliced by global column index,
//! this implementation keeps the whole computation tree-shaped: the
//! top-down pass hands each node the correctly-ordered tail of already-
//! solved values from its parent, and each node hands its own reconstructed
//! piece back up to be concatenated with its sibling's — mirroring how
//! `compress` and `matvec` already reassemble results via `vstack` instead
//! of a shared mutable array.

use ndarray::{s, Array2};

use super::HssNode;
use crate::error::Error;
use crate::float::Float;
use crate::linalg::{lq, ql, solve_dense, solve_triangular_lower, LqFactors, QlFactors};
use crate::recursion::{self, Context};
use crate::utils::{block2x2, vstack};
use crate::Result;

/// `solve(hss, b) -> x` such that `hss @ x ≈ b`. `hss` must be square;
/// `b` may carry any number of right-hand-side columns.
pub fn solve<T: Float>(hss: &HssNode<T>, b: &Array2<T>) -> Result<Array2<T>> {
    let (m, n) = hss.sz();
    if m != n {
        return Err(Error::dimension_mismatch(format!(
            "solve: hss is {m}x{n}, must be square"
        )));
    }
    if b.nrows() != n {
        return Err(Error::dimension_mismatch(format!(
            "solve: hss is {m}x{n} but b has {} rows",
            b.nrows()
        )));
    }
    log::debug!("solve: {m}x{n}, {} right-hand side column(s)", b.ncols());

    match hss {
        // Non-recursive special case: the whole matrix is one dense block.
        HssNode::Leaf { d, .. } => solve_dense(d, b),
        HssNode::Branch { child1, child2, sz1, b12, b21, .. } => {
            let ctx = Context::default();
            let (m1, _) = *sz1;
            let b1 = b.slice(s![0..m1, ..]).to_owned();
            let b2 = b.slice(s![m1.., ..]).to_owned();

            rayon::scope(|scope| {
                let child_ctx = ctx.descend();
                let handle = recursion::spawn(scope, ctx, {
                    let child1 = child1.as_ref();
                    move || reduce(scope, child1, b1, child_ctx)
                });
                let reduced2 = reduce(scope, child2.as_ref(), b2, child_ctx)?;
                let reduced1 = recursion::fetch(handle)?;

                let n1 = reduced1.d.nrows();
                let n2 = reduced2.d.nrows();
                if (n1 == 0) != (n2 == 0) {
                    return Err(Error::not_implemented(
                        "solve: exactly one child fully eliminated at the root merge",
                    ));
                }

                let off12 = reduced1.u.dot(b12).dot(&reduced2.v.t());
                let off21 = reduced2.u.dot(b21).dot(&reduced1.v.t());
                let d_merged = block2x2(&reduced1.d, &off12, &off21, &reduced2.d);

                let rhs1 = &reduced1.b - &reduced1.u.dot(b12).dot(&reduced2.u_up);
                let rhs2 = &reduced2.b - &reduced2.u.dot(b21).dot(&reduced1.u_up);
                let b_merged = vstack(&rhs1, &rhs2);

                let x_root = if d_merged.nrows() == 0 {
                    Array2::zeros((0, b.ncols()))
                } else {
                    solve_dense(&d_merged, &b_merged)?
                };

                let tail1 = x_root.slice(s![0..n1, ..]).to_owned();
                let tail2 = x_root.slice(s![n1.., ..]).to_owned();
                let x1 = reconstruct(&reduced1.fact, tail1);
                let x2 = reconstruct(&reduced2.fact, tail2);
                Ok(vstack(&x1, &x2))
            })
        }
    }
}

/// What a non-root node hands up to its parent: the still-unsolved
/// remainder of its diagonal block and generators, the projection of its
/// already-solved part through its own generator (for the parent's
/// coupling-term subtraction), and the side-tree node recording how to
/// un-rotate the locally-solved part once the remainder above it is known.
struct Reduced<T> {
    d: Array2<T>,
    u: Array2<T>,
    v: Array2<T>,
    b: Array2<T>,
    u_up: Array2<T>,
    fact: FactNode<T>,
}

/// The factorization side-tree built during the bottom-up sweep and walked
/// during the top-down reconstruction. Mirrors the shape of the HSS tree
/// below the root; kept as its own owned structure (rather than fields on
/// `HssNode`) so that `solve` never touches the input tree.
enum FactNode<T> {
    Leaf {
        qv: Option<Array2<T>>,
        z_local: Array2<T>,
    },
    Branch {
        qv: Option<Array2<T>>,
        z_local: Array2<T>,
        /// Row count of child 1's contribution to this node's merged
        /// column range, i.e. where to split the reconstructed vector
        /// between the two children on the way back down.
        split: usize,
        child1: Box<FactNode<T>>,
        child2: Box<FactNode<T>>,
    },
}

/// Bottom-up: reduces a non-root node (recursing into its children first,
/// if it is a branch) and returns its residual plus its factorization
/// side-tree node.
fn reduce<'scope, T: Float>(
    scope: &rayon::Scope<'scope>,
    node: &'scope HssNode<T>,
    b: Array2<T>,
    ctx: Context,
) -> Result<Reduced<T>> {
    match node {
        HssNode::Leaf { d, u, v, .. } => {
            let out = reduce_block(d.clone(), u.clone(), v.clone(), b)?;
            Ok(Reduced {
                d: out.d_resid,
                u: out.u_resid,
                v: out.v_resid,
                b: out.b_resid,
                u_up: out.u_up,
                fact: FactNode::Leaf { qv: out.qv, z_local: out.z_local },
            })
        }
        HssNode::Branch {
            child1,
            child2,
            sz1,
            b12,
            b21,
            r1,
            r2,
            w1,
            w2,
            ..
        } => {
            let (m1, _) = *sz1;
            let b1 = b.slice(s![0..m1, ..]).to_owned();
            let b2 = b.slice(s![m1.., ..]).to_owned();

            let child_ctx = ctx.descend();
            let handle = recursion::spawn(scope, ctx, {
                let child1 = child1.as_ref();
                move || reduce(scope, child1, b1, child_ctx)
            });
            let reduced2 = reduce(scope, child2.as_ref(), b2, child_ctx)?;
            let reduced1 = recursion::fetch(handle)?;

            let n1 = reduced1.d.nrows();
            let n2 = reduced2.d.nrows();
            if (n1 == 0) != (n2 == 0) {
                return Err(Error::not_implemented(
                    "solve: exactly one child fully eliminated at a non-root merge",
                ));
            }

            let off12 = reduced1.u.dot(b12).dot(&reduced2.v.t());
            let off21 = reduced2.u.dot(b21).dot(&reduced1.v.t());
            let d_merged = block2x2(&reduced1.d, &off12, &off21, &reduced2.d);

            let rhs1 = &reduced1.b - &reduced1.u.dot(b12).dot(&reduced2.u_up);
            let rhs2 = &reduced2.b - &reduced2.u.dot(b21).dot(&reduced1.u_up);
            let b_merged = vstack(&rhs1, &rhs2);

            let r1 = r1.as_ref().expect("non-root branch always carries R1");
            let r2 = r2.as_ref().expect("non-root branch always carries R2");
            let w1 = w1.as_ref().expect("non-root branch always carries W1");
            let w2 = w2.as_ref().expect("non-root branch always carries W2");
            let u_merged = vstack(&reduced1.u.dot(r1), &reduced2.u.dot(r2));
            let v_merged = vstack(&reduced1.v.dot(w1), &reduced2.v.dot(w2));

            let out = reduce_block(d_merged, u_merged, v_merged, b_merged)?;
            Ok(Reduced {
                d: out.d_resid,
                u: out.u_resid,
                v: out.v_resid,
                b: out.b_resid,
                u_up: out.u_up,
                fact: FactNode::Branch {
                    qv: out.qv,
                    z_local: out.z_local,
                    split: n1,
                    child1: Box::new(reduced1.fact),
                    child2: Box::new(reduced2.fact),
                },
            })
        }
    }
}

struct ReduceBlockOut<T> {
    d_resid: Array2<T>,
    u_resid: Array2<T>,
    v_resid: Array2<T>,
    b_resid: Array2<T>,
    u_up: Array2<T>,
    qv: Option<Array2<T>>,
    z_local: Array2<T>,
}

/// The shared leaf/branch reduction step: given a square diagonal block
/// `d` (`m x n`, `m == n`), its left/right generators `u` (`m x k`) and `v`
/// (`n x rv`), and the corresponding right-hand side `b` (`m x rhs`),
/// triangularizes as much of `d` as the generator rank allows and returns
/// the residual plus the rotation needed to recover the locally-solved
/// piece in the original basis.
///
/// `n == 0` (no columns left) and `k >= m` (generator too wide to reduce
/// anything) both pass the block through unchanged, per the edge cases
/// this algorithm is specified to tolerate.
fn reduce_block<T: Float>(d: Array2<T>, u: Array2<T>, v: Array2<T>, b: Array2<T>) -> Result<ReduceBlockOut<T>> {
    let (m, k) = u.dim();
    let n = d.ncols();
    let rhs = b.ncols();
    let rv = v.ncols();

    if n == 0 || k >= m {
        return Ok(ReduceBlockOut {
            d_resid: d,
            u_resid: u,
            v_resid: v,
            b_resid: b,
            u_up: Array2::zeros((rv, rhs)),
            qv: None,
            z_local: Array2::zeros((0, rhs)),
        });
    }

    // m == n is the solve's square-block invariant, so nk == m - k here.
    let nk = m - k;
    log::trace!("reduce_block: m={m} n={n} k={k} -> triangularizing nk={nk}, residual {k}x{rv}");

    // Zero out the top m-k rows of U via a full QL factorization; apply
    // the same rotation to D and b so the top nk rows of D no longer
    // depend on the as-yet-unsolved generator.
    let QlFactors { q: qu, l: l_full } = ql(&u);
    let d = qu.t().dot(&d);
    let b = qu.t().dot(&b);
    let u_tail = l_full.slice(s![nk.., ..]).to_owned();

    let d_top = d.slice(s![0..nk, ..]).to_owned();
    let d_bot = d.slice(s![nk.., ..]).to_owned();

    // LQ of the top block isolates an nk x nk triangular system in a
    // rotated column basis; apply the same column rotation to the bottom
    // block and to V.
    let LqFactors { q: qv, l: l1_full } = lq(&d_top);
    let l1 = l1_full.slice(s![.., 0..nk]).to_owned();

    let d_bot_rot = d_bot.dot(&qv.t().to_owned());
    let l2a = d_bot_rot.slice(s![.., 0..nk]).to_owned();
    let l2b = d_bot_rot.slice(s![.., nk..]).to_owned();

    let v_rot = qv.dot(&v);
    let v_top = v_rot.slice(s![0..nk, ..]).to_owned();
    let v_bot = v_rot.slice(s![nk.., ..]).to_owned();

    let b_top = b.slice(s![0..nk, ..]).to_owned();
    let b_bot = b.slice(s![nk.., ..]).to_owned();

    let z_local = solve_triangular_lower(&l1, &b_top)?;
    let b_bot_new = b_bot - l2a.dot(&z_local);
    let u_up = v_top.t().dot(&z_local);

    Ok(ReduceBlockOut {
        d_resid: l2b,
        u_resid: u_tail,
        v_resid: v_bot,
        b_resid: b_bot_new,
        u_up,
        qv: Some(qv),
        z_local,
    })
}

/// Top-down: combines this node's locally-solved piece (`z_local`, in the
/// rotated column basis) with the already-true tail handed down from the
/// parent, undoes this node's own rotation, and — for a branch — splits
/// the result and recurses into both children before reassembling.
fn reconstruct<T: Float>(fact: &FactNode<T>, tail: Array2<T>) -> Array2<T> {
    match fact {
        FactNode::Leaf { qv, z_local } => {
            let combined = vstack(z_local, &tail);
            match qv {
                Some(q) => q.t().dot(&combined),
                None => combined,
            }
        }
        FactNode::Branch { qv, z_local, split, child1, child2 } => {
            let combined = vstack(z_local, &tail);
            let full = match qv {
                Some(q) => q.t().dot(&combined),
                None => combined,
            };
            let tail1 = full.slice(s![0..*split, ..]).to_owned();
            let tail2 = full.slice(s![*split.., ..]).to_owned();
            let x1 = reconstruct(child1, tail1);
            let x2 = reconstruct(child2, tail2);
            vstack(&x1, &x2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::bisection_cluster;
    use crate::config::Config;
    use crate::hss::compress;
    use float_cmp::approx_eq;
    use ndarray::Array2;
    use rand::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn random_matrix(m: usize, n: usize, seed: u64) -> Array2<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Array2::from_shape_fn((m, n), |_| rng.gen_range(-1.0..1.0))
    }

    /// Strictly diagonally dominant, so `solve_dense` never hits a
    /// (near-)singular pivot regardless of the random off-diagonal.
    fn diagonally_dominant(n: usize, seed: u64) -> Array2<f64> {
        let mut a = random_matrix(n, n, seed);
        for i in 0..n {
            let row_sum: f64 = (0..n).filter(|&j| j != i).map(|j| a[[i, j]].abs()).sum();
            a[[i, i]] = row_sum + 10.0;
        }
        a
    }

    fn assert_close(a: &Array2<f64>, b: &Array2<f64>, eps: f64) {
        assert_eq!(a.dim(), b.dim());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!(approx_eq!(f64, *x, *y, epsilon = eps), "{x} vs {y}");
        }
    }

    #[test]
    fn root_as_single_leaf_solves_densely() {
        let a = diagonally_dominant(8, 1);
        let row_tree = bisection_cluster(0, 7, 16).unwrap();
        let col_tree = bisection_cluster(0, 7, 16).unwrap();
        let hss = compress(&a, &row_tree, &col_tree, &Config::default()).unwrap();
        assert!(hss.is_leaf());

        let b = random_matrix(8, 2, 2);
        let x = solve(&hss, &b).unwrap();
        assert_close(&a.dot(&x), &b, 1e-8);
    }

    #[test]
    fn solve_matches_dense_solve_on_random_matrix() {
        let n = 96;
        let a = diagonally_dominant(n, 3);
        let row_tree = bisection_cluster(0, n - 1, 12).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 12).unwrap();
        let config = Config::default().with_tol(1e-12).with_reltol(false);
        let hss = compress(&a, &row_tree, &col_tree, &config).unwrap();

        let b = random_matrix(n, 4, 4);
        let x_hss = solve(&hss, &b).unwrap();
        let x_dense = solve_dense(&a, &b).unwrap();

        let diff_norm = crate::utils::frobenius_norm(&(&x_hss - &x_dense));
        let ref_norm = crate::utils::frobenius_norm(&x_dense);
        assert!(diff_norm / ref_norm < 1e-6, "relative error {}", diff_norm / ref_norm);
    }

    #[test]
    fn identity_matrix_solves_to_identity() {
        // S4: solve(hss, I) == I to round-off.
        let n = 64;
        let a = Array2::<f64>::eye(n);
        let row_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let hss = compress(&a, &row_tree, &col_tree, &Config::default()).unwrap();

        let b = Array2::<f64>::eye(n);
        let x = solve(&hss, &b).unwrap();
        assert_close(&x, &b, 1e-8);
    }

    #[test]
    fn pure_diagonal_solve_matches_elementwise_division() {
        // S6: off-diagonal ranks are all 0; solve(hss, b) == b ./ d.
        let n = 48;
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let d: Vec<f64> = (0..n).map(|_| rng.gen_range(1.0..5.0)).collect();
        let mut a = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            a[[i, i]] = d[i];
        }
        let row_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let config = Config::default().with_tol(1e-12).with_reltol(false);
        let hss = compress(&a, &row_tree, &col_tree, &config).unwrap();

        let b = random_matrix(n, 3, 6);
        let x = solve(&hss, &b).unwrap();
        for i in 0..n {
            for c in 0..b.ncols() {
                assert!(approx_eq!(f64, x[[i, c]], b[[i, c]] / d[i], epsilon = 1e-9));
            }
        }
    }

    #[test]
    fn multiple_right_hand_sides_matches_separate_solves() {
        let n = 64;
        let a = diagonally_dominant(n, 7);
        let row_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let config = Config::default().with_tol(1e-12).with_reltol(false);
        let hss = compress(&a, &row_tree, &col_tree, &config).unwrap();

        let b1 = random_matrix(n, 1, 8);
        let b2 = random_matrix(n, 1, 9);
        let b_both = crate::utils::hstack(&b1, &b2);

        let x_both = solve(&hss, &b_both).unwrap();
        let x1 = solve(&hss, &b1).unwrap();
        let x2 = solve(&hss, &b2).unwrap();

        assert_close(&x_both.slice(s![.., 0..1]).to_owned(), &x1, 1e-8);
        assert_close(&x_both.slice(s![.., 1..2]).to_owned(), &x2, 1e-8);
    }

    #[test]
    fn rank_deficient_off_diagonal_solves_correctly() {
        // S5 construction, reused here to check solve (not just compress).
        let n = 64;
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let u: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..1.0)).collect();
        let v: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..1.0)).collect();
        let mut a = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..n {
                a[[i, j]] = if i == j { 5.0 } else { u[i] * v[j] };
            }
        }
        let row_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let col_tree = bisection_cluster(0, n - 1, 8).unwrap();
        let config = Config::default().with_tol(1e-12).with_reltol(false);
        let hss = compress(&a, &row_tree, &col_tree, &config).unwrap();

        let b = random_matrix(n, 2, 10);
        let x_hss = solve(&hss, &b).unwrap();
        let x_dense = solve_dense(&a, &b).unwrap();
        assert_close(&x_hss, &x_dense, 1e-6);
    }

    #[test]
    fn rejects_non_square_hss() {
        let a = random_matrix(8, 12, 11);
        let row_tree = bisection_cluster(0, 7, 4).unwrap();
        let col_tree = bisection_cluster(0, 11, 4).unwrap();
        let hss = compress(&a, &row_tree, &col_tree, &Config::default()).unwrap();
        let b = random_matrix(8, 1, 12);
        assert!(solve(&hss, &b).is_err());
    }

    #[test]
    fn rejects_mismatched_rhs_row_count() {
        let a = diagonally_dominant(16, 13);
        let row_tree = bisection_cluster(0, 15, 4).unwrap();
        let col_tree = bisection_cluster(0, 15, 4).unwrap();
        let hss = compress(&a, &row_tree, &col_tree, &Config::default()).unwrap();
        let b = random_matrix(15, 1, 14);
        assert!(solve(&hss, &b).is_err());
    }
}
