//! HSS matrix-vector (matrix-matrix) product.
//!
//! Two passes over the tree. The upward pass contracts each node's own
//! generator `V` against the relevant slice of `x`, producing a tree of
//! `g_v` values (mirroring the HSS tree's shape); the downward pass
//! consumes that `g_v` tree alongside the HSS tree, expanding through `U`
//! and the coupling blocks. Splitting the two sweeps this way means every
//! node's `g_v` is computed exactly once, not re-derived by each ancestor
//! that needs it.

use ndarray::{Array2, ArrayView2};

use super::HssNode;
use crate::error::Error;
use crate::float::Float;
use crate::recursion::{self, Context};
use crate::utils::vstack;
use crate::Result;

/// Mirrors the HSS tree's shape; `own(node)` is `Vᵀ · x_local` for a leaf,
/// or `[W1ᵀ·g_v1; W2ᵀ·g_v2]` for a non-root branch (unused, zero-sized, at
/// the root, which has no parent to consume it).
enum GTree<T> {
    Leaf(Array2<T>),
    Branch(Array2<T>, Box<GTree<T>>, Box<GTree<T>>),
}

impl<T: Float> GTree<T> {
    fn own(&self) -> &Array2<T> {
        match self {
            GTree::Leaf(g) => g,
            GTree::Branch(g, ..) => g,
        }
    }
}

/// `hss · x`. `x` has `cols(hss)` rows and any number of columns.
pub fn matvec<T: Float>(hss: &HssNode<T>, x: &Array2<T>) -> Result<Array2<T>> {
    let (m, n) = hss.sz();
    if x.nrows() != n {
        return Err(Error::dimension_mismatch(format!(
            "matvec: hss is {m}x{n} but x has {} rows",
            x.nrows()
        )));
    }

    let ctx = Context::default();
    rayon::scope(|scope| {
        let gtree = upward_pass(scope, hss, x.view(), ctx)?;
        let rhs = x.ncols();
        let f_u0 = match hss {
            HssNode::Leaf { u, .. } => Array2::zeros((u.ncols(), rhs)),
            HssNode::Branch { .. } => Array2::zeros((0, rhs)),
        };
        downward_pass(scope, hss, gtree, x.view(), f_u0, ctx)
    })
}

fn upward_pass<'scope, T: Float>(
    scope: &rayon::Scope<'scope>,
    node: &'scope HssNode<T>,
    x_local: ArrayView2<'_, T>,
    ctx: Context,
) -> Result<GTree<T>> {
    match node {
        HssNode::Leaf { v, .. } => Ok(GTree::Leaf(v.t().dot(&x_local))),
        HssNode::Branch {
            child1,
            child2,
            sz1,
            w1,
            w2,
            is_root,
            ..
        } => {
            let (m1, _) = *sz1;
            let x1 = x_local.slice(ndarray::s![0..m1, ..]).to_owned();
            let x2 = x_local.slice(ndarray::s![m1.., ..]).to_owned();

            let child_ctx = ctx.descend();
            let handle = recursion::spawn(scope, ctx, {
                let child1 = child1.as_ref();
                move || upward_pass(scope, child1, x1.view(), child_ctx)
            });
            let g2 = upward_pass(scope, child2.as_ref(), x2.view(), child_ctx)?;
            let g1 = recursion::fetch(handle)?;

            let own = if *is_root {
                Array2::zeros((0, x_local.ncols()))
            } else {
                let w1 = w1.as_ref().expect("non-root branch always carries W1");
                let w2 = w2.as_ref().expect("non-root branch always carries W2");
                vstack(&w1.t().dot(g1.own()), &w2.t().dot(g2.own()))
            };
            Ok(GTree::Branch(own, Box::new(g1), Box::new(g2)))
        }
    }
}

/// Consumes `gtree` (rather than borrowing it) so that its per-child
/// subtrees can be moved into spawned closures without fighting the
/// borrow checker over a lifetime that isn't `'scope`.
fn downward_pass<'scope, T: Float>(
    scope: &rayon::Scope<'scope>,
    node: &'scope HssNode<T>,
    gtree: GTree<T>,
    x_local: ArrayView2<'_, T>,
    f_u_in: Array2<T>,
    ctx: Context,
) -> Result<Array2<T>> {
    match (node, gtree) {
        (HssNode::Leaf { d, u, .. }, GTree::Leaf(_)) => Ok(d.dot(&x_local) + u.dot(&f_u_in)),
        (
            HssNode::Branch {
                child1,
                child2,
                sz1,
                b12,
                b21,
                r1,
                r2,
                is_root,
                ..
            },
            GTree::Branch(_, g1_box, g2_box),
        ) => {
            let (m1, _) = *sz1;
            let x1 = x_local.slice(ndarray::s![0..m1, ..]).to_owned();
            let x2 = x_local.slice(ndarray::s![m1.., ..]).to_owned();

            let g1_own = g1_box.own().clone();
            let g2_own = g2_box.own().clone();

            let f_u1 = if *is_root {
                b12.dot(&g2_own)
            } else {
                r1.as_ref().expect("non-root branch always carries R1").t().dot(&f_u_in) + b12.dot(&g2_own)
            };
            let f_u2 = if *is_root {
                b21.dot(&g1_own)
            } else {
                r2.as_ref().expect("non-root branch always carries R2").t().dot(&f_u_in) + b21.dot(&g1_own)
            };

            let child_ctx = ctx.descend();
            let handle = recursion::spawn(scope, ctx, {
                let child1 = child1.as_ref();
                move || downward_pass(scope, child1, *g1_box, x1.view(), f_u1, child_ctx)
            });
            let y2 = downward_pass(scope, child2.as_ref(), *g2_box, x2.view(), f_u2, child_ctx)?;
            let y1 = recursion::fetch(handle)?;

            Ok(vstack(&y1, &y2))
        }
        _ => unreachable!("GTree shape always mirrors the HSS tree"),
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

    #[test]
    fn matvec_matches_dense_product() {
        let a = random_matrix(64, 64, 21);
        let row_tree = bisection_cluster(0, 63, 8).unwrap();
        let col_tree = bisection_cluster(0, 63, 8).unwrap();
        let config = Config::default().with_tol(1e-10).with_reltol(false);
        let hss = compress(&a, &row_tree, &col_tree, &config).unwrap();

        let x = random_matrix(64, 3, 22);
        let y_hss = matvec(&hss, &x).unwrap();
        let y_dense = a.dot(&x);
        for (got, want) in y_hss.iter().zip(y_dense.iter()) {
            assert!(approx_eq!(f64, *got, *want, epsilon = 1e-6));
        }
    }

    #[test]
    fn matvec_rejects_wrong_shaped_input() {
        let a = random_matrix(16, 16, 5);
        let row_tree = bisection_cluster(0, 15, 4).unwrap();
        let col_tree = bisection_cluster(0, 15, 4).unwrap();
        let hss = compress(&a, &row_tree, &col_tree, &Config::default()).unwrap();
        let x = random_matrix(15, 2, 6);
        assert!(matvec(&hss, &x).is_err());
    }
}
