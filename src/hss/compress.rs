//! Direct, top-down HSS compression.
//!
//! Each node computes its own left/right generator via RRQR against
//! everything outside its own row/column range (an "extra" block supplied
//! by the parent); a branch additionally derives its children's
//! translation operators by orthogonal projection, justified because a
//! child's RRQR target strictly contains its parent's (the parent's
//! "extra" block is always a subset of the child's).

use ndarray::Array2;

use super::HssNode;
use crate::cluster::Cluster;
use crate::config::Config;
use crate::error::Error;
use crate::float::Float;
use crate::linalg::rrqr;
use crate::recursion::{self, Context};
use crate::utils::hstack;
use crate::Result;

/// Compresses `a` into an HSS tree using `row_tree`/`col_tree` to delimit
/// the recursive row/column partition. `row_tree` and `col_tree` must have
/// identical branching structure; row/column partitions that disagree
/// across levels are not supported.
pub fn compress<T: Float>(
    a: &Array2<T>,
    row_tree: &Cluster,
    col_tree: &Cluster,
    config: &Config,
) -> Result<HssNode<T>> {
    let (m, n) = a.dim();
    let (rlo, rhi) = row_tree.range();
    let (clo, chi) = col_tree.range();
    if rhi - rlo + 1 != m || chi - clo + 1 != n {
        return Err(Error::dimension_mismatch(format!(
            "compress: A is {m}x{n} but row tree covers {} and column tree covers {}",
            rhi - rlo + 1,
            chi - clo + 1
        )));
    }
    log::debug!("compress: {m}x{n}, leafsize={}, tol={}, reltol={}", config.leafsize, config.tol, config.reltol);
    let tol = T::from(config.tol)
        .ok_or_else(|| Error::invalid_argument("compress: tol does not fit the target float type"))?;
    if tol < T::zero() {
        return Err(Error::invalid_argument("compress: tol must be nonnegative"));
    }

    let extra_cols = Array2::<T>::zeros((m, 0));
    let extra_rows = Array2::<T>::zeros((0, n));

    let ctx = Context::default();
    let result = rayon::scope(|scope| {
        build(
            scope, a, row_tree, col_tree, tol, config.reltol, true, extra_cols, extra_rows, ctx,
        )
    })?;
    Ok(result.0)
}

type BuildResult<T> = (HssNode<T>, Array2<T>, Array2<T>);

#[allow(clippy::too_many_arguments)]
fn build<'scope, T: Float>(
    scope: &rayon::Scope<'scope>,
    a: &'scope Array2<T>,
    row_node: &'scope Cluster,
    col_node: &'scope Cluster,
    tol: T,
    reltol: bool,
    is_root: bool,
    extra_cols: Array2<T>,
    extra_rows: Array2<T>,
    ctx: Context,
) -> Result<BuildResult<T>> {
    match (row_node, col_node) {
        (Cluster::Leaf { lo: rlo, hi: rhi, .. }, Cluster::Leaf { lo: clo, hi: chi, .. }) => {
            let d = a.slice(ndarray::s![*rlo..=*rhi, *clo..=*chi]).to_owned();
            let (u, v) = own_generators(&extra_cols, &extra_rows, tol, reltol)?;
            let sz = (d.nrows(), d.ncols());
            let node = HssNode::Leaf {
                sz,
                is_root,
                d,
                u: u.clone(),
                v: v.clone(),
            };
            Ok((node, u, v))
        }
        (
            Cluster::Branch {
                left: row_left,
                right: row_right,
                ..
            },
            Cluster::Branch {
                left: col_left,
                right: col_right,
                ..
            },
        ) => {
            let (r1lo, r1hi) = row_left.range();
            let (r2lo, r2hi) = row_right.range();
            let (c1lo, c1hi) = col_left.range();
            let (c2lo, c2hi) = col_right.range();
            let m1 = r1hi - r1lo + 1;
            let n1 = c1hi - c1lo + 1;

            let a_r1c2 = a.slice(ndarray::s![r1lo..=r1hi, c2lo..=c2hi]).to_owned();
            let a_r2c1 = a.slice(ndarray::s![r2lo..=r2hi, c1lo..=c1hi]).to_owned();

            let extra_cols_1 = hstack(&a_r1c2, &extra_cols.slice(ndarray::s![0..m1, ..]).to_owned());
            let extra_cols_2 = hstack(&a_r2c1, &extra_cols.slice(ndarray::s![m1.., ..]).to_owned());
            let extra_rows_1 = crate::utils::vstack(&a_r2c1, &extra_rows.slice(ndarray::s![.., 0..n1]).to_owned());
            let extra_rows_2 = crate::utils::vstack(&a_r1c2, &extra_rows.slice(ndarray::s![.., n1..]).to_owned());

            let child_ctx = ctx.descend();
            let handle = recursion::spawn(scope, ctx, {
                let row_left = row_left.as_ref();
                let col_left = col_left.as_ref();
                move || build(scope, a, row_left, col_left, tol, reltol, false, extra_cols_1, extra_rows_1, child_ctx)
            });

            let right_result = build(
                scope,
                a,
                row_right.as_ref(),
                col_right.as_ref(),
                tol,
                reltol,
                false,
                extra_cols_2,
                extra_rows_2,
                child_ctx,
            )?;
            let left_result = recursion::fetch(handle)?;

            let (child1, u1, v1) = left_result;
            let (child2, u2, v2) = right_result;

            let b12 = u1.t().dot(&a_r1c2).dot(&v2);
            let b21 = u2.t().dot(&a_r2c1).dot(&v1);
            log::trace!("compress: branch ({m1}+{n1}) coupling ranks ru1={} rv2={} / ru2={} rv1={}", u1.ncols(), v2.ncols(), u2.ncols(), v1.ncols());

            let (u_node, v_node) = own_generators(&extra_cols, &extra_rows, tol, reltol)?;

            let (r1, r2, w1, w2) = if is_root {
                (None, None, None, None)
            } else {
                let u_top = u_node.slice(ndarray::s![0..m1, ..]).to_owned();
                let u_bot = u_node.slice(ndarray::s![m1.., ..]).to_owned();
                let v_top = v_node.slice(ndarray::s![0..n1, ..]).to_owned();
                let v_bot = v_node.slice(ndarray::s![n1.., ..]).to_owned();
                (
                    Some(u1.t().dot(&u_top)),
                    Some(u2.t().dot(&u_bot)),
                    Some(v1.t().dot(&v_top)),
                    Some(v2.t().dot(&v_bot)),
                )
            };

            let sz1 = (m1, n1);
            let sz2 = (row_right.len(), col_right.len());
            let sz = (sz1.0 + sz2.0, sz1.1 + sz2.1);

            let node = HssNode::Branch {
                sz,
                is_root,
                sz1,
                sz2,
                child1: Box::new(child1),
                child2: Box::new(child2),
                b12,
                b21,
                r1,
                r2,
                w1,
                w2,
            };
            Ok((node, u_node, v_node))
        }
        _ => Err(Error::dimension_mismatch(
            "compress: row and column cluster trees must branch in lock-step",
        )),
    }
}

/// RRQR-derived generator for this node: `extra_cols`/`extra_rows` already
/// hold everything outside this node's column/row range, supplied by the
/// parent (or empty, at the root).
fn own_generators<T: Float>(
    extra_cols: &Array2<T>,
    extra_rows: &Array2<T>,
    tol: T,
    reltol: bool,
) -> Result<(Array2<T>, Array2<T>)> {
    let (u, _, _, _) = rrqr::rrqr(extra_cols, tol, reltol)?;
    let extra_rows_t = extra_rows.t().to_owned();
    let (v, _, _, _) = rrqr::rrqr(&extra_rows_t, tol, reltol)?;
    Ok((u, v))
}
