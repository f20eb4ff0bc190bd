//! The HSS tree data model and its three public operations.

mod compress;
mod matvec;
mod solve;

use ndarray::Array2;

use crate::float::Float;

pub use compress::compress;
pub use matvec::matvec;
pub use solve::solve;

/// One node of an HSS tree: a dense leaf block or a branch combining two
/// children through coupling blocks and translation operators.
///
/// Leaf and branch are constructors of one tagged-variant type, each
/// carrying the shared `sz`/`is_root` metadata, rather than an `Option`
/// field bolted onto a single struct.
#[derive(Debug, Clone)]
pub enum HssNode<T> {
    Leaf {
        sz: (usize, usize),
        is_root: bool,
        d: Array2<T>,
        u: Array2<T>,
        v: Array2<T>,
    },
    Branch {
        sz: (usize, usize),
        is_root: bool,
        sz1: (usize, usize),
        sz2: (usize, usize),
        child1: Box<HssNode<T>>,
        child2: Box<HssNode<T>>,
        b12: Array2<T>,
        b21: Array2<T>,
        /// `None` only at the root: non-root nodes always carry their
        /// translation operators.
        r1: Option<Array2<T>>,
        r2: Option<Array2<T>>,
        w1: Option<Array2<T>>,
        w2: Option<Array2<T>>,
    },
}

impl<T: Float> HssNode<T> {
    pub fn sz(&self) -> (usize, usize) {
        match self {
            HssNode::Leaf { sz, .. } => *sz,
            HssNode::Branch { sz, .. } => *sz,
        }
    }

    pub fn is_root(&self) -> bool {
        match self {
            HssNode::Leaf { is_root, .. } => *is_root,
            HssNode::Branch { is_root, .. } => *is_root,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, HssNode::Leaf { .. })
    }

    /// Reconstructs the full dense matrix this node represents. Used only
    /// for testing compression/mat-vec fidelity against a dense reference;
    /// never on any code path a real compression/solve call takes.
    pub fn to_dense(&self) -> Array2<T> {
        match self {
            HssNode::Leaf { d, .. } => d.clone(),
            HssNode::Branch {
                child1,
                child2,
                b12,
                b21,
                ..
            } => {
                let (u1, v1) = child1.own_generators();
                let (u2, v2) = child2.own_generators();
                let d1 = child1.to_dense();
                let d2 = child2.to_dense();
                let off12 = u1.dot(b12).dot(&v2.t());
                let off21 = u2.dot(b21).dot(&v1.t());
                crate::utils::block2x2(&d1, &off12, &off21, &d2)
            }
        }
    }

    /// This node's own left/right generator: explicit at a leaf, or
    /// assembled from the children's generators via this node's own
    /// translation operators at a (non-root) branch.
    fn own_generators(&self) -> (Array2<T>, Array2<T>) {
        match self {
            HssNode::Leaf { u, v, .. } => (u.clone(), v.clone()),
            HssNode::Branch {
                child1,
                child2,
                r1,
                r2,
                w1,
                w2,
                ..
            } => {
                let (u1, v1) = child1.own_generators();
                let (u2, v2) = child2.own_generators();
                let r1 = r1.as_ref().expect("own_generators called on a root branch");
                let r2 = r2.as_ref().expect("own_generators called on a root branch");
                let w1 = w1.as_ref().expect("own_generators called on a root branch");
                let w2 = w2.as_ref().expect("own_generators called on a root branch");
                let u = crate::utils::vstack(&u1.dot(r1), &u2.dot(r2));
                let v = crate::utils::vstack(&v1.dot(w1), &v2.dot(w2));
                (u, v)
            }
        }
    }
}
