//! Binary cluster tree: recursive bisection of an ordered index range.
//!
//! A leaf and a branch are two constructors of the same tagged-variant
//! enum rather than an `Option` field bolted onto a single struct; each
//! node keeps the left/right choice path from the root as a bit history,
//! rendered as a name for diagnostics.

use bitvec::prelude::*;

use crate::error::Error;
use crate::Result;

/// One node of a [`ClusterTree`]: either a leaf range or a branch splitting
/// its range between two children.
#[derive(Debug, Clone)]
pub enum Cluster {
    Leaf {
        lo: usize,
        hi: usize,
        history: BitVec,
    },
    Branch {
        lo: usize,
        hi: usize,
        history: BitVec,
        left: Box<Cluster>,
        right: Box<Cluster>,
    },
}

pub type ClusterTree = Cluster;

impl Cluster {
    /// Inclusive range `[lo, hi]` this node covers.
    pub fn range(&self) -> (usize, usize) {
        match self {
            Cluster::Leaf { lo, hi, .. } => (*lo, *hi),
            Cluster::Branch { lo, hi, .. } => (*lo, *hi),
        }
    }

    /// Number of indices in `range()`.
    pub fn len(&self) -> usize {
        let (lo, hi) = self.range();
        hi - lo + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Cluster::Leaf { .. })
    }

    pub fn children(&self) -> Option<(&Cluster, &Cluster)> {
        match self {
            Cluster::Leaf { .. } => None,
            Cluster::Branch { left, right, .. } => Some((left, right)),
        }
    }

    fn history(&self) -> &BitVec {
        match self {
            Cluster::Leaf { history, .. } => history,
            Cluster::Branch { history, .. } => history,
        }
    }

    /// Deterministic name derived from the left/right path from the root,
    /// rendered as a hex string. Used only for `Debug`/diagnostics, never
    /// for control flow.
    pub fn name(&self) -> String {
        let history = self.history();
        let mut name = format!("{}", history.len());
        for chunk in history.chunks(4) {
            let mut nibble = 0u8;
            for (i, bit) in chunk.iter().enumerate() {
                if *bit {
                    nibble |= 1 << i;
                }
            }
            name.push_str(&format!("{nibble:x}"));
        }
        name
    }

    /// Collects the leaf ranges in left-to-right (in-order) order.
    pub fn leaf_ranges(&self) -> Vec<(usize, usize)> {
        let mut out = Vec::new();
        self.collect_leaf_ranges(&mut out);
        out
    }

    fn collect_leaf_ranges(&self, out: &mut Vec<(usize, usize)>) {
        match self {
            Cluster::Leaf { lo, hi, .. } => out.push((*lo, *hi)),
            Cluster::Branch { left, right, .. } => {
                left.collect_leaf_ranges(out);
                right.collect_leaf_ranges(out);
            }
        }
    }
}

/// Builds a binary cluster tree over `[lo, hi]`, splitting at the midpoint
/// until no range exceeds `leafsize`. Deterministic.
pub fn bisection_cluster(lo: usize, hi: usize, leafsize: usize) -> Result<ClusterTree> {
    if leafsize == 0 {
        return Err(Error::invalid_argument("leafsize must be positive"));
    }
    if hi < lo {
        return Err(Error::invalid_argument(format!(
            "empty range: lo={lo} > hi={hi}"
        )));
    }
    Ok(build(lo, hi, leafsize, BitVec::new()))
}

fn build(lo: usize, hi: usize, leafsize: usize, history: BitVec) -> Cluster {
    if hi - lo + 1 <= leafsize {
        return Cluster::Leaf { lo, hi, history };
    }
    let mid = lo + (hi - lo) / 2;

    let mut left_history = history.clone();
    left_history.push(false);
    let mut right_history = history.clone();
    right_history.push(true);

    let left = build(lo, mid, leafsize, left_history);
    let right = build(mid + 1, hi, leafsize, right_history);
    Cluster::Branch {
        lo,
        hi,
        history,
        left: Box::new(left),
        right: Box::new(right),
    }
}
