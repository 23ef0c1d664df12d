//! Append-only Poseidon Merkle accumulators for the pool.
//!
//! The same tree backs the state tree (leaves are commitments) and the
//! association-set tree (leaves are approved labels). This crate provides the
//! canonical tree, membership paths in the layout the withdrawal circuit
//! consumes, and the bounded root history used for recency checks.

pub mod poseidon;
pub mod tree;

use std::collections::VecDeque;

use primitives::{Fr, Root};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tree::LeanTree;

/// Tree parameters shared with the on-chain contracts.
pub mod params {
    /// Maximum depth, so at most 2^32 leaves.
    pub const MAX_DEPTH: usize = 32;
    /// Roots retained by the pool contract, current root included.
    pub const ROOT_HISTORY_SIZE: usize = 64;
}

pub type Result<T> = std::result::Result<T, TreeError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("zero is reserved for empty siblings and cannot be inserted")]
    ZeroLeaf,
    #[error("tree is full ({capacity} leaves)")]
    Full { capacity: u64 },
    #[error("leaf index {index} out of range for tree of size {size}")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("path of length {len} exceeds maximum depth {max}")]
    PathTooLong { len: usize, max: usize },
}

/// One level of a membership path.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct PathElem {
    /// Zero when the node has no right sibling at this level.
    #[serde(with = "primitives::field::serde_fr")]
    pub sibling: Fr,
    /// The path node is the right child.
    pub is_right: bool,
}

/// Membership path ordered from leaf to root.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
pub struct Path(pub Vec<PathElem>);

impl Path {
    pub fn depth(&self) -> usize { self.0.len() }

    /// Sibling values right-padded with zeros to `max_depth`, the layout the
    /// circuit expects.
    pub fn padded_siblings(&self, max_depth: usize) -> Result<Vec<Fr>> {
        if self.0.len() > max_depth {
            return Err(TreeError::PathTooLong { len: self.0.len(), max: max_depth });
        }
        let mut out: Vec<Fr> = self.0.iter().map(|e| e.sibling).collect();
        out.resize(max_depth, Fr::from(0u64));
        Ok(out)
    }

    /// Leaf index encoded by the direction bits.
    pub fn index(&self) -> u64 {
        self.0
            .iter()
            .enumerate()
            .fold(0u64, |acc, (level, e)| acc | ((e.is_right as u64) << level))
    }

    /// Fold `leaf` up the path. A zero sibling on a left node promotes the
    /// node unchanged.
    pub fn compute_root(&self, leaf: Fr) -> Root {
        let node = self.0.iter().fold(leaf, |node, e| {
            if e.is_right {
                poseidon::compress_nodes(&e.sibling, &node)
            } else if primitives::field::is_zero(&e.sibling) {
                node
            } else {
                poseidon::compress_nodes(&node, &e.sibling)
            }
        });
        Root(node)
    }
}

/// Membership proof binding a leaf to a root.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct MembershipProof {
    #[serde(with = "primitives::field::serde_fr")]
    pub leaf: Fr,
    pub index: usize,
    pub root: Root,
    pub path: Path,
}

impl MembershipProof {
    pub fn verify(&self) -> bool {
        self.path.index() == self.index as u64 && self.path.compute_root(self.leaf) == self.root
    }
}

/// Operations every pool tree supports.
pub trait IncrementalMerkleTree {
    /// Current depth; grows with the number of leaves up to [`params::MAX_DEPTH`].
    fn depth(&self) -> usize;

    fn size(&self) -> usize;

    fn root(&self) -> Root;

    /// Append a leaf at the next free position.
    fn insert(&mut self, leaf: Fr) -> Result<(usize, Root)>;

    /// Sibling path for the leaf at `index`, one entry per level.
    fn siblings(&self, index: usize) -> Result<Path>;

    /// Whether `root` is among the last [`params::ROOT_HISTORY_SIZE`] roots.
    fn is_recent_root(&self, root: &Root) -> bool;

    fn prove_membership(&self, index: usize) -> Result<MembershipProof>;
}

/// Ring of the most recent roots, newest last.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootHistory {
    recent_roots: VecDeque<Root>,
    capacity: usize,
}

impl Default for RootHistory {
    fn default() -> Self { Self::new(params::ROOT_HISTORY_SIZE) }
}

impl RootHistory {
    pub fn new(capacity: usize) -> Self {
        Self { recent_roots: VecDeque::with_capacity(capacity), capacity: capacity.max(1) }
    }

    /// Record a newly published root, evicting the oldest when full.
    pub fn push(&mut self, root: Root) {
        if self.recent_roots.len() == self.capacity {
            self.recent_roots.pop_front();
        }
        self.recent_roots.push_back(root);
    }

    /// The zero root is never considered known.
    pub fn contains(&self, root: &Root) -> bool {
        !root.is_zero() && self.recent_roots.iter().rev().any(|r| r == root)
    }

    pub fn latest(&self) -> Option<Root> { self.recent_roots.back().copied() }

    pub fn window_len(&self) -> usize { self.recent_roots.len() }

    pub fn capacity(&self) -> usize { self.capacity }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_evicts_oldest_after_window() {
        let mut history = RootHistory::default();
        for i in 1..=(params::ROOT_HISTORY_SIZE as u64 + 1) {
            history.push(Root::from(i));
        }
        assert_eq!(history.window_len(), params::ROOT_HISTORY_SIZE);
        assert!(!history.contains(&Root::from(1u64)));
        assert!(history.contains(&Root::from(2u64)));
        assert_eq!(history.latest(), Some(Root::from(params::ROOT_HISTORY_SIZE as u64 + 1)));
    }

    #[test]
    fn zero_root_is_never_recent() {
        let mut history = RootHistory::new(4);
        history.push(Root::default());
        assert!(!history.contains(&Root::default()));
    }

    #[test]
    fn padded_siblings_fill_with_zero() {
        let path = Path(vec![
            PathElem { sibling: Fr::from(5u64), is_right: true },
            PathElem { sibling: Fr::from(6u64), is_right: false },
        ]);
        let padded = path.padded_siblings(4).unwrap();
        assert_eq!(padded, vec![Fr::from(5u64), Fr::from(6u64), Fr::from(0u64), Fr::from(0u64)]);
        assert_eq!(path.index(), 1);
        assert_eq!(path.padded_siblings(1), Err(TreeError::PathTooLong { len: 2, max: 1 }));
    }
}
