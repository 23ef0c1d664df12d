//! Lean incremental Merkle tree.
//!
//! Depth is `ceil(log2(size))` rather than fixed: a node without a right
//! sibling is promoted to its parent unchanged instead of being hashed with a
//! zero subtree. The contracts and the circuit use the same rule, which is
//! why paths shorter than [`MAX_DEPTH`] are right-padded with zeros.

use primitives::{field, Fr, Root};
use rayon::prelude::*;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::params::{MAX_DEPTH, ROOT_HISTORY_SIZE};
use crate::poseidon::compress_nodes;
use crate::{IncrementalMerkleTree, MembershipProof, Path, PathElem, Result, RootHistory, TreeError};

/// Level width above which rebuilds hash in parallel.
const PAR_LEVEL_MIN: usize = 1 << 10;

const CAPACITY: u64 = 1 << MAX_DEPTH;

#[derive(Clone, Debug)]
pub struct LeanTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<Fr>>,
    history: RootHistory,
}

impl Default for LeanTree {
    fn default() -> Self { Self::new() }
}

fn depth_for(size: usize) -> usize {
    if size <= 1 { 0 } else { (usize::BITS - (size - 1).leading_zeros()) as usize }
}

fn parent_level(level: &[Fr]) -> Vec<Fr> {
    let hash_pair = |pair: &[Fr]| match pair {
        [left, right] => compress_nodes(left, right),
        [only] => *only,
        _ => unreachable!("chunks of two"),
    };
    if level.len() >= PAR_LEVEL_MIN {
        level.par_chunks(2).map(hash_pair).collect()
    } else {
        level.chunks(2).map(hash_pair).collect()
    }
}

impl LeanTree {
    pub fn new() -> Self { Self { levels: vec![Vec::new()], history: RootHistory::new(ROOT_HISTORY_SIZE) } }

    /// Build from a full leaf list in one pass, hashing level by level.
    /// The root history starts at the rebuilt root.
    pub fn from_leaves(leaves: &[Fr]) -> Result<Self> {
        if leaves.len() as u64 > CAPACITY {
            return Err(TreeError::Full { capacity: CAPACITY });
        }
        if leaves.iter().any(field::is_zero) {
            return Err(TreeError::ZeroLeaf);
        }
        let mut levels = vec![leaves.to_vec()];
        while levels[levels.len() - 1].len() > 1 {
            let next = parent_level(&levels[levels.len() - 1]);
            levels.push(next);
        }
        let mut tree = Self { levels, history: RootHistory::new(ROOT_HISTORY_SIZE) };
        if !leaves.is_empty() {
            tree.history.push(tree.root());
        }
        debug!(size = leaves.len(), depth = tree.depth(), "rebuilt tree from leaves");
        Ok(tree)
    }

    pub fn leaves(&self) -> &[Fr] { &self.levels[0] }

    pub fn leaf(&self, index: usize) -> Option<Fr> { self.levels[0].get(index).copied() }

    /// Position of the first leaf equal to `leaf`.
    pub fn index_of(&self, leaf: &Fr) -> Option<usize> { self.levels[0].iter().position(|l| l == leaf) }

    pub fn history(&self) -> &RootHistory { &self.history }

    pub fn is_empty(&self) -> bool { self.levels[0].is_empty() }

    fn set_node(&mut self, level: usize, index: usize, value: Fr) {
        let nodes = &mut self.levels[level];
        if index == nodes.len() {
            nodes.push(value);
        } else {
            nodes[index] = value;
        }
    }
}

/// Serialized as the leaf list (decimal strings); deserializing rebuilds the
/// tree, so the root history restarts at the current root.
impl Serialize for LeanTree {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.collect_seq(self.leaves().iter().map(field::fr_to_decimal))
    }
}

impl<'de> Deserialize<'de> for LeanTree {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let leaves = Vec::<String>::deserialize(d)?
            .iter()
            .map(|s| field::parse_fr(s))
            .collect::<primitives::Result<Vec<Fr>>>()
            .map_err(serde::de::Error::custom)?;
        LeanTree::from_leaves(&leaves).map_err(serde::de::Error::custom)
    }
}

impl IncrementalMerkleTree for LeanTree {
    fn depth(&self) -> usize { depth_for(self.size()) }

    fn size(&self) -> usize { self.levels[0].len() }

    fn root(&self) -> Root {
        let depth = self.depth();
        self.levels.get(depth).and_then(|level| level.first()).copied().map(Root).unwrap_or_default()
    }

    fn insert(&mut self, leaf: Fr) -> Result<(usize, Root)> {
        if field::is_zero(&leaf) {
            return Err(TreeError::ZeroLeaf);
        }
        let index = self.size();
        if index as u64 >= CAPACITY {
            return Err(TreeError::Full { capacity: CAPACITY });
        }
        let depth = depth_for(index + 1);
        while self.levels.len() <= depth {
            self.levels.push(Vec::new());
        }

        let mut node = leaf;
        let mut position = index;
        for level in 0..depth {
            self.set_node(level, position, node);
            if position & 1 == 1 {
                node = compress_nodes(&self.levels[level][position - 1], &node);
            }
            position >>= 1;
        }
        self.set_node(depth, position, node);

        let root = Root(node);
        self.history.push(root);
        debug!(index, depth, %root, "appended leaf");
        Ok((index, root))
    }

    fn siblings(&self, index: usize) -> Result<Path> {
        let size = self.size();
        if index >= size {
            return Err(TreeError::IndexOutOfRange { index, size });
        }
        let zero = Fr::from(0u64);
        let mut path = Vec::with_capacity(self.depth());
        let mut position = index;
        for level in 0..self.depth() {
            let nodes = &self.levels[level];
            let elem = if position & 1 == 1 {
                PathElem { sibling: nodes[position - 1], is_right: true }
            } else {
                PathElem { sibling: nodes.get(position + 1).copied().unwrap_or(zero), is_right: false }
            };
            path.push(elem);
            position >>= 1;
        }
        Ok(Path(path))
    }

    fn is_recent_root(&self, root: &Root) -> bool { self.history.contains(root) }

    fn prove_membership(&self, index: usize) -> Result<MembershipProof> {
        let path = self.siblings(index)?;
        Ok(MembershipProof { leaf: self.levels[0][index], index, root: self.root(), path })
    }
}
