//! Checks run before any proving work.
//!
//! A proof built against a root the contract no longer accepts is wasted
//! minutes of CPU, so the local trees are compared with the on-chain roots up
//! front and a mismatch is surfaced as a retryable error.

use accum::{IncrementalMerkleTree, LeanTree, MembershipProof, RootHistory};
use primitives::{Commitment, Fr, Label, Root};
use tracing::{debug, warn};

use crate::{ProofError, Result, TreeKind};

/// A local tree paired with the root the contract currently reports for it.
#[derive(Clone, Copy, Debug)]
pub struct TreeView<'a> {
    pub tree: &'a LeanTree,
    pub on_chain_root: Root,
    /// Mirror of the contract's root history. Only the state tree accepts a
    /// recent root; the association set must match the latest one.
    pub recent_roots: Option<&'a RootHistory>,
}

impl<'a> TreeView<'a> {
    pub fn new(tree: &'a LeanTree, on_chain_root: Root) -> Self { Self { tree, on_chain_root, recent_roots: None } }

    pub fn with_recent_roots(self, recent_roots: &'a RootHistory) -> Self { Self { recent_roots: Some(recent_roots), ..self } }
}

/// Rebuild the state tree from indexed leaves and require that it lands on
/// the on-chain root.
pub fn rebuild_state_tree(leaves: &[Commitment], on_chain_root: Root) -> Result<LeanTree> {
    let raw: Vec<Fr> = leaves.iter().map(|c| c.0).collect();
    let tree = LeanTree::from_leaves(&raw)?;
    check_root(TreeKind::State, &tree, on_chain_root, None)?;
    Ok(tree)
}

/// The local root must be the on-chain root or, when `recent_roots` is
/// given, one of the roots the contract still accepts.
pub fn check_root(kind: TreeKind, tree: &LeanTree, on_chain_root: Root, recent_roots: Option<&RootHistory>) -> Result<()> {
    let local = tree.root();
    let known = local == on_chain_root || recent_roots.is_some_and(|h| h.contains(&local));
    if !known {
        warn!(tree = %kind, %local, on_chain = %on_chain_root, size = tree.size(), "tree out of sync");
        return Err(ProofError::StateDesynchronized { tree: kind, local, on_chain: on_chain_root });
    }
    Ok(())
}

/// Membership of the spent commitment in the synchronized state tree.
pub fn state_membership(view: TreeView<'_>, commitment: &Commitment) -> Result<MembershipProof> {
    check_root(TreeKind::State, view.tree, view.on_chain_root, view.recent_roots)?;
    let index = view.tree.index_of(&commitment.0).ok_or(ProofError::CommitmentNotFound(*commitment))?;
    let proof = view.tree.prove_membership(index)?;
    debug!(index, depth = proof.path.depth(), "state membership");
    Ok(proof)
}

/// Membership of the deposit label in the synchronized association set.
pub fn association_membership(view: TreeView<'_>, label: &Label) -> Result<MembershipProof> {
    check_root(TreeKind::Association, view.tree, view.on_chain_root, None)?;
    let index = view.tree.index_of(&label.0).ok_or(ProofError::LabelNotApproved(*label))?;
    let proof = view.tree.prove_membership(index)?;
    debug!(index, depth = proof.path.depth(), "association membership");
    Ok(proof)
}
