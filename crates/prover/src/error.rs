use std::fmt;

use accum::TreeError;
use keys::KeyError;
use primitives::{Commitment, Label, NullifierHash, Root};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProofError>;

/// Which pool tree a root check was made against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeKind {
    State,
    Association,
}

impl fmt::Display for TreeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TreeKind::State => "state",
            TreeKind::Association => "association set",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    #[error("invalid withdrawal request: {0}")]
    InvalidRequest(String),
    #[error("deposit with nullifier hash {0} has already been spent")]
    AlreadySpent(NullifierHash),
    #[error("{tree} tree is out of sync: local root {local}, on-chain root {on_chain}")]
    StateDesynchronized { tree: TreeKind, local: Root, on_chain: Root },
    #[error("commitment {0} is not in the state tree")]
    CommitmentNotFound(Commitment),
    #[error("label {0} is not in the association set")]
    LabelNotApproved(Label),
    #[error("spend lookup failed: {0}")]
    Lookup(String),
    #[error("proving artifacts rejected: {0}")]
    Artifacts(String),
    #[error("proving backend failed: {0}")]
    Backend(String),
    #[error("public signal {signal} does not match: expected {expected}, backend returned {actual}")]
    SignalMismatch { signal: &'static str, expected: String, actual: String },
    #[error("malformed proof: {0}")]
    MalformedProof(String),
    #[error("proof generation cancelled")]
    Cancelled,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Value(#[from] primitives::Error),
}

impl ProofError {
    /// What a caller can do about a retryable failure.
    pub fn retry_hint(&self) -> Option<&'static str> {
        match self {
            ProofError::StateDesynchronized { tree: TreeKind::State, .. } => {
                Some("resynchronize the state tree from the indexer and rebuild the proof")
            }
            ProofError::StateDesynchronized { tree: TreeKind::Association, .. } => {
                Some("refresh the association set and rebuild the proof")
            }
            ProofError::Lookup(_) => Some("the spend lookup is unavailable; retry later"),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool { self.retry_hint().is_some() }
}
