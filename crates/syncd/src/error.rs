use accum::TreeError;
use primitives::{Label, Scope};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors are `Clone` so a single in-flight operation can hand the same
/// result to every caller waiting on it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("storage: {0}")]
    Store(String),
    #[error("approved-deposit source: {0}")]
    Source(String),
    #[error("root publisher: {0}")]
    Publish(String),
    #[error("synchronizer task failed: {0}")]
    Task(String),
    #[error("no root publisher configured for scope {0}")]
    NoPublisher(Scope),
    #[error("snapshot for scope {scope} is corrupt: {reason}")]
    CorruptSnapshot { scope: Scope, reason: String },
    #[error("approved deposit with zero label at block {block_number}")]
    ZeroLabel { block_number: u64 },
    #[error("label {0} appears twice in the stored association set")]
    DuplicateLabel(Label),
    #[error(transparent)]
    Encoding(#[from] primitives::Error),
    #[error(transparent)]
    Tree(#[from] TreeError),
}
