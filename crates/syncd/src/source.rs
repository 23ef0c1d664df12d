//! Collaborators on the chain side: where approved deposits come from and
//! where roots go.

use std::path::Path;

use async_trait::async_trait;
use primitives::{Label, Root, Scope};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::snapshot::{ContentPointer, Cursor};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SourceError(pub String);

/// A deposit the association-set provider has approved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovedDeposit {
    pub label: Label,
    #[serde(flatten)]
    pub cursor: Cursor,
}

#[async_trait]
pub trait ApprovedDepositSource: Send + Sync {
    /// Up to `limit` deposits strictly after `after`, in cursor order.
    async fn fetch_since(&self, scope: &Scope, after: Option<Cursor>, limit: usize) -> Result<Vec<ApprovedDeposit>, SourceError>;
}

/// The privileged on-chain publishing path.
#[async_trait]
pub trait RootPublisher: Send + Sync {
    async fn on_chain_root(&self, scope: &Scope) -> Result<Option<Root>, SourceError>;

    async fn publish_root(&self, scope: &Scope, root: Root, content: ContentPointer) -> Result<(), SourceError>;
}

/// Approved deposits read from a JSON array, for imports and replay.
#[derive(Clone, Debug, Default)]
pub struct FileSource {
    deposits: Vec<ApprovedDeposit>,
}

impl FileSource {
    pub fn new(mut deposits: Vec<ApprovedDeposit>) -> Self {
        deposits.sort_by_key(|d| d.cursor);
        Self { deposits }
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let deposits: Vec<ApprovedDeposit> =
            serde_json::from_slice(&bytes).with_context(|| format!("parse approved deposits in {}", path.display()))?;
        Ok(Self::new(deposits))
    }

    pub fn len(&self) -> usize { self.deposits.len() }

    pub fn is_empty(&self) -> bool { self.deposits.is_empty() }
}

#[async_trait]
impl ApprovedDepositSource for FileSource {
    async fn fetch_since(&self, _scope: &Scope, after: Option<Cursor>, limit: usize) -> Result<Vec<ApprovedDeposit>, SourceError> {
        let start = match after {
            Some(cursor) => self.deposits.partition_point(|d| d.cursor <= cursor),
            None => 0,
        };
        Ok(self.deposits[start..].iter().take(limit).copied().collect())
    }
}
