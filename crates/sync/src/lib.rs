//! Wallet-side history reconstruction.
//!
//! Starting from recovered deposits, the tracer follows each deposit's
//! nullifier through partial withdrawals and merges until it reaches an
//! unspent tip. Nothing here needs a backend that knows which deposits belong
//! to the user: the only external input is a per-nullifier spend lookup.

pub mod tracer;

use std::sync::Arc;

use async_trait::async_trait;
use keys::{DepositSecrets, KeyError};
use primitives::{Address, Amount, Commitment, Label, NullifierHash, SpendInfo, TxHash, TxInfo};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tracer::{TraceCollector, Tracer};

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("spend lookup failed for {nullifier_hash}: {source}")]
    Lookup { nullifier_hash: NullifierHash, source: LookupError },
    #[error("withdrawal fee {fee} exceeds gross value {gross}")]
    FeeExceedsGross { gross: Amount, fee: Amount },
    #[error("lineage {label} withdrew {spent} from a deposit worth {available}")]
    Overspent { label: Label, spent: Amount, available: Amount },
    #[error("lineage {label} value overflows 256 bits")]
    ValueOverflow { label: Label },
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Failure reported by a [`SpendLookup`] implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Spend-status oracle, usually backed by the indexer.
#[async_trait]
pub trait SpendLookup: Send + Sync {
    async fn spend_info(&self, nullifier_hash: NullifierHash, chain_id: u64) -> std::result::Result<SpendInfo, LookupError>;
}

#[async_trait]
impl<T: SpendLookup + ?Sized> SpendLookup for Arc<T> {
    async fn spend_info(&self, nullifier_hash: NullifierHash, chain_id: u64) -> std::result::Result<SpendInfo, LookupError> {
        (**self).spend_info(nullifier_hash, chain_id).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Lineage steps followed before history is marked truncated.
    pub max_depth: usize,
    /// Concurrent lookups per frontier round.
    pub max_in_flight: usize,
    /// Check that each change or merge commitment is the one our keys derive.
    pub verify_change_commitments: bool,
}

impl Default for TracerConfig {
    fn default() -> Self { Self { max_depth: 50, max_in_flight: 8, verify_change_commitments: true } }
}

/// One funds-leaving event in the user's history.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRecord {
    pub tx_hash: TxHash,
    pub recipient: Address,
    pub net_amount: Amount,
    pub fee_amount: Amount,
    /// A change commitment stayed in the pool.
    pub is_partial: bool,
    pub block_info: TxInfo,
    pub label: Label,
    pub child_index: u32,
}

/// A lineage tip that is still spendable.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UnspentDeposit {
    pub secrets: DepositSecrets,
    pub value: Amount,
    pub commitment: Commitment,
    pub nullifier_hash: NullifierHash,
}

/// Result of tracing a set of deposits.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct TraceOutcome {
    /// Ordered by block number, then discovery order.
    pub records: Vec<WithdrawalRecord>,
    pub unspent: Vec<UnspentDeposit>,
    /// Lineages whose history was cut at the depth cap.
    pub truncated: Vec<Label>,
    /// Lineages whose next commitment was not derived from our keys.
    pub foreign: Vec<Label>,
}

impl TraceOutcome {
    /// Sum of unspent tips; `None` on overflow.
    pub fn balance(&self) -> Option<Amount> { Amount::checked_sum(self.unspent.iter().map(|u| u.value)) }

    pub fn total_withdrawn(&self) -> Option<Amount> { Amount::checked_sum(self.records.iter().map(|r| r.net_amount)) }

    pub fn is_truncated(&self) -> bool { !self.truncated.is_empty() }
}
