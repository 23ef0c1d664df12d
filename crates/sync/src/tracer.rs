//! Nullifier-chain tracer.
//!
//! Each lineage is linear: a spend yields at most one successor, derived at
//! `child_index + 1`. The tracer walks all lineages level by level, resolving
//! the current frontier's spend status with a bounded number of lookups in
//! flight, so a child is only examined after its parent has been resolved.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use keys::{DepositSecrets, MasterKeys, RecoveredDeposit};
use primitives::{Amount, Commitment, NullifierHash, Scope, SpendInfo};
use tracing::{debug, info, warn};

use crate::{
    Result, SpendLookup, TraceError, TraceOutcome, TracerConfig, UnspentDeposit, WithdrawalRecord,
};

#[derive(Clone, Copy, Debug)]
struct Tip {
    secrets: DepositSecrets,
    value: Amount,
    depth: usize,
}

impl Tip {
    fn origin(deposit: &RecoveredDeposit) -> Self { Self { secrets: deposit.secrets, value: deposit.value(), depth: 0 } }
}

/// Shared output of one or more traces plus the visited set that stops
/// reprocessing and cycles.
#[derive(Debug, Default)]
pub struct TraceCollector {
    outcome: TraceOutcome,
    visited: HashSet<NullifierHash>,
}

impl TraceCollector {
    pub fn new() -> Self { Self::default() }

    pub fn has_visited(&self, nullifier_hash: &NullifierHash) -> bool { self.visited.contains(nullifier_hash) }

    pub fn finish(mut self) -> TraceOutcome {
        self.outcome.records.sort_by_key(|r| r.block_info.block_number);
        self.outcome
    }
}

pub struct Tracer<L> {
    lookup: L,
    chain_id: u64,
    config: TracerConfig,
}

impl<L: SpendLookup> Tracer<L> {
    pub fn new(lookup: L, chain_id: u64) -> Self { Self::with_config(lookup, chain_id, TracerConfig::default()) }

    pub fn with_config(lookup: L, chain_id: u64, config: TracerConfig) -> Self { Self { lookup, chain_id, config } }

    pub fn config(&self) -> &TracerConfig { &self.config }

    pub fn lookup(&self) -> &L { &self.lookup }

    /// Trace one deposit's lineage to its end, appending to `collector`.
    pub async fn trace_deposit(
        &self,
        deposit: &RecoveredDeposit,
        keys: &MasterKeys,
        scope: &Scope,
        collector: &mut TraceCollector,
    ) -> Result<()> {
        let mut next = Some(Tip::origin(deposit));
        while let Some(tip) = next.take() {
            let Some(nullifier_hash) = self.claim(&tip, collector) else { break };
            let info = self.resolve(nullifier_hash).await?;
            next = self.advance(&tip, info, keys, scope, collector)?;
        }
        Ok(())
    }

    /// Trace all deposits, batching each frontier's lookups.
    pub async fn trace_all(&self, deposits: &[RecoveredDeposit], keys: &MasterKeys, scope: &Scope) -> Result<TraceOutcome> {
        let mut collector = TraceCollector::new();
        let mut frontier: Vec<Tip> = deposits.iter().map(Tip::origin).collect();
        let mut rounds = 0usize;

        while !frontier.is_empty() {
            let claimed: Vec<(Tip, NullifierHash)> = frontier
                .drain(..)
                .filter_map(|tip| self.claim(&tip, &mut collector).map(|hash| (tip, hash)))
                .collect();

            let infos: Vec<Result<SpendInfo>> = stream::iter(claimed.iter().map(|(_, hash)| self.resolve(*hash)))
                .buffered(self.config.max_in_flight.max(1))
                .collect()
                .await;

            for ((tip, _), info) in claimed.into_iter().zip(infos) {
                if let Some(child) = self.advance(&tip, info?, keys, scope, &mut collector)? {
                    frontier.push(child);
                }
            }
            rounds += 1;
        }

        let outcome = collector.finish();
        info!(
            deposits = deposits.len(),
            rounds,
            withdrawals = outcome.records.len(),
            unspent = outcome.unspent.len(),
            truncated = outcome.truncated.len(),
            "traced deposit lineages"
        );
        Ok(outcome)
    }

    /// Mark `tip` visited and return its nullifier hash, or `None` when the
    /// lineage stops here.
    fn claim(&self, tip: &Tip, collector: &mut TraceCollector) -> Option<NullifierHash> {
        if tip.depth >= self.config.max_depth {
            warn!(label = %tip.secrets.label, depth = tip.depth, "lineage truncated at depth cap");
            collector.outcome.truncated.push(tip.secrets.label);
            return None;
        }
        let nullifier_hash = tip.secrets.nullifier_hash();
        if !collector.visited.insert(nullifier_hash) {
            debug!(%nullifier_hash, "already traced");
            return None;
        }
        Some(nullifier_hash)
    }

    async fn resolve(&self, nullifier_hash: NullifierHash) -> Result<SpendInfo> {
        self.lookup
            .spend_info(nullifier_hash, self.chain_id)
            .await
            .map_err(|source| TraceError::Lookup { nullifier_hash, source })
    }

    fn advance(
        &self,
        tip: &Tip,
        info: SpendInfo,
        keys: &MasterKeys,
        scope: &Scope,
        collector: &mut TraceCollector,
    ) -> Result<Option<Tip>> {
        let label = tip.secrets.label;
        match info {
            SpendInfo::Unspent => {
                debug!(%label, child_index = tip.secrets.child_index, value = %tip.value, "unspent tip");
                collector.outcome.unspent.push(UnspentDeposit {
                    secrets: tip.secrets,
                    value: tip.value,
                    commitment: tip.secrets.commitment(&tip.value)?,
                    nullifier_hash: tip.secrets.nullifier_hash(),
                });
                Ok(None)
            }
            SpendInfo::SpentByWithdrawal { recipient, gross_value, fee_amount, new_commitment, tx_info } => {
                let net_amount = gross_value
                    .checked_sub(fee_amount)
                    .ok_or(TraceError::FeeExceedsGross { gross: gross_value, fee: fee_amount })?;
                let is_partial = !new_commitment.is_zero();
                collector.outcome.records.push(WithdrawalRecord {
                    tx_hash: tx_info.tx_hash,
                    recipient,
                    net_amount,
                    fee_amount,
                    is_partial,
                    block_info: tx_info,
                    label,
                    child_index: tip.secrets.child_index,
                });
                if !is_partial {
                    return Ok(None);
                }
                let change = tip.value.checked_sub(gross_value).ok_or(TraceError::Overspent {
                    label,
                    spent: gross_value,
                    available: tip.value,
                })?;
                self.successor(tip, change, new_commitment, keys, scope, collector)
            }
            SpendInfo::SpentByMerge { deposited_value, new_commitment, .. } => {
                let merged = tip.value.checked_add(deposited_value).ok_or(TraceError::ValueOverflow { label })?;
                self.successor(tip, merged, new_commitment, keys, scope, collector)
            }
        }
    }

    fn successor(
        &self,
        tip: &Tip,
        value: Amount,
        new_commitment: Commitment,
        keys: &MasterKeys,
        scope: &Scope,
        collector: &mut TraceCollector,
    ) -> Result<Option<Tip>> {
        let secrets = tip.secrets.next(keys, scope)?;
        if self.config.verify_change_commitments && secrets.commitment(&value)? != new_commitment {
            warn!(label = %secrets.label, child_index = secrets.child_index, "successor commitment not derived from these keys");
            collector.outcome.foreign.push(secrets.label);
            return Ok(None);
        }
        debug!(label = %secrets.label, child_index = secrets.child_index, %value, "following lineage");
        Ok(Some(Tip { secrets, value, depth: tip.depth + 1 }))
    }
}
