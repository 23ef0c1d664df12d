//! Deposit recovery from the public deposit log.

use std::collections::HashSet;

use primitives::{Amount, Commitment, DepositEvent, NullifierHash, Scope};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::derive::DepositSecrets;
use crate::{KeyError, MasterKeys, Result};

/// Child indices scanned by default.
pub const SEARCH_WINDOW: u32 = 50;
/// Upper bound accepted for an explicit window.
pub const MAX_SEARCH_WINDOW: u32 = 1024;

/// A deposit event matched to the secrets that produced it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RecoveredDeposit {
    pub event: DepositEvent,
    pub secrets: DepositSecrets,
}

impl RecoveredDeposit {
    pub fn value(&self) -> Amount { self.event.value }

    pub fn commitment(&self) -> Result<Commitment> { self.secrets.commitment(&self.event.value) }

    pub fn nullifier_hash(&self) -> NullifierHash { self.secrets.nullifier_hash() }
}

/// [`recover_deposits_within`] over the default [`SEARCH_WINDOW`].
pub fn recover_deposits(keys: &MasterKeys, scope: &Scope, events: &[DepositEvent]) -> Result<Vec<RecoveredDeposit>> {
    recover_deposits_within(keys, scope, events, SEARCH_WINDOW)
}

/// Match derived precommitments for child indices `0..window` against
/// `events`.
///
/// For each index the first event (in block order) whose precommitment
/// matches is taken, and an event is claimed by at most one index. Indices
/// are scanned in parallel; the result is ordered by child index and does not
/// depend on scheduling. Finding nothing is an empty result.
pub fn recover_deposits_within(
    keys: &MasterKeys,
    scope: &Scope,
    events: &[DepositEvent],
    window: u32,
) -> Result<Vec<RecoveredDeposit>> {
    if window == 0 || window > MAX_SEARCH_WINDOW {
        return Err(KeyError::InvalidWindow { window, max: MAX_SEARCH_WINDOW });
    }
    if scope.is_zero() {
        return Err(KeyError::ZeroScope);
    }
    if events.iter().any(|e| e.label.is_zero()) {
        return Err(KeyError::ZeroLabel);
    }

    let mut ordered: Vec<&DepositEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.block_number);

    let hits: Vec<(usize, DepositSecrets)> = (0..window)
        .into_par_iter()
        .map(|child_index| -> Result<Option<(usize, DepositSecrets)>> {
            for (position, event) in ordered.iter().enumerate() {
                let secrets = DepositSecrets::derive(keys, scope, &event.label, child_index)?;
                if secrets.precommitment() == event.precommitment_hash {
                    return Ok(Some((position, secrets)));
                }
            }
            Ok(None)
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    let mut claimed = HashSet::with_capacity(hits.len());
    let mut recovered = Vec::with_capacity(hits.len());
    for (position, secrets) in hits {
        if !claimed.insert(position) {
            continue;
        }
        let event = ordered[position].clone();
        debug!(child_index = secrets.child_index, block = event.block_number, "matched deposit");
        recovered.push(RecoveredDeposit { event, secrets });
    }
    info!(scanned = events.len(), window, recovered = recovered.len(), "deposit recovery finished");
    Ok(recovered)
}
