//! Per-deposit key derivation and deposit recovery.
//!
//! Everything a wallet needs to rediscover its deposits from public events
//! lives here: the master key pair, the scope- and label-bound secret
//! derivation, and the bounded scan that matches derived precommitments
//! against the indexer's deposit log.

pub mod derive;
pub mod recovery;

use std::fmt;

use primitives::Fr;
use thiserror::Error;

pub use derive::{commitment, nullifier_hash, precommitment, DepositSecrets};
pub use recovery::{recover_deposits, recover_deposits_within, RecoveredDeposit, MAX_SEARCH_WINDOW, SEARCH_WINDOW};

pub type Result<T> = std::result::Result<T, KeyError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("master keys must be non-zero")]
    ZeroMasterKey,
    #[error("scope must be non-zero")]
    ZeroScope,
    #[error("label must be non-zero")]
    ZeroLabel,
    #[error("child index {0} cannot be advanced")]
    ChildIndexExhausted(u32),
    #[error("search window {window} outside 1..={max}")]
    InvalidWindow { window: u32, max: u32 },
    #[error(transparent)]
    Value(#[from] primitives::Error),
}

/// Master key pair. Derived outside the engine and never persisted by it.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterKeys {
    master_nullifier: Fr,
    master_secret: Fr,
}

impl MasterKeys {
    pub fn new(master_nullifier: Fr, master_secret: Fr) -> Result<Self> {
        if primitives::field::is_zero(&master_nullifier) || primitives::field::is_zero(&master_secret) {
            return Err(KeyError::ZeroMasterKey);
        }
        Ok(Self { master_nullifier, master_secret })
    }

    pub fn master_nullifier(&self) -> &Fr { &self.master_nullifier }

    pub fn master_secret(&self) -> &Fr { &self.master_secret }
}

impl fmt::Debug for MasterKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("MasterKeys(..)") }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_keys_reject_zero_and_hide_secrets() {
        assert_eq!(MasterKeys::new(Fr::from(0u64), Fr::from(1u64)), Err(KeyError::ZeroMasterKey));
        let keys = MasterKeys::new(Fr::from(11u64), Fr::from(22u64)).unwrap();
        assert_eq!(format!("{keys:?}"), "MasterKeys(..)");
    }
}
