//! Deterministic secret derivation.
//!
//! ```text
//! nullifier     = H(masterNullifier, scope, label, childIndex)
//! secret        = H(masterSecret,    scope, label, childIndex)
//! precommitment = H(nullifier, secret)
//! commitment    = H(value, label, precommitment)
//! nullifierHash = H(nullifier)
//! ```

use std::fmt;

use accum::poseidon::{hash1, hash2, hash3, hash4};
use primitives::{Amount, Commitment, Fr, Label, Nullifier, NullifierHash, Precommitment, Scope, Secret};

use crate::{KeyError, MasterKeys, Result};

pub fn precommitment(nullifier: &Nullifier, secret: &Secret) -> Precommitment {
    Precommitment(hash2(nullifier.0, secret.0))
}

pub fn commitment(value: &Amount, label: &Label, precommitment: &Precommitment) -> Result<Commitment> {
    Ok(Commitment(hash3(value.to_field()?, label.0, precommitment.0)))
}

pub fn nullifier_hash(nullifier: &Nullifier) -> NullifierHash { NullifierHash(hash1(nullifier.0)) }

/// Secrets of one deposit at one step of its lineage.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct DepositSecrets {
    pub nullifier: Nullifier,
    pub secret: Secret,
    pub label: Label,
    /// 0 for the original deposit, +1 per partial withdrawal or merge.
    pub child_index: u32,
}

impl DepositSecrets {
    pub fn derive(keys: &MasterKeys, scope: &Scope, label: &Label, child_index: u32) -> Result<Self> {
        if scope.is_zero() {
            return Err(KeyError::ZeroScope);
        }
        if label.is_zero() {
            return Err(KeyError::ZeroLabel);
        }
        let index = Fr::from(u64::from(child_index));
        let nullifier = Nullifier(hash4(*keys.master_nullifier(), scope.0, label.0, index));
        let secret = Secret(hash4(*keys.master_secret(), scope.0, label.0, index));
        Ok(Self { nullifier, secret, label: *label, child_index })
    }

    /// Secrets of the change or merged deposit that replaces this one.
    pub fn next(&self, keys: &MasterKeys, scope: &Scope) -> Result<Self> {
        let child_index = self.child_index.checked_add(1).ok_or(KeyError::ChildIndexExhausted(self.child_index))?;
        Self::derive(keys, scope, &self.label, child_index)
    }

    pub fn precommitment(&self) -> Precommitment { precommitment(&self.nullifier, &self.secret) }

    pub fn commitment(&self, value: &Amount) -> Result<Commitment> {
        commitment(value, &self.label, &self.precommitment())
    }

    pub fn nullifier_hash(&self) -> NullifierHash { nullifier_hash(&self.nullifier) }
}

impl fmt::Debug for DepositSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DepositSecrets")
            .field("label", &self.label)
            .field("child_index", &self.child_index)
            .finish_non_exhaustive()
    }
}
