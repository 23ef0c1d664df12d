//! Core protocol types.

use std::fmt;
use std::str::FromStr;

use ark_ff::{BigInt, BigInteger, PrimeField};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::field::{field_newtype, Fr};

pub const ADDRESS_LEN: usize = 20;
pub const TX_HASH_LEN: usize = 32;

// ————————————————————————————————————————————————————————————————————————————
// Field-valued protocol objects
// ————————————————————————————————————————————————————————————————————————————

field_newtype!(
    /// Domain separator unique to one pool instance.
    Scope
);
field_newtype!(
    /// Identifier of one deposit lineage within a scope.
    Label
);
field_newtype!(
    /// Spend-authorisation secret of a deposit. Never leaves the wallet.
    Nullifier
);
field_newtype!(Secret);
field_newtype!(
    /// `H(nullifier, secret)`, published at deposit time.
    Precommitment
);
field_newtype!(
    /// `H(value, label, precommitment)`, a leaf of the state tree.
    Commitment
);
field_newtype!(
    /// `H(nullifier)`, revealed on spend.
    NullifierHash
);
field_newtype!(
    /// Merkle root over the Poseidon tree.
    Root
);

// ————————————————————————————————————————————————————————————————————————————
// 256-bit unsigned integer
// ————————————————————————————————————————————————————————————————————————————

/// Fixed-width unsigned 256-bit integer used for wei-scale amounts and for
/// base-field proof coordinates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct U256(pub BigInt<4>);

/// Token amounts are plain 256-bit integers.
pub type Amount = U256;

impl U256 {
    pub const ZERO: U256 = U256(BigInt::new([0; 4]));

    pub fn from_u128(v: u128) -> Self { U256(BigInt::new([v as u64, (v >> 64) as u64, 0, 0])) }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for (i, chunk) in bytes.chunks_exact(8).enumerate() {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            limbs[3 - i] = u64::from_be_bytes(buf);
        }
        U256(BigInt::new(limbs))
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        for (i, limb) in self.0 .0.iter().enumerate() {
            out[(3 - i) * 8..(4 - i) * 8].copy_from_slice(&limb.to_be_bytes());
        }
        out
    }

    /// Parse a decimal string or a 0x-prefixed hex string.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex_digits) => BigUint::parse_bytes(hex_digits.as_bytes(), 16),
            None => BigUint::parse_bytes(s.as_bytes(), 10),
        };
        let value = parsed.ok_or_else(|| Error::InvalidInteger(s.to_string()))?;
        let bytes = value.to_bytes_be();
        if bytes.len() > 32 {
            return Err(Error::InvalidInteger(s.to_string()));
        }
        let mut be = [0u8; 32];
        be[32 - bytes.len()..].copy_from_slice(&bytes);
        Ok(Self::from_be_bytes(be))
    }

    pub fn is_zero(&self) -> bool { self.0.is_zero() }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        let mut out = self.0;
        if out.add_with_carry(&other.0) { None } else { Some(U256(out)) }
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        let mut out = self.0;
        if out.sub_with_borrow(&other.0) { None } else { Some(U256(out)) }
    }

    /// Lift into the scalar field. Values at or above the modulus are
    /// rejected rather than silently reduced.
    pub fn to_field(&self) -> Result<Fr> {
        Fr::from_bigint(self.0).ok_or_else(|| Error::AmountExceedsField(self.to_string()))
    }

    pub fn from_field(f: &Fr) -> Self { U256(f.into_bigint()) }

    pub fn to_decimal(&self) -> String { BigUint::from_bytes_be(&self.to_be_bytes()).to_str_radix(10) }

    /// Sum without wrapping; `None` on overflow.
    pub fn checked_sum<I: IntoIterator<Item = U256>>(values: I) -> Option<U256> {
        values.into_iter().try_fold(U256::ZERO, U256::checked_add)
    }
}

impl Default for U256 {
    fn default() -> Self { U256::ZERO }
}

impl From<u64> for U256 {
    fn from(v: u64) -> Self { U256(BigInt::new([v, 0, 0, 0])) }
}

impl From<u128> for U256 {
    fn from(v: u128) -> Self { U256::from_u128(v) }
}

impl FromStr for U256 {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> { U256::parse(s) }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_decimal()) }
}

impl fmt::Debug for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "U256({})", self.to_decimal()) }
}

impl Serialize for U256 {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_decimal())
    }
}

impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// Byte-valued identifiers
// ————————————————————————————————————————————————————————————————————————————

fn parse_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N]> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|_| Error::InvalidHex { input: s.to_string(), expected: N })?;
    bytes
        .try_into()
        .map_err(|_| Error::InvalidHex { input: s.to_string(), expected: N })
}

/// EVM account address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

/// Transaction hash as reported by the indexer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TxHash(pub [u8; TX_HASH_LEN]);

macro_rules! hex_bytes_newtype {
    ($name:ident, $len:expr) => {
        impl FromStr for $name {
            type Err = Error;
            fn from_str(s: &str) -> Result<Self> { parse_hex_fixed::<$len>(s).map(Self) }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "0x{}", hex::encode(self.0)) }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(d)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_bytes_newtype!(Address, ADDRESS_LEN);
hex_bytes_newtype!(TxHash, TX_HASH_LEN);

// ————————————————————————————————————————————————————————————————————————————
// Indexer-supplied events
// ————————————————————————————————————————————————————————————————————————————

/// A deposit as observed on-chain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DepositEvent {
    pub precommitment_hash: Precommitment,
    pub value: Amount,
    pub label: Label,
    pub block_number: u64,
    pub tx_hash: TxHash,
}

/// Where and when a spend happened.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    pub tx_hash: TxHash,
    pub block_number: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Spend status of one nullifier hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SpendInfo {
    Unspent,
    #[serde(rename_all = "camelCase")]
    SpentByWithdrawal {
        recipient: Address,
        gross_value: Amount,
        fee_amount: Amount,
        /// Zero when the whole value left the pool.
        new_commitment: Commitment,
        tx_info: TxInfo,
    },
    #[serde(rename_all = "camelCase")]
    SpentByMerge {
        deposited_value: Amount,
        new_commitment: Commitment,
        tx_info: TxInfo,
    },
}

impl SpendInfo {
    pub fn is_unspent(&self) -> bool { matches!(self, SpendInfo::Unspent) }
}
