//! BN254 scalar-field helpers and the role-typed field newtypes.
//!
//! Every newtype serialises as the decimal string circom and snarkjs expect
//! and displays as 0x-prefixed, 32-byte big-endian hex. Parsing accepts either
//! form but never reduces: a value at or above the modulus is rejected.

use ark_ff::{BigInteger, PrimeField, Zero};
use num_bigint::BigUint;

use crate::error::{Error, Result};

pub type Fr = ark_bn254::Fr;

pub const FIELD_BYTES: usize = 32;

/// Canonical big-endian encoding of a field element.
pub fn fr_to_be32(f: &Fr) -> [u8; FIELD_BYTES] {
    let bytes = f.into_bigint().to_bytes_be();
    let mut out = [0u8; FIELD_BYTES];
    out[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    out
}

/// Decode 32 big-endian bytes, rejecting non-canonical values.
pub fn fr_from_be32(bytes: &[u8; FIELD_BYTES]) -> Result<Fr> {
    let repr = crate::types::U256::from_be_bytes(*bytes);
    Fr::from_bigint(repr.0).ok_or_else(|| Error::InvalidField(format!("0x{}", hex::encode(bytes))))
}

/// Reduce arbitrary big-endian bytes modulo the scalar field (hash-to-field).
pub fn fr_reduce_be(bytes: &[u8]) -> Fr { Fr::from_be_bytes_mod_order(bytes) }

pub fn fr_to_decimal(f: &Fr) -> String { BigUint::from_bytes_be(&fr_to_be32(f)).to_str_radix(10) }

pub fn fr_to_hex(f: &Fr) -> String { format!("0x{}", hex::encode(fr_to_be32(f))) }

/// Parse a decimal or 0x-hex string into a canonical field element.
pub fn parse_fr(s: &str) -> Result<Fr> {
    let value = crate::types::U256::parse(s).map_err(|_| Error::InvalidField(s.to_string()))?;
    Fr::from_bigint(value.0).ok_or_else(|| Error::InvalidField(s.to_string()))
}

pub fn is_zero(f: &Fr) -> bool { f.is_zero() }

/// `#[serde(with = "...")]` adapter for bare [`Fr`] fields, using decimal
/// strings.
pub mod serde_fr {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Fr;

    pub fn serialize<S: Serializer>(f: &Fr, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::fr_to_decimal(f))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Fr, D::Error> {
        let s = String::deserialize(d)?;
        super::parse_fr(&s).map_err(serde::de::Error::custom)
    }
}

/// Declares a `Copy` newtype over [`Fr`] with decimal serde, hex display and
/// `FromStr`.
macro_rules! field_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub $crate::field::Fr);

        impl $name {
            pub fn to_be_bytes(&self) -> [u8; 32] { $crate::field::fr_to_be32(&self.0) }

            pub fn from_be_bytes(bytes: &[u8; 32]) -> $crate::Result<Self> {
                $crate::field::fr_from_be32(bytes).map(Self)
            }

            pub fn is_zero(&self) -> bool { $crate::field::is_zero(&self.0) }

            pub fn to_decimal(&self) -> String { $crate::field::fr_to_decimal(&self.0) }
        }

        impl From<$crate::field::Fr> for $name {
            fn from(f: $crate::field::Fr) -> Self { Self(f) }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self { Self($crate::field::Fr::from(v)) }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::Error;
            fn from_str(s: &str) -> $crate::Result<Self> { $crate::field::parse_fr(s).map(Self) }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&$crate::field::fr_to_hex(&self.0))
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({})", stringify!($name), $crate::field::fr_to_hex(&self.0))
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, s: S) -> ::std::result::Result<S::Ok, S::Error> {
                s.serialize_str(&self.to_decimal())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> ::std::result::Result<Self, D::Error> {
                let s = <String as ::serde::Deserialize>::deserialize(d)?;
                s.parse().map_err(::serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use field_newtype;
