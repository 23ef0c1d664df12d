//! Persisted association-set state and its content pointer.
//!
//! Layout: version byte, cursor flag (0 or 1) followed by the cursor's block
//! number and log index, then the length-prefixed label list in insertion
//! order.

use std::fmt;
use std::str::FromStr;

use primitives::digest::{blake2b_256, DS_ASP_SET_V1};
use primitives::encode::{encode_u32, encode_u64, encode_u8, encode_vec_fr, read_u32, read_u64, read_u8, read_vec_fr, read_version, ENC_V1};
use primitives::{Error, Fr, Label};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Position of an approved deposit in the source's event stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub block_number: u64,
    pub log_index: u32,
}

impl Cursor {
    pub fn new(block_number: u64, log_index: u32) -> Self { Self { block_number, log_index } }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}:{}", self.block_number, self.log_index) }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AspSnapshot {
    pub labels: Vec<Label>,
    pub cursor: Option<Cursor>,
}

impl AspSnapshot {
    pub fn encode(&self) -> Vec<u8> {
        let leaves: Vec<Fr> = self.labels.iter().map(|l| l.0).collect();
        encode_parts(&leaves, self.cursor)
    }

    pub fn decode(mut data: &[u8]) -> primitives::Result<Self> {
        let data = &mut data;
        read_version(data)?;
        let cursor = match read_u8(data)? {
            0 => None,
            1 => Some(Cursor { block_number: read_u64(data)?, log_index: read_u32(data)? }),
            other => return Err(Error::InvalidInteger(format!("cursor flag {other}"))),
        };
        let labels = read_vec_fr(data)?.into_iter().map(Label).collect();
        if !data.is_empty() {
            return Err(Error::TrailingBytes("association-set snapshot"));
        }
        Ok(Self { labels, cursor })
    }
}

/// Encode leaves and cursor without building an [`AspSnapshot`].
pub fn encode_parts(leaves: &[Fr], cursor: Option<Cursor>) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 13 + 4 + leaves.len() * 32);
    encode_u8(ENC_V1, &mut out);
    match cursor {
        None => encode_u8(0, &mut out),
        Some(c) => {
            encode_u8(1, &mut out);
            encode_u64(c.block_number, &mut out);
            encode_u32(c.log_index, &mut out);
        }
    }
    encode_vec_fr(leaves.iter(), &mut out);
    out
}

/// Opaque pointer published on-chain with each root: a digest of the
/// ordered label list, so anyone holding the list can check it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContentPointer(pub [u8; 32]);

impl ContentPointer {
    pub fn of_leaves(leaves: &[Fr]) -> Self {
        let mut data = Vec::with_capacity(4 + leaves.len() * 32);
        encode_vec_fr(leaves.iter(), &mut data);
        Self(blake2b_256(DS_ASP_SET_V1, &data))
    }
}

impl fmt::Display for ContentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "0x{}", hex::encode(self.0)) }
}

impl fmt::Debug for ContentPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ContentPointer({self})") }
}

impl FromStr for ContentPointer {
    type Err = Error;

    fn from_str(s: &str) -> primitives::Result<Self> {
        let invalid = || Error::InvalidHex { input: s.to_string(), expected: 32 };
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|_| invalid())?;
        bytes.try_into().map(Self).map_err(|_| invalid())
    }
}

impl Serialize for ContentPointer {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> { s.collect_str(self) }
}

impl<'de> Deserialize<'de> for ContentPointer {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
