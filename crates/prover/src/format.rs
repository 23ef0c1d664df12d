//! Proof encodings.
//!
//! Provers emit snarkjs JSON: projective coordinates as decimal strings and
//! G2 points with coefficients in `(c0, c1)` order. The verifier contract
//! expects affine coordinates with G2 coefficients as `(c1, c0)`.

use primitives::field::{fr_to_decimal, parse_fr};
use primitives::{Fr, U256};
use serde::{Deserialize, Serialize};

use crate::{ProofError, Result};

/// Groth16 proof as written by snarkjs and rapidsnark.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

/// Proof laid out for the verifier contract's `verifyProof` arguments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolidityProof {
    pub p_a: [U256; 2],
    pub p_b: [[U256; 2]; 2],
    pub p_c: [U256; 2],
    pub pub_signals: Vec<U256>,
}

fn coordinate(raw: &[String], i: usize, what: &str) -> Result<U256> {
    let s = raw.get(i).ok_or_else(|| ProofError::MalformedProof(format!("{what} has no coordinate {i}")))?;
    U256::parse(s).map_err(|e| ProofError::MalformedProof(format!("{what}[{i}]: {e}")))
}

fn g2_row<'a>(pi_b: &'a [Vec<String>], i: usize) -> Result<&'a [String]> {
    pi_b.get(i).map(Vec::as_slice).ok_or_else(|| ProofError::MalformedProof(format!("pi_b has no row {i}")))
}

pub fn parse_signals(raw: &[String]) -> Result<Vec<Fr>> {
    raw.iter()
        .map(|s| parse_fr(s).map_err(|e| ProofError::MalformedProof(format!("public signal {s:?}: {e}"))))
        .collect()
}

pub fn signals_to_strings(signals: &[Fr]) -> Vec<String> { signals.iter().map(fr_to_decimal).collect() }

impl SolidityProof {
    pub fn from_snarkjs(proof: &Groth16Proof, public_signals: &[Fr]) -> Result<Self> {
        if let Some(protocol) = proof.protocol.as_deref() {
            if protocol != "groth16" {
                return Err(ProofError::MalformedProof(format!("unsupported protocol {protocol}")));
            }
        }
        let (b0, b1) = (g2_row(&proof.pi_b, 0)?, g2_row(&proof.pi_b, 1)?);
        Ok(Self {
            p_a: [coordinate(&proof.pi_a, 0, "pi_a")?, coordinate(&proof.pi_a, 1, "pi_a")?],
            p_b: [
                [coordinate(b0, 1, "pi_b[0]")?, coordinate(b0, 0, "pi_b[0]")?],
                [coordinate(b1, 1, "pi_b[1]")?, coordinate(b1, 0, "pi_b[1]")?],
            ],
            p_c: [coordinate(&proof.pi_c, 0, "pi_c")?, coordinate(&proof.pi_c, 1, "pi_c")?],
            pub_signals: public_signals.iter().map(U256::from_field).collect(),
        })
    }

    /// ABI encoding of `(uint256[2], uint256[2][2], uint256[2], uint256[n])`
    /// with a fixed-size signal array: every value as one 32-byte word.
    pub fn to_calldata_bytes(&self) -> Vec<u8> {
        let words = self.p_a.iter().chain(self.p_b.iter().flatten()).chain(self.p_c.iter()).chain(self.pub_signals.iter());
        let mut out = Vec::with_capacity((8 + self.pub_signals.len()) * 32);
        for word in words {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out
    }
}
