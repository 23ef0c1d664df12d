//! Witness inputs for the withdrawal circuit and its public signal layout.

use std::fmt;

use primitives::field::{fr_to_decimal, serde_fr};
use primitives::{Amount, Commitment, Fr, Label, Nullifier, NullifierHash, Root, Secret};
use serde::{Serialize, Serializer};

/// Positions of the public signals the circuit emits.
pub mod signals {
    pub const NEW_COMMITMENT: usize = 0;
    pub const EXISTING_NULLIFIER_HASH: usize = 1;
    pub const WITHDRAWN_VALUE: usize = 2;
    pub const STATE_ROOT: usize = 3;
    pub const STATE_TREE_DEPTH: usize = 4;
    pub const ASP_ROOT: usize = 5;
    pub const ASP_TREE_DEPTH: usize = 6;
    pub const CONTEXT: usize = 7;
    pub const COUNT: usize = 8;

    pub const NAMES: [&str; COUNT] = [
        "newCommitment",
        "existingNullifierHash",
        "withdrawnValue",
        "stateRoot",
        "stateTreeDepth",
        "ASPRoot",
        "ASPTreeDepth",
        "context",
    ];
}

/// Circuit input file, keyed by the circuit's signal names.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitInputs {
    pub withdrawn_value: Amount,
    pub state_root: Root,
    #[serde(serialize_with = "decimal")]
    pub state_tree_depth: u32,
    #[serde(rename = "ASPRoot")]
    pub asp_root: Root,
    #[serde(rename = "ASPTreeDepth", serialize_with = "decimal")]
    pub asp_tree_depth: u32,
    #[serde(with = "serde_fr")]
    pub context: Fr,

    pub label: Label,
    pub existing_value: Amount,
    pub existing_nullifier: Nullifier,
    pub existing_secret: Secret,
    pub new_nullifier: Nullifier,
    pub new_secret: Secret,
    #[serde(serialize_with = "decimal_seq")]
    pub state_siblings: Vec<Fr>,
    #[serde(serialize_with = "decimal")]
    pub state_index: u64,
    #[serde(rename = "ASPSiblings", serialize_with = "decimal_seq")]
    pub asp_siblings: Vec<Fr>,
    #[serde(rename = "ASPIndex", serialize_with = "decimal")]
    pub asp_index: u64,
}

fn decimal<T: ToString, S: Serializer>(v: &T, s: S) -> Result<S::Ok, S::Error> { s.serialize_str(&v.to_string()) }

fn decimal_seq<S: Serializer>(v: &[Fr], s: S) -> Result<S::Ok, S::Error> { s.collect_seq(v.iter().map(fr_to_decimal)) }

impl fmt::Debug for CircuitInputs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitInputs")
            .field("withdrawn_value", &self.withdrawn_value)
            .field("state_root", &self.state_root)
            .field("state_tree_depth", &self.state_tree_depth)
            .field("asp_root", &self.asp_root)
            .field("asp_tree_depth", &self.asp_tree_depth)
            .finish_non_exhaustive()
    }
}

/// Public signals the proof must carry, computed natively before proving.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedSignals {
    pub new_commitment: Commitment,
    pub existing_nullifier_hash: NullifierHash,
    pub values: [Fr; signals::COUNT],
}

impl ExpectedSignals {
    pub fn new(inputs: &CircuitInputs, new_commitment: Commitment, existing_nullifier_hash: NullifierHash) -> primitives::Result<Self> {
        let mut values = [Fr::from(0u64); signals::COUNT];
        values[signals::NEW_COMMITMENT] = new_commitment.0;
        values[signals::EXISTING_NULLIFIER_HASH] = existing_nullifier_hash.0;
        values[signals::WITHDRAWN_VALUE] = inputs.withdrawn_value.to_field()?;
        values[signals::STATE_ROOT] = inputs.state_root.0;
        values[signals::STATE_TREE_DEPTH] = Fr::from(inputs.state_tree_depth as u64);
        values[signals::ASP_ROOT] = inputs.asp_root.0;
        values[signals::ASP_TREE_DEPTH] = Fr::from(inputs.asp_tree_depth as u64);
        values[signals::CONTEXT] = inputs.context;
        Ok(Self { new_commitment, existing_nullifier_hash, values })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CircuitInputs {
        CircuitInputs {
            withdrawn_value: Amount::from(5u64),
            state_root: Root::from(11u64),
            state_tree_depth: 3,
            asp_root: Root::from(12u64),
            asp_tree_depth: 2,
            context: Fr::from(13u64),
            label: Label::from(14u64),
            existing_value: Amount::from(20u64),
            existing_nullifier: Nullifier::from(15u64),
            existing_secret: Secret::from(16u64),
            new_nullifier: Nullifier::from(17u64),
            new_secret: Secret::from(18u64),
            state_siblings: vec![Fr::from(1u64), Fr::from(0u64)],
            state_index: 6,
            asp_siblings: vec![Fr::from(2u64)],
            asp_index: 1,
        }
    }

    #[test]
    fn serializes_with_circuit_signal_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["withdrawnValue"], "5");
        assert_eq!(json["stateTreeDepth"], "3");
        assert_eq!(json["ASPRoot"], "12");
        assert_eq!(json["ASPTreeDepth"], "2");
        assert_eq!(json["context"], "13");
        assert_eq!(json["existingSecret"], "16");
        assert_eq!(json["stateSiblings"], serde_json::json!(["1", "0"]));
        assert_eq!(json["ASPSiblings"], serde_json::json!(["2"]));
        assert_eq!(json["stateIndex"], "6");
        assert_eq!(json["ASPIndex"], "1");
        assert_eq!(json.as_object().unwrap().len(), 16);
    }

    #[test]
    fn debug_hides_private_inputs() {
        let rendered = format!("{:?}", sample());
        assert!(rendered.contains("state_root"));
        assert!(!rendered.contains("existing_secret"));
        assert!(!rendered.contains("new_nullifier"));
    }

    #[test]
    fn expected_signals_follow_public_layout() {
        let inputs = sample();
        let expected = ExpectedSignals::new(&inputs, Commitment::from(1u64), NullifierHash::from(2u64)).unwrap();
        assert_eq!(expected.values[signals::NEW_COMMITMENT], Fr::from(1u64));
        assert_eq!(expected.values[signals::EXISTING_NULLIFIER_HASH], Fr::from(2u64));
        assert_eq!(expected.values[signals::WITHDRAWN_VALUE], Fr::from(5u64));
        assert_eq!(expected.values[signals::ASP_TREE_DEPTH], Fr::from(2u64));
        assert_eq!(expected.values[signals::CONTEXT], Fr::from(13u64));
    }
}
