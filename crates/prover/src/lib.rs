//! Withdrawal proving.
//!
//! Turns an unspent deposit plus a withdrawal request into a Groth16 proof
//! the pool contract will accept. Everything that can be checked locally is
//! checked before the backend runs, and everything the backend returns is
//! checked against native computation before the proof is handed out.

pub mod artifacts;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod inputs;
pub mod pipeline;
pub mod preflight;
pub mod task;

pub use backend::{BackendProof, ProvingBackend, RapidsnarkBackend};
pub use config::ProverConfig;
pub use context::{compute_context, Withdrawal};
pub use error::{ProofError, Result, TreeKind};
pub use format::{Groth16Proof, SolidityProof};
pub use inputs::{CircuitInputs, ExpectedSignals};
pub use pipeline::{ChangeNote, PreparedWithdrawal, WithdrawalPipeline, WithdrawalProof, WithdrawalRequest};
pub use preflight::TreeView;
pub use task::{ProofStage, ProofTask};

/// Version of the withdrawal circuit whose input layout this crate produces.
pub const CIRCUIT_VERSION: u32 = 1;
