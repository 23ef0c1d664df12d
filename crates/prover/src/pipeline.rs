//! Withdrawal proof pipeline.
//!
//! `prepare` does everything that needs the network or the local trees:
//! argument checks, the unspent check, root preflight and witness assembly.
//! `generate_proof` is the blocking part: load artifacts, prove, then check
//! that the backend's public signals are the ones computed natively before
//! the proof is accepted.

use std::sync::Arc;

use accum::params::MAX_DEPTH;
use accum::IncrementalMerkleTree;
use keys::{DepositSecrets, MasterKeys};
use primitives::field::fr_to_decimal;
use primitives::{Amount, Commitment, Fr, NullifierHash, Scope};
use sync::{SpendLookup, UnspentDeposit};
use tracing::{debug, info};

use crate::context::Withdrawal;
use crate::format::{Groth16Proof, SolidityProof};
use crate::inputs::{signals, CircuitInputs, ExpectedSignals};
use crate::preflight::{association_membership, state_membership, TreeView};
use crate::task::{ProofStage, ProofTask};
use crate::{ProofError, ProvingBackend, Result, CIRCUIT_VERSION};

/// What to withdraw, from which deposit, and where to.
#[derive(Clone, Debug)]
pub struct WithdrawalRequest {
    pub deposit: UnspentDeposit,
    pub withdrawn_value: Amount,
    pub withdrawal: Withdrawal,
    pub scope: Scope,
}

/// Commitment left in the pool after the withdrawal. Zero-valued for a full
/// withdrawal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChangeNote {
    pub secrets: DepositSecrets,
    pub value: Amount,
    pub commitment: Commitment,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedWithdrawal {
    pub inputs: CircuitInputs,
    pub expected: ExpectedSignals,
    pub change: ChangeNote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WithdrawalProof {
    pub proof: SolidityProof,
    pub raw: Groth16Proof,
    pub new_commitment: Commitment,
    pub existing_nullifier_hash: NullifierHash,
    pub change: ChangeNote,
}

fn invalid(msg: impl Into<String>) -> ProofError { ProofError::InvalidRequest(msg.into()) }

/// Checks that need no I/O.
pub fn validate_request(request: &WithdrawalRequest) -> Result<()> {
    let deposit = &request.deposit;
    if request.withdrawn_value.is_zero() {
        return Err(invalid("withdrawn value must be non-zero"));
    }
    if request.withdrawn_value > deposit.value {
        return Err(invalid(format!("cannot withdraw {} from a deposit worth {}", request.withdrawn_value, deposit.value)));
    }
    if request.scope.is_zero() {
        return Err(keys::KeyError::ZeroScope.into());
    }
    if deposit.secrets.commitment(&deposit.value)? != deposit.commitment {
        return Err(invalid("deposit commitment does not match its secrets and value"));
    }
    if deposit.secrets.nullifier_hash() != deposit.nullifier_hash {
        return Err(invalid("deposit nullifier hash does not match its nullifier"));
    }
    Ok(())
}

/// Compare backend output with the natively computed signals.
pub fn verify_signals(expected: &ExpectedSignals, actual: &[Fr]) -> Result<()> {
    if actual.len() != signals::COUNT {
        return Err(ProofError::MalformedProof(format!(
            "expected {} public signals, backend returned {}",
            signals::COUNT,
            actual.len()
        )));
    }
    for (i, (want, got)) in expected.values.iter().zip(actual).enumerate() {
        if want != got {
            return Err(ProofError::SignalMismatch {
                signal: signals::NAMES[i],
                expected: fr_to_decimal(want),
                actual: fr_to_decimal(got),
            });
        }
    }
    Ok(())
}

/// Run the blocking stages. `on_stage` may abort between stages by returning
/// an error.
pub fn generate_proof(
    backend: &dyn ProvingBackend,
    prepared: &PreparedWithdrawal,
    on_stage: &mut dyn FnMut(ProofStage) -> Result<()>,
) -> Result<WithdrawalProof> {
    if backend.circuit_version() != CIRCUIT_VERSION {
        return Err(ProofError::Artifacts(format!(
            "backend proves circuit version {}, inputs are for {CIRCUIT_VERSION}",
            backend.circuit_version()
        )));
    }
    on_stage(ProofStage::Loading)?;
    backend.load()?;
    on_stage(ProofStage::Computing { progress: 0.0 })?;
    let raw = backend.prove(&prepared.inputs, &mut |progress| {
        let _ = on_stage(ProofStage::Computing { progress: progress.clamp(0.0, 1.0) });
    })?;
    verify_signals(&prepared.expected, &raw.public_signals)?;
    let proof = SolidityProof::from_snarkjs(&raw.proof, &raw.public_signals)?;
    info!(new_commitment = %prepared.expected.new_commitment, "withdrawal proof accepted");
    Ok(WithdrawalProof {
        proof,
        raw: raw.proof,
        new_commitment: prepared.expected.new_commitment,
        existing_nullifier_hash: prepared.expected.existing_nullifier_hash,
        change: prepared.change,
    })
}

pub struct WithdrawalPipeline<L> {
    backend: Arc<dyn ProvingBackend>,
    lookup: L,
    chain_id: u64,
}

impl<L: SpendLookup> WithdrawalPipeline<L> {
    pub fn new(backend: Arc<dyn ProvingBackend>, lookup: L, chain_id: u64) -> Self { Self { backend, lookup, chain_id } }

    pub fn backend(&self) -> &Arc<dyn ProvingBackend> { &self.backend }

    pub fn lookup(&self) -> &L { &self.lookup }

    /// Validate the request against the current pool state and assemble the
    /// circuit inputs.
    pub async fn prepare(
        &self,
        request: &WithdrawalRequest,
        keys: &MasterKeys,
        state: TreeView<'_>,
        asp: TreeView<'_>,
    ) -> Result<PreparedWithdrawal> {
        validate_request(request)?;
        let deposit = &request.deposit;

        let status = self
            .lookup
            .spend_info(deposit.nullifier_hash, self.chain_id)
            .await
            .map_err(|e| ProofError::Lookup(e.0))?;
        if !status.is_unspent() {
            return Err(ProofError::AlreadySpent(deposit.nullifier_hash));
        }

        let state_proof = state_membership(state, &deposit.commitment)?;
        let asp_proof = association_membership(asp, &deposit.secrets.label)?;

        let new_secrets = deposit.secrets.next(keys, &request.scope)?;
        let change_value = deposit
            .value
            .checked_sub(request.withdrawn_value)
            .ok_or_else(|| invalid("withdrawn value exceeds deposit"))?;
        let change = ChangeNote { secrets: new_secrets, value: change_value, commitment: new_secrets.commitment(&change_value)? };

        let inputs = CircuitInputs {
            withdrawn_value: request.withdrawn_value,
            state_root: state.tree.root(),
            state_tree_depth: state.tree.depth() as u32,
            asp_root: asp.tree.root(),
            asp_tree_depth: asp.tree.depth() as u32,
            context: request.withdrawal.context(&request.scope),
            label: deposit.secrets.label,
            existing_value: deposit.value,
            existing_nullifier: deposit.secrets.nullifier,
            existing_secret: deposit.secrets.secret,
            new_nullifier: new_secrets.nullifier,
            new_secret: new_secrets.secret,
            state_siblings: state_proof.path.padded_siblings(MAX_DEPTH)?,
            state_index: state_proof.index as u64,
            asp_siblings: asp_proof.path.padded_siblings(MAX_DEPTH)?,
            asp_index: asp_proof.index as u64,
        };
        let expected = ExpectedSignals::new(&inputs, change.commitment, deposit.nullifier_hash)?;
        debug!(
            label = %deposit.secrets.label,
            child_index = new_secrets.child_index,
            state_index = inputs.state_index,
            "withdrawal inputs prepared"
        );
        Ok(PreparedWithdrawal { inputs, expected, change })
    }

    /// Start proving on a dedicated thread.
    pub fn start(&self, prepared: PreparedWithdrawal) -> Result<ProofTask> { ProofTask::spawn(self.backend.clone(), prepared) }

    /// `prepare`, then `start`, then wait for the result.
    pub async fn prove(
        &self,
        request: &WithdrawalRequest,
        keys: &MasterKeys,
        state: TreeView<'_>,
        asp: TreeView<'_>,
    ) -> Result<WithdrawalProof> {
        let prepared = self.prepare(request, keys, state, asp).await?;
        self.start(prepared)?.finish().await
    }
}
