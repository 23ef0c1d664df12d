//! Background proof generation.
//!
//! Proving takes seconds to minutes of CPU, so it runs on its own OS thread
//! and reports stages over a channel. Cancellation is observed at stage
//! boundaries; a backend call already in progress runs to completion and its
//! result is discarded.

use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::pipeline::{generate_proof, PreparedWithdrawal, WithdrawalProof};
use crate::{ProofError, ProvingBackend, Result};

const STAGE_BUFFER: usize = 32;

#[derive(Clone, Debug, PartialEq)]
pub enum ProofStage {
    Idle,
    Loading,
    Computing { progress: f32 },
    Done(Box<WithdrawalProof>),
    Error(ProofError),
}

impl ProofStage {
    pub fn is_terminal(&self) -> bool { matches!(self, ProofStage::Done(_) | ProofStage::Error(_)) }
}

/// Handle to a proof running in the background. Dropping it cancels the
/// proof.
pub struct ProofTask {
    stages: mpsc::Receiver<ProofStage>,
    cancel: CancellationToken,
    last: ProofStage,
}

impl ProofTask {
    pub fn spawn(backend: Arc<dyn ProvingBackend>, prepared: PreparedWithdrawal) -> Result<Self> {
        let (tx, rx) = mpsc::channel(STAGE_BUFFER);
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        thread::Builder::new()
            .name("withdrawal-prover".into())
            .spawn(move || {
                let mut emit = |stage: ProofStage| -> Result<()> {
                    if worker_cancel.is_cancelled() {
                        return Err(ProofError::Cancelled);
                    }
                    // Progress updates are best-effort; a slow reader must not stall proving.
                    match stage {
                        ProofStage::Computing { .. } => {
                            let _ = tx.try_send(stage);
                        }
                        other => {
                            let _ = tx.blocking_send(other);
                        }
                    }
                    Ok(())
                };
                let terminal = match generate_proof(backend.as_ref(), &prepared, &mut emit) {
                    Ok(proof) => ProofStage::Done(Box::new(proof)),
                    Err(ProofError::Cancelled) => {
                        debug!("proof cancelled");
                        return;
                    }
                    Err(err) => {
                        warn!(%err, "proof generation failed");
                        ProofStage::Error(err)
                    }
                };
                if !worker_cancel.is_cancelled() {
                    let _ = tx.blocking_send(terminal);
                }
            })
            .map_err(|e| ProofError::Backend(format!("spawn prover thread: {e}")))?;

        Ok(Self { stages: rx, cancel, last: ProofStage::Idle })
    }

    pub fn cancellation_token(&self) -> CancellationToken { self.cancel.clone() }

    pub fn cancel(&self) { self.cancel.cancel() }

    /// Last stage returned by [`ProofTask::next_stage`].
    pub fn stage(&self) -> &ProofStage { &self.last }

    /// Wait for the next stage. Returns `None` once a terminal stage has been
    /// delivered.
    pub async fn next_stage(&mut self) -> Option<ProofStage> {
        if self.last.is_terminal() {
            return None;
        }
        let stage = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => ProofStage::Error(ProofError::Cancelled),
            next = self.stages.recv() => next.unwrap_or_else(|| {
                ProofStage::Error(ProofError::Backend("prover thread stopped without a result".into()))
            }),
        };
        self.last = stage.clone();
        Some(stage)
    }

    /// Drive the task to completion.
    pub async fn finish(mut self) -> Result<WithdrawalProof> {
        while self.next_stage().await.is_some() {}
        match &self.last {
            ProofStage::Done(proof) => Ok((**proof).clone()),
            ProofStage::Error(err) => Err(err.clone()),
            _ => Err(ProofError::Cancelled),
        }
    }
}

impl Drop for ProofTask {
    fn drop(&mut self) { self.cancel.cancel() }
}
