//! Proving backends.

use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::OnceCell;
use primitives::Fr;
use tracing::{debug, info};

use crate::artifacts::{load_verified, VerifiedArtifacts};
use crate::format::{parse_signals, Groth16Proof};
use crate::inputs::CircuitInputs;
use crate::{ProofError, ProverConfig, Result, CIRCUIT_VERSION};

/// Raw output of a backend, before any checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendProof {
    pub proof: Groth16Proof,
    pub public_signals: Vec<Fr>,
}

/// Something that turns circuit inputs into a Groth16 proof.
///
/// Calls block; the pipeline runs them on a dedicated thread.
pub trait ProvingBackend: Send + Sync {
    fn circuit_version(&self) -> u32;

    /// Make artifacts ready. Called before every proof; should be cheap once
    /// it has succeeded.
    fn load(&self) -> Result<()>;

    /// Prove, reporting progress in `0.0..=1.0`.
    fn prove(&self, inputs: &CircuitInputs, progress: &mut dyn FnMut(f32)) -> Result<BackendProof>;
}

/// Runs a compiled circom witness generator and the rapidsnark prover as
/// external processes in a scratch directory.
pub struct RapidsnarkBackend {
    config: ProverConfig,
    artifacts: OnceCell<VerifiedArtifacts>,
}

impl RapidsnarkBackend {
    pub fn new(config: ProverConfig) -> Self { Self { config, artifacts: OnceCell::new() } }

    pub fn config(&self) -> &ProverConfig { &self.config }

    fn artifacts(&self) -> Result<&VerifiedArtifacts> {
        self.artifacts.get_or_try_init(|| {
            load_verified(&self.config.manifest_path, CIRCUIT_VERSION).map_err(|e| ProofError::Artifacts(format!("{e:#}")))
        })
    }
}

fn backend_err(context: &str, err: impl std::fmt::Display) -> ProofError { ProofError::Backend(format!("{context}: {err}")) }

fn run(program: &Path, args: &[&Path]) -> Result<()> {
    debug!(program = %program.display(), "spawning prover process");
    let output = Command::new(program).args(args).output().map_err(|e| backend_err(&program.display().to_string(), e))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProofError::Backend(format!("{} exited with {}: {}", program.display(), output.status, stderr.trim())));
    }
    Ok(())
}

impl ProvingBackend for RapidsnarkBackend {
    fn circuit_version(&self) -> u32 { CIRCUIT_VERSION }

    fn load(&self) -> Result<()> { self.artifacts().map(|_| ()) }

    fn prove(&self, inputs: &CircuitInputs, progress: &mut dyn FnMut(f32)) -> Result<BackendProof> {
        let artifacts = self.artifacts()?;
        std::fs::create_dir_all(&self.config.work_dir).map_err(|e| backend_err("create work dir", e))?;
        let scratch = tempfile::Builder::new()
            .prefix("withdraw-")
            .tempdir_in(&self.config.work_dir)
            .map_err(|e| backend_err("create scratch dir", e))?;
        let file = |name: &str| -> PathBuf { scratch.path().join(name) };
        let (input, witness, proof_path, public_path) = (file("input.json"), file("witness.wtns"), file("proof.json"), file("public.json"));

        let json = serde_json::to_vec(inputs).map_err(|e| backend_err("encode inputs", e))?;
        std::fs::write(&input, json).map_err(|e| backend_err("write inputs", e))?;
        progress(0.05);

        run(&artifacts.witness_generator, &[input.as_path(), witness.as_path()])?;
        progress(0.35);

        run(
            &self.config.rapidsnark_bin,
            &[artifacts.zkey.as_path(), witness.as_path(), proof_path.as_path(), public_path.as_path()],
        )?;
        progress(0.95);

        let proof: Groth16Proof = read_json(&proof_path)?;
        let raw_signals: Vec<String> = read_json(&public_path)?;
        let public_signals = parse_signals(&raw_signals)?;
        progress(1.0);
        info!(signals = public_signals.len(), "rapidsnark proof generated");
        Ok(BackendProof { proof, public_signals })
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| backend_err(&path.display().to_string(), e))?;
    serde_json::from_slice(&bytes).map_err(|e| ProofError::MalformedProof(format!("{}: {e}", path.display())))
}
