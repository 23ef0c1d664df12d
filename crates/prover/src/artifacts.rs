//! Proving artifact manifest.
//!
//! The witness generator, proving key and verification key are large files
//! fetched out of band. A manifest pins each one by size and BLAKE2b digest
//! together with the circuit version they were compiled for; nothing is
//! handed to the backend until every entry checks out.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context};
use primitives::digest::{blake2b_256_state, finalize_256, DS_ARTIFACT_V1};
use serde::{Deserialize, Serialize};
use tracing::info;

pub const MANIFEST_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactFile {
    /// Relative to the manifest's directory.
    pub path: PathBuf,
    pub size: u64,
    /// Hex BLAKE2b-256 with the artifact personalization.
    pub blake2b: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactManifest {
    pub manifest_version: u32,
    pub circuit_version: u32,
    pub witness_generator: ArtifactFile,
    pub zkey: ArtifactFile,
    pub verification_key: ArtifactFile,
}

/// Artifacts whose integrity has been checked, with absolute paths.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedArtifacts {
    pub circuit_version: u32,
    pub witness_generator: PathBuf,
    pub zkey: PathBuf,
    pub verification_key: PathBuf,
}

pub fn file_digest(path: &Path) -> anyhow::Result<(u64, [u8; 32])> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut state = blake2b_256_state(DS_ARTIFACT_V1);
    let mut buf = vec![0u8; 1 << 16];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buf).with_context(|| format!("read {}", path.display()))?;
        if n == 0 {
            break;
        }
        state.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, finalize_256(&state)))
}

/// Describe a file for inclusion in a manifest rooted at `base`.
pub fn describe(base: &Path, relative: impl Into<PathBuf>) -> anyhow::Result<ArtifactFile> {
    let path = relative.into();
    let (size, digest) = file_digest(&base.join(&path))?;
    Ok(ArtifactFile { path, size, blake2b: hex::encode(digest) })
}

impl ArtifactManifest {
    pub fn read(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("read manifest {}", path.display()))?;
        serde_json::from_slice(&bytes).with_context(|| format!("parse manifest {}", path.display()))
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write manifest {}", path.display()))
    }

    /// Check versions and every file against the manifest entries.
    pub fn verify(&self, base: &Path, circuit_version: u32) -> anyhow::Result<VerifiedArtifacts> {
        ensure!(
            self.manifest_version == MANIFEST_VERSION,
            "unsupported manifest version {} (expected {MANIFEST_VERSION})",
            self.manifest_version
        );
        ensure!(
            self.circuit_version == circuit_version,
            "artifacts built for circuit version {}, backend expects {circuit_version}",
            self.circuit_version
        );
        let witness_generator = check_file(base, "witness generator", &self.witness_generator)?;
        ensure_executable(&witness_generator)?;
        let zkey = check_file(base, "proving key", &self.zkey)?;
        let verification_key = check_file(base, "verification key", &self.verification_key)?;
        info!(circuit_version, zkey = %zkey.display(), "proving artifacts verified");
        Ok(VerifiedArtifacts { circuit_version, witness_generator, zkey, verification_key })
    }
}

/// Read the manifest at `path` and verify the files next to it.
pub fn load_verified(path: &Path, circuit_version: u32) -> anyhow::Result<VerifiedArtifacts> {
    let manifest = ArtifactManifest::read(path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    manifest.verify(base, circuit_version)
}

fn check_file(base: &Path, what: &str, entry: &ArtifactFile) -> anyhow::Result<PathBuf> {
    let path = base.join(&entry.path);
    let (size, digest) = file_digest(&path).with_context(|| format!("{what} missing"))?;
    if size != entry.size {
        bail!("{what} {} is {size} bytes, manifest says {}", path.display(), entry.size);
    }
    if hex::encode(digest) != entry.blake2b.trim_start_matches("0x").to_ascii_lowercase() {
        bail!("{what} {} digest mismatch", path.display());
    }
    Ok(path)
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = std::fs::metadata(path)?.permissions().mode();
    ensure!(mode & 0o111 != 0, "witness generator {} is not executable", path.display());
    Ok(())
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> anyhow::Result<()> { Ok(()) }

#[cfg(test)]
mod tests {
    use super::*;

    fn write_artifacts(dir: &Path) -> ArtifactManifest {
        std::fs::write(dir.join("witness"), b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(dir.join("witness"), std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        std::fs::write(dir.join("withdraw.zkey"), vec![7u8; 100_000]).unwrap();
        std::fs::write(dir.join("vkey.json"), b"{}").unwrap();
        ArtifactManifest {
            manifest_version: MANIFEST_VERSION,
            circuit_version: 3,
            witness_generator: describe(dir, "witness").unwrap(),
            zkey: describe(dir, "withdraw.zkey").unwrap(),
            verification_key: describe(dir, "vkey.json").unwrap(),
        }
    }

    #[test]
    fn manifest_roundtrip_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_artifacts(dir.path());
        let path = dir.path().join("manifest.json");
        manifest.write(&path).unwrap();
        let verified = load_verified(&path, 3).unwrap();
        assert_eq!(verified.zkey, dir.path().join("withdraw.zkey"));
        assert_eq!(manifest.zkey.size, 100_000);
    }

    #[test]
    fn tampered_or_mismatched_artifacts_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = write_artifacts(dir.path());
        assert!(manifest.verify(dir.path(), 4).is_err());

        let mut zkey = vec![7u8; 100_000];
        zkey[500] = 8;
        std::fs::write(dir.path().join("withdraw.zkey"), zkey).unwrap();
        let err = manifest.verify(dir.path(), 3).unwrap_err();
        assert!(err.to_string().contains("digest mismatch"));

        std::fs::remove_file(dir.path().join("vkey.json")).unwrap();
        assert!(manifest.verify(dir.path(), 3).is_err());
    }
}
