use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the rapidsnark backend finds its tools and scratch space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProverConfig {
    pub manifest_path: PathBuf,
    pub rapidsnark_bin: PathBuf,
    pub work_dir: PathBuf,
}

impl Default for ProverConfig {
    fn default() -> Self {
        Self {
            manifest_path: PathBuf::from("./artifacts/manifest.json"),
            rapidsnark_bin: PathBuf::from("rapidsnark"),
            work_dir: std::env::temp_dir().join("pool-prover"),
        }
    }
}

impl ProverConfig {
    /// Defaults overridden by `PROVER_MANIFEST`, `PROVER_RAPIDSNARK_BIN` and
    /// `PROVER_WORK_DIR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);
        if let Some(v) = var("PROVER_MANIFEST") {
            config.manifest_path = v;
        }
        if let Some(v) = var("PROVER_RAPIDSNARK_BIN") {
            config.rapidsnark_bin = v;
        }
        if let Some(v) = var("PROVER_WORK_DIR") {
            config.work_dir = v;
        }
        config
    }
}
