use std::path::{Path, PathBuf};

use anyhow::Context;
use config::{Config, Environment, File};
use primitives::Scope;
use serde::Deserialize;

use crate::service::DEFAULT_BATCH_SIZE;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SyncdConfig {
    pub data_dir: PathBuf,
    pub batch_size: usize,
    /// Scopes reported by `syncd status` when no `--scope` is given.
    pub scopes: Vec<Scope>,
}

impl SyncdConfig {
    /// Defaults, then `file` if given, then `SYNCD_*` environment variables
    /// (`SYNCD_SCOPES` is comma separated).
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default("data_dir", "./asp-data")?
            .set_default("batch_size", DEFAULT_BATCH_SIZE as u64)?
            .set_default("scopes", Vec::<String>::new())?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("SYNCD").try_parsing(true).list_separator(",").with_list_parse_key("scopes"));
        let config = builder.build().context("load syncd configuration")?;
        config.try_deserialize().context("invalid syncd configuration")
    }
}
