use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use primitives::{Label, Scope};
use syncd::{AspSync, FileSource, SledStore, Synchronizer, SyncdConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "syncd", about = "Association-set synchronizer for privacy pools")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the local root, size and cursor of a scope, or of every
    /// configured scope.
    Status {
        #[arg(long)]
        scope: Option<Scope>,
    },
    /// Check whether a label is in the local association set.
    HasLabel {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        label: Label,
    },
    /// Ingest approved deposits from a JSON file.
    Import {
        #[command(flatten)]
        scope: ScopeArgs,
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the root and content pointer to publish.
    Export(ScopeArgs),
}

#[derive(Args)]
struct ScopeArgs {
    #[arg(long)]
    scope: Scope,
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "syncd=info".into()))
        .init();

    let cli = Cli::parse();
    let config = SyncdConfig::load(cli.config.as_deref())?;
    let store = Arc::new(SledStore::open(&config.data_dir).with_context(|| format!("open store {}", config.data_dir.display()))?);
    let open = |scope: Scope, source: FileSource| Arc::new(AspSync::new(scope, store.clone(), Arc::new(source), None, config.batch_size));

    match cli.command {
        Commands::Status { scope: Some(scope) } => {
            let sync = open(scope, FileSource::default());
            print_json(&sync.status().await?)?;
        }
        Commands::Status { scope: None } => {
            let synchronizer = Synchronizer::new(store.clone(), Arc::new(FileSource::default()), None, config.batch_size);
            for scope in &config.scopes {
                synchronizer.scope(*scope).await;
            }
            let mut report = serde_json::Map::new();
            for (scope, status) in synchronizer.status_all().await {
                report.insert(scope.to_decimal(), serde_json::to_value(status?)?);
            }
            print_json(&report)?;
        }
        Commands::HasLabel { scope, label } => {
            let sync = open(scope.scope, FileSource::default());
            let present = sync.has_label(&label).await?;
            println!("{present}");
        }
        Commands::Import { scope, file } => {
            let source = FileSource::load(&file)?;
            info!(deposits = source.len(), file = %file.display(), "importing approved deposits");
            let sync = open(scope.scope, source);
            let inserted = sync.process_new_deposits().await?;
            let status = sync.status().await?;
            info!(inserted = inserted.len(), size = status.size, root = %status.local_root, "import finished");
            print_json(&status)?;
        }
        Commands::Export(args) => {
            let sync = open(args.scope, FileSource::default());
            print_json(&sync.export().await?)?;
        }
    }
    Ok(())
}
