use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use feedback_vault::snapshot::ArtifactStore;

#[derive(Parser)]
#[command(name = "backup-tool")]
#[command(about = "Offline inspection of feedback service backups")]
struct Cli {
    /// Artifact directory.
    #[arg(long, default_value = "./backups")]
    dir: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Lists artifacts, oldest first.
    List,
    /// Prints an artifact's timestamp and per-collection counts.
    Inspect {
        name: String,
        /// Dump the full artifact as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Removes an artifact.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let artifacts = ArtifactStore::new(cli.dir);

    match cli.command {
        Command::List => list(&artifacts).await,
        Command::Inspect { name, json } => inspect(&artifacts, &name, json).await,
        Command::Delete { name } => {
            artifacts
                .delete(&name)
                .await
                .with_context(|| format!("failed to delete {name}"))?;
            println!("deleted {name}");
            Ok(())
        }
    }
}

async fn list(artifacts: &ArtifactStore) -> Result<()> {
    let names = artifacts.list().await.context("failed to list backups")?;
    if names.is_empty() {
        println!("no backups in {}", artifacts.root().display());
        return Ok(());
    }

    for name in names {
        let created = i64::try_from(name.created_millis())
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("{name}\t{created}");
    }
    Ok(())
}

async fn inspect(artifacts: &ArtifactStore, name: &str, json: bool) -> Result<()> {
    let artifact = artifacts
        .read(name)
        .await
        .with_context(|| format!("failed to read {name}"))?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&artifact).context("failed to render artifact")?;
        println!("{rendered}");
        return Ok(());
    }

    let stats = artifact.data.stats();
    println!("artifact:  {name}");
    println!("timestamp: {}", artifact.timestamp.to_rfc3339());
    println!("customers: {}", stats.customers);
    println!("feedbacks: {}", stats.feedbacks);
    println!("responses: {}", stats.responses);
    Ok(())
}
