//! CLI command definitions and dispatch.

pub mod load;
pub mod plan;

use clap::{Parser, Subcommand};

use extweave_core::AppResult;
use extweave_core::config::AppConfig;
use extweave_loader::ExtensionManifest;

use crate::output::OutputFormat;

/// extweave: plan and load extensions in dependency order
#[derive(Debug, Parser)]
#[command(name = "extweave", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/extweave.toml")]
    pub config: String,

    /// Path to a JSON array of extension manifests
    #[arg(short, long, default_value = "config/extensions.json")]
    pub manifests: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve the dependency graph and active set without loading
    Plan(plan::PlanArgs),
    /// Plan, publish the active set, and run a simulated load pass
    Load(load::LoadArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        let manifests = read_manifests(&self.manifests).await?;
        match &self.command {
            Commands::Plan(args) => plan::execute(args, manifests, config, self.format),
            Commands::Load(args) => load::execute(args, manifests, config, self.format).await,
        }
    }
}

/// Helper: read the manifest list
pub async fn read_manifests(path: &str) -> AppResult<Vec<ExtensionManifest>> {
    let raw = tokio::fs::read_to_string(path).await?;
    let manifests: Vec<ExtensionManifest> = serde_json::from_str(&raw)?;
    tracing::debug!(path, count = manifests.len(), "Read extension manifests");
    Ok(manifests)
}
