//! `load`: run a simulated load pass over the active set.
//!
//! Manifests carry no code, so every extension gets a stand-in procedure
//! that waits `--delay-ms` and succeeds, unless it is named by `--fail`
//! (isolated failure) or `--abort` (critical failure).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use extweave_core::config::AppConfig;
use extweave_core::{AppResult, ExtensionId};
use extweave_loader::{
    ActivePublisher, ClosureProcedure, ExtensionDescriptor, ExtensionManifest, ExtensionPipeline,
    LoadFailure, LoadOutcome, LoadReport, PlanReport,
};

use crate::output::{self, OutputFormat};

/// Arguments for the load command
#[derive(Debug, Args)]
pub struct LoadArgs {
    /// Simulated work per extension, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub delay_ms: u64,

    /// Extensions whose load step fails without aborting the pass
    #[arg(long = "fail", value_name = "ID")]
    pub fail: Vec<String>,

    /// Extensions whose load step fails and aborts the pass
    #[arg(long = "abort", value_name = "ID")]
    pub abort: Vec<String>,
}

/// One row of the load table
#[derive(Debug, Serialize, Tabled)]
pub struct OutcomeRow {
    #[tabled(rename = "#")]
    pub position: usize,
    #[tabled(rename = "Extension")]
    pub id: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

#[derive(Debug, Serialize)]
struct LoadSummary<'a> {
    plan: &'a PlanReport,
    load: &'a LoadReport,
}

/// Execute the load command
pub async fn execute(
    args: &LoadArgs,
    manifests: Vec<ExtensionManifest>,
    config: &AppConfig,
    format: OutputFormat,
) -> AppResult<()> {
    let discovered = simulate(manifests, args);
    let (plan, report) = ExtensionPipeline::new(&config.loader)
        .run(discovered, &config.extensions, ActivePublisher::global())
        .await?;

    match format {
        OutputFormat::Json => output::print_json(&LoadSummary {
            plan: &plan,
            load: &report,
        }),
        OutputFormat::Table => {
            output::print_table(&rows(&report));
            for error in &plan.errors {
                output::print_warning(&error.to_string());
            }
            output::print_success(&format!(
                "Loaded {} of {} active extensions",
                report.loaded_count(),
                plan.active.len()
            ));
        }
    }

    Ok(())
}

fn simulate(manifests: Vec<ExtensionManifest>, args: &LoadArgs) -> Vec<ExtensionDescriptor> {
    let failing: Arc<HashSet<String>> = Arc::new(args.fail.iter().cloned().collect());
    let aborting: Arc<HashSet<String>> = Arc::new(args.abort.iter().cloned().collect());
    let delay = Duration::from_millis(args.delay_ms);

    let procedure = ClosureProcedure::new("simulated", move |id: ExtensionId| {
        let failing = failing.clone();
        let aborting = aborting.clone();
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if aborting.contains(id.as_str()) {
                return Err(LoadFailure::critical("simulated critical failure"));
            }
            if failing.contains(id.as_str()) {
                return Err(LoadFailure::isolated("simulated failure"));
            }
            info!(extension_id = %id, "Simulated load step complete");
            Ok(())
        }
    })
    .shared();

    manifests
        .into_iter()
        .map(|manifest| ExtensionDescriptor::new(manifest, procedure.clone()))
        .collect()
}

fn rows(report: &LoadReport) -> Vec<OutcomeRow> {
    report
        .order
        .iter()
        .enumerate()
        .filter_map(|(index, id)| {
            let (status, detail) = match report.outcome(id)? {
                LoadOutcome::Loaded => ("loaded", String::new()),
                LoadOutcome::Failed { reason } => ("failed", reason.clone()),
                LoadOutcome::Skipped { dependency } => {
                    ("skipped", format!("requires {dependency}"))
                }
            };
            Some(OutcomeRow {
                position: index + 1,
                id: id.to_string(),
                status: status.to_string(),
                detail,
            })
        })
        .collect()
}
