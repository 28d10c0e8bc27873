//! `plan`: show what would load, and why.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use extweave_core::AppResult;
use extweave_core::config::AppConfig;
use extweave_loader::{ExtensionDescriptor, ExtensionManifest, ExtensionPipeline, Plan};

use crate::output::{self, OutputFormat};

/// Arguments for the plan command
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Only list active extensions
    #[arg(long)]
    pub active_only: bool,
}

/// One row of the plan table
#[derive(Debug, Serialize, Tabled)]
pub struct PlanRow {
    #[tabled(rename = "Extension")]
    pub id: String,
    #[tabled(rename = "Configured")]
    pub configured: bool,
    #[tabled(rename = "Active")]
    pub active: bool,
    #[tabled(rename = "Requires")]
    pub requires: String,
    #[tabled(rename = "After")]
    pub after: String,
    #[tabled(rename = "Problems")]
    pub problems: usize,
}

/// Execute the plan command
pub fn execute(
    args: &PlanArgs,
    manifests: Vec<ExtensionManifest>,
    config: &AppConfig,
    format: OutputFormat,
) -> AppResult<()> {
    let discovered = manifests
        .into_iter()
        .map(ExtensionDescriptor::without_procedure)
        .collect();
    let plan =
        ExtensionPipeline::new(&config.loader).plan_with_config(discovered, &config.extensions);

    match format {
        OutputFormat::Json => output::print_json(&plan.report()),
        OutputFormat::Table => {
            let rows: Vec<PlanRow> = rows(&plan)
                .into_iter()
                .filter(|row| !args.active_only || row.active)
                .collect();
            output::print_table(&rows);
            for error in &plan.errors {
                output::print_warning(&error.to_string());
            }
            output::print_success(&format!(
                "{} of {} extensions active",
                plan.active.len(),
                plan.discovered.len()
            ));
        }
    }

    Ok(())
}

fn rows(plan: &Plan) -> Vec<PlanRow> {
    plan.discovered
        .iter()
        .map(|id| PlanRow {
            id: id.to_string(),
            configured: plan.configured.contains(id),
            active: plan.active.contains(id),
            requires: plan
                .graph
                .dependencies(id)
                .map(output::join_ids)
                .unwrap_or_else(|| "-".to_string()),
            after: plan
                .graph
                .soft_dependencies(id)
                .map(output::join_ids)
                .unwrap_or_else(|| "-".to_string()),
            problems: plan.errors_for(id).count(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use extweave_core::config::extensions::ExtensionsConfig;

    #[test]
    fn test_rows_cover_every_discovered_extension() {
        let discovered = vec![
            ExtensionDescriptor::without_procedure(ExtensionManifest::new("lib")),
            ExtensionDescriptor::without_procedure(
                ExtensionManifest::new("app").requires(["lib"]).suggests(["theme"]),
            ),
            ExtensionDescriptor::without_procedure(ExtensionManifest::new("theme")),
        ];
        let config = ExtensionsConfig::new().with("app", true);
        let plan = ExtensionPipeline::default().plan_with_config(discovered, &config);

        let rows = rows(&plan);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].id, "app");
        assert!(rows[0].configured);
        assert_eq!(rows[0].requires, "lib");
        assert_eq!(rows[0].after, "theme");
        assert!(rows[1].active && !rows[1].configured);
        assert!(!rows[2].active);
    }
}
