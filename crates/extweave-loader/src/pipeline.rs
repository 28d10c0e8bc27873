//! Graph building, activation, publication, and the load pass.
//!
//! Planning is pure: running [`ExtensionPipeline::plan`] twice on the same
//! input and configuration yields the same graph and active set. All
//! planning diagnostics are collected before anything is loaded.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use extweave_core::config::extensions::ExtensionsConfig;
use extweave_core::config::loader::LoaderConfig;
use extweave_core::{AppResult, ExtensionId};

use crate::activation::ActivationResolver;
use crate::diagnostics::PlanError;
use crate::graph::DependencyGraph;
use crate::loader::{ConcurrentLoader, LoadReport, LoaderSettings};
use crate::manifest::ExtensionDescriptor;
use crate::publish::{ActivePublisher, ActiveSnapshot};

/// Serializable summary of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    /// Every discovered extension, sorted and deduplicated.
    pub discovered: Vec<ExtensionId>,
    /// Extensions switched on by configuration.
    pub configured: BTreeSet<ExtensionId>,
    /// Final active set.
    pub active: BTreeSet<ExtensionId>,
    /// Resolved dependency graph.
    pub graph: DependencyGraph,
    /// Planning diagnostics.
    pub errors: Vec<PlanError>,
}

/// Output of the planning stage, ready to load.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Active extensions, sorted by id.
    pub extensions: Vec<ExtensionDescriptor>,
    /// Resolved dependency graph over every discovered extension.
    pub graph: DependencyGraph,
    /// Every discovered extension, sorted and deduplicated.
    pub discovered: Vec<ExtensionId>,
    /// Extensions switched on by configuration.
    pub configured: BTreeSet<ExtensionId>,
    /// Final active set.
    pub active: BTreeSet<ExtensionId>,
    /// Planning diagnostics, graph errors first.
    pub errors: Vec<PlanError>,
}

impl Plan {
    /// Returns the serializable summary.
    pub fn report(&self) -> PlanReport {
        PlanReport {
            discovered: self.discovered.clone(),
            configured: self.configured.clone(),
            active: self.active.clone(),
            graph: self.graph.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Snapshot of the active set.
    pub fn snapshot(&self) -> ActiveSnapshot {
        ActiveSnapshot::new(self.active.clone())
    }

    /// Diagnostics that name the given extension.
    pub fn errors_for<'a>(&'a self, id: &'a ExtensionId) -> impl Iterator<Item = &'a PlanError> {
        self.errors.iter().filter(move |e| e.involves(id))
    }
}

/// Builder → resolver → loader.
#[derive(Debug, Clone, Default)]
pub struct ExtensionPipeline {
    resolver: ActivationResolver,
    loader: ConcurrentLoader,
}

impl ExtensionPipeline {
    /// Creates a pipeline from the loader configuration.
    pub fn new(config: &LoaderConfig) -> Self {
        Self {
            resolver: ActivationResolver::new(config.propagation),
            loader: ConcurrentLoader::new(LoaderSettings::from(config)),
        }
    }

    /// Builds the graph and resolves the active set.
    pub fn plan<F>(&self, discovered: Vec<ExtensionDescriptor>, is_configured_on: F) -> Plan
    where
        F: Fn(&ExtensionId) -> bool,
    {
        let build = DependencyGraph::build(discovered);
        debug!(
            extensions = ?build.ids().iter().map(ExtensionId::as_str).collect::<Vec<_>>(),
            "Implicit dependency stage - extension list"
        );

        let activation = self.resolver.resolve(&build, is_configured_on);

        let mut errors = build.errors;
        errors.extend(activation.errors);
        for error in &errors {
            warn!(error = %error, "Extension planning problem");
        }

        let discovered: Vec<ExtensionId> =
            build.items.iter().map(|e| e.id().clone()).collect();
        let extensions: Vec<ExtensionDescriptor> = build
            .items
            .into_iter()
            .filter(|e| activation.active.contains(e.id()))
            .collect();

        info!(
            discovered = discovered.len(),
            active = extensions.len(),
            problems = errors.len(),
            "Extension plan resolved"
        );

        Plan {
            extensions,
            graph: build.graph,
            discovered,
            configured: activation.configured,
            active: activation.active,
            errors,
        }
    }

    /// Plans using the `[extensions]` configuration table.
    pub fn plan_with_config(
        &self,
        discovered: Vec<ExtensionDescriptor>,
        config: &ExtensionsConfig,
    ) -> Plan {
        self.plan(discovered, |id| config.is_enabled(id.as_str()))
    }

    /// Publishes the active set, then runs the load pass.
    pub async fn load(&self, plan: Plan, publisher: &ActivePublisher) -> AppResult<LoadReport> {
        publisher.publish(plan.snapshot())?;
        self.loader.run(plan.extensions, &plan.graph).await
    }

    /// Plans and loads in one call.
    pub async fn run(
        &self,
        discovered: Vec<ExtensionDescriptor>,
        config: &ExtensionsConfig,
        publisher: &ActivePublisher,
    ) -> AppResult<(PlanReport, LoadReport)> {
        let plan = self.plan_with_config(discovered, config);
        let report = plan.report();
        let loaded = self.load(plan, publisher).await?;
        Ok((report, loaded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ExtensionManifest;

    fn discovered() -> Vec<ExtensionDescriptor> {
        vec![
            ExtensionDescriptor::without_procedure(ExtensionManifest::new("settings")),
            ExtensionDescriptor::without_procedure(
                ExtensionManifest::new("moonbase").requires(["settings", "spacepack"]),
            ),
            ExtensionDescriptor::without_procedure(ExtensionManifest::new("spacepack")),
            ExtensionDescriptor::without_procedure(
                ExtensionManifest::new("broken").requires(["nowhere"]),
            ),
        ]
    }

    #[test]
    fn test_plan_filters_to_active_extensions() {
        let config = ExtensionsConfig::new().with("moonbase", true).with("broken", true);
        let plan = ExtensionPipeline::default().plan_with_config(discovered(), &config);

        let ids: Vec<&str> = plan.extensions.iter().map(|e| e.id().as_str()).collect();
        assert_eq!(ids, vec!["moonbase", "settings", "spacepack"]);
        assert_eq!(plan.discovered.len(), 4);
        assert_eq!(plan.errors_for(&"broken".into()).count(), 1);
        assert_eq!(plan.graph.len(), 4);
    }

    #[test]
    fn test_plan_is_idempotent() {
        let config = ExtensionsConfig::new().with("moonbase", true);
        let pipeline = ExtensionPipeline::default();
        let first = pipeline.plan_with_config(discovered(), &config).report();
        let second = pipeline.plan_with_config(discovered(), &config).report();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_run_publishes_then_loads() {
        let config = ExtensionsConfig::new().with("moonbase", true);
        let publisher = ActivePublisher::new();
        let (plan, loaded) = ExtensionPipeline::default()
            .run(discovered(), &config, &publisher)
            .await
            .expect("pipeline run");

        assert_eq!(plan.active.len(), 3);
        assert_eq!(loaded.loaded_count(), 3);
        assert!(publisher.is_enabled("spacepack"));
        assert!(!publisher.is_enabled("broken"));
    }
}
