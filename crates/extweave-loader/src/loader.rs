//! Concurrent loader. Runs every active extension's load procedure exactly
//! once, after its dependencies have settled, with no precomputed order.
//!
//! Each extension gets its own task. A task waits on the completion ledger
//! for each of its dependencies, runs the procedure, then settles itself,
//! which wakes whoever is waiting on it. Independent branches of the graph
//! load fully concurrently; only real dependency chains serialize.
//!
//! Failure policy:
//! - An isolated failure settles the extension as `Failed`. Extensions that
//!   require it settle as `Skipped` without running, and so on down the
//!   chain. Nothing is left waiting.
//! - A critical failure (or a panicking procedure) aborts the whole pass.
//! - Suggested dependencies are waited on but their outcome is ignored.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use extweave_core::config::loader::LoaderConfig;
use extweave_core::error::ErrorKind;
use extweave_core::{AppError, AppResult, ExtensionId};

use crate::graph::DependencyGraph;
use crate::ledger::CompletionLedger;
use crate::manifest::ExtensionDescriptor;
use crate::procedure::{LoadChannel, LoadFailure};

/// How an extension settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The load procedure completed.
    Loaded,
    /// The load procedure failed on an isolated channel.
    Failed {
        /// Failure reason.
        reason: String,
    },
    /// Not run because a required dependency did not load.
    Skipped {
        /// First required dependency that did not load.
        dependency: ExtensionId,
    },
}

impl LoadOutcome {
    /// Returns whether the extension loaded.
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }
}

/// Per-extension results of a load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Extension id → outcome.
    pub outcomes: BTreeMap<ExtensionId, LoadOutcome>,
    /// Settlement order.
    pub order: Vec<ExtensionId>,
}

impl LoadReport {
    /// Outcome of a single extension.
    pub fn outcome(&self, id: &ExtensionId) -> Option<&LoadOutcome> {
        self.outcomes.get(id)
    }

    /// Number of extensions that loaded.
    pub fn loaded_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_loaded()).count()
    }

    /// Number of extensions whose procedure failed.
    pub fn failed_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, LoadOutcome::Failed { .. }))
            .count()
    }

    /// Number of extensions skipped because of a dependency.
    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, LoadOutcome::Skipped { .. }))
            .count()
    }

    /// Position of an extension in settlement order.
    pub fn position(&self, id: &ExtensionId) -> Option<usize> {
        self.order.iter().position(|settled| settled == id)
    }
}

/// Load pass settings.
#[derive(Debug, Clone)]
pub struct LoaderSettings {
    /// Deadline for a single load procedure.
    pub load_timeout: Option<Duration>,
    /// Completion broadcast capacity.
    pub event_buffer: usize,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self::from(&LoaderConfig::default())
    }
}

impl From<&LoaderConfig> for LoaderSettings {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            load_timeout: config.load_timeout(),
            event_buffer: config.event_buffer,
        }
    }
}

/// Runs the load pass.
#[derive(Debug, Clone, Default)]
pub struct ConcurrentLoader {
    settings: LoaderSettings,
}

impl ConcurrentLoader {
    /// Creates a loader.
    pub fn new(settings: LoaderSettings) -> Self {
        Self { settings }
    }

    /// Loads every given extension, honouring the dependency graph.
    ///
    /// `extensions` must be closed under required dependencies (every
    /// required dependency of a given extension is given too); otherwise the
    /// pass is rejected before anything runs.
    pub async fn run(
        &self,
        extensions: Vec<ExtensionDescriptor>,
        graph: &DependencyGraph,
    ) -> AppResult<LoadReport> {
        let active: BTreeSet<ExtensionId> = extensions.iter().map(|e| e.id().clone()).collect();
        if active.len() != extensions.len() {
            return Err(AppError::validation(
                "Load pass received the same extension more than once",
            ));
        }

        let mut jobs = Vec::with_capacity(extensions.len());
        for extension in extensions {
            let id = extension.id();
            let required: Vec<ExtensionId> = graph
                .dependencies(id)
                .ok_or_else(|| {
                    AppError::validation(format!(
                        "Extension '{id}' is not part of the dependency graph"
                    ))
                })?
                .iter()
                .cloned()
                .collect();

            if let Some(missing) = required.iter().find(|dep| !active.contains(*dep)) {
                return Err(AppError::validation(format!(
                    "Extension '{id}' requires '{missing}', which is not part of the load pass"
                )));
            }

            let suggested: Vec<ExtensionId> = graph
                .soft_dependencies(id)
                .into_iter()
                .flatten()
                .filter(|dep| active.contains(*dep))
                .cloned()
                .collect();

            jobs.push(LoadJob {
                extension,
                required,
                suggested,
            });
        }

        info!(count = jobs.len(), "Loading all extensions");

        let ledger = Arc::new(CompletionLedger::new(self.settings.event_buffer));
        let mut tasks = JoinSet::new();
        let mut task_owners = HashMap::new();

        for job in jobs {
            let owner = job.extension.id().clone();
            let handle = tasks.spawn(job.run(ledger.clone(), self.settings.load_timeout));
            task_owners.insert(handle.id(), owner);
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(join_error) => {
                    tasks.abort_all();
                    let owner = task_owners
                        .get(&join_error.id())
                        .map(ExtensionId::to_string)
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(extension_id = %owner, error = %join_error, "Load task panicked");
                    return Err(AppError::plugin(format!(
                        "Extension '{owner}' aborted the load pass: {join_error}"
                    )));
                }
            }
        }

        let mut report = LoadReport::default();
        for (id, outcome) in ledger.settled().await {
            report.order.push(id.clone());
            report.outcomes.insert(id, outcome);
        }

        info!(
            loaded = report.loaded_count(),
            failed = report.failed_count(),
            skipped = report.skipped_count(),
            "Loaded {} extensions",
            report.loaded_count()
        );

        Ok(report)
    }
}

/// One extension's share of the load pass.
struct LoadJob {
    extension: ExtensionDescriptor,
    required: Vec<ExtensionId>,
    suggested: Vec<ExtensionId>,
}

impl LoadJob {
    async fn run(self, ledger: Arc<CompletionLedger>, timeout: Option<Duration>) -> AppResult<()> {
        let id = self.extension.id().clone();

        let waiting = self.required.len() + self.suggested.len();
        if waiting > 0 {
            debug!(extension_id = %id, dependencies = waiting, "Waiting on dependencies");
        }

        let (required, _) = tokio::join!(
            join_all(self.required.iter().map(|dep| ledger.wait_for(dep))),
            join_all(self.suggested.iter().map(|dep| ledger.wait_for(dep))),
        );

        let blocked = self
            .required
            .iter()
            .zip(required)
            .find(|(_, outcome)| !outcome.is_loaded())
            .map(|(dep, _)| dep.clone());

        if let Some(dependency) = blocked {
            warn!(
                extension_id = %id,
                dependency = %dependency,
                "Skipping extension because a required dependency did not load"
            );
            ledger.settle(id, LoadOutcome::Skipped { dependency }).await;
            return Ok(());
        }

        debug!(extension_id = %id, "Loading extension");
        let procedure = self.extension.procedure();
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, procedure.load(&id)).await {
                Ok(result) => result,
                Err(_) => Err(LoadFailure::isolated(format!(
                    "load procedure timed out after {limit:?}"
                ))),
            },
            None => procedure.load(&id).await,
        };

        match result {
            Ok(()) => {
                ledger.settle(id.clone(), LoadOutcome::Loaded).await;
                debug!(extension_id = %id, "Loaded extension");
                Ok(())
            }
            Err(failure) => {
                error!(
                    extension_id = %id,
                    channel = %failure.channel,
                    error = %failure.message,
                    "Failed to load extension"
                );
                ledger
                    .settle(
                        id.clone(),
                        LoadOutcome::Failed {
                            reason: failure.message.clone(),
                        },
                    )
                    .await;

                match failure.channel {
                    LoadChannel::Isolated => Ok(()),
                    LoadChannel::Critical => Err(AppError::with_source(
                        ErrorKind::Plugin,
                        format!("Extension '{id}' aborted the load pass: {}", failure.message),
                        failure,
                    )),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::manifest::ExtensionManifest;
    use crate::procedure::ClosureProcedure;

    fn recording(
        name: &str,
        log: &Arc<Mutex<Vec<String>>>,
        manifest: ExtensionManifest,
    ) -> ExtensionDescriptor {
        let log = log.clone();
        let procedure = ClosureProcedure::new(name, move |id: ExtensionId| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("start:{id}"));
                tokio::task::yield_now().await;
                log.lock().unwrap().push(format!("end:{id}"));
                Ok(())
            }
        });
        ExtensionDescriptor::new(manifest, procedure.shared())
    }

    fn position(log: &[String], entry: &str) -> usize {
        log.iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("missing log entry {entry}"))
    }

    #[tokio::test]
    async fn test_dependencies_finish_before_dependents_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manifests = vec![
            ExtensionManifest::new("a"),
            ExtensionManifest::new("b").requires(["a"]),
            ExtensionManifest::new("c").requires(["b", "a"]),
        ];
        let build = DependencyGraph::build(manifests.clone());
        let extensions: Vec<ExtensionDescriptor> = manifests
            .into_iter()
            .rev()
            .map(|m| recording("rec", &log, m))
            .collect();

        let report = ConcurrentLoader::default()
            .run(extensions, &build.graph)
            .await
            .expect("load pass");

        let log = log.lock().unwrap().clone();
        assert!(position(&log, "end:a") < position(&log, "start:b"));
        assert!(position(&log, "end:b") < position(&log, "start:c"));
        assert_eq!(report.loaded_count(), 3);
        assert_eq!(report.order, vec![ExtensionId::from("a"), "b".into(), "c".into()]);
    }

    #[tokio::test]
    async fn test_isolated_failure_skips_dependents_only() {
        let manifests = vec![
            ExtensionManifest::new("base"),
            ExtensionManifest::new("mid").requires(["base"]),
            ExtensionManifest::new("leaf").requires(["mid"]),
            ExtensionManifest::new("side"),
        ];
        let build = DependencyGraph::build(manifests.clone());
        let extensions = manifests
            .into_iter()
            .map(|m| {
                if m.id.as_str() == "base" {
                    ExtensionDescriptor::new(
                        m,
                        ClosureProcedure::new("fail", |_| async {
                            Err(LoadFailure::isolated("bad bytes"))
                        })
                        .shared(),
                    )
                } else {
                    ExtensionDescriptor::without_procedure(m)
                }
            })
            .collect();

        let report = ConcurrentLoader::default()
            .run(extensions, &build.graph)
            .await
            .expect("isolated failures do not abort");

        assert_eq!(
            report.outcome(&"base".into()),
            Some(&LoadOutcome::Failed {
                reason: "bad bytes".to_string()
            })
        );
        assert_eq!(
            report.outcome(&"mid".into()),
            Some(&LoadOutcome::Skipped {
                dependency: "base".into()
            })
        );
        assert_eq!(
            report.outcome(&"leaf".into()),
            Some(&LoadOutcome::Skipped {
                dependency: "mid".into()
            })
        );
        assert_eq!(report.outcome(&"side".into()), Some(&LoadOutcome::Loaded));
    }

    #[tokio::test]
    async fn test_critical_failure_aborts_pass() {
        let manifests = vec![
            ExtensionManifest::new("web"),
            ExtensionManifest::new("after").requires(["web"]),
        ];
        let build = DependencyGraph::build(manifests.clone());
        let extensions = manifests
            .into_iter()
            .map(|m| {
                ExtensionDescriptor::new(
                    m,
                    ClosureProcedure::new("critical", |id: ExtensionId| async move {
                        if id.as_str() == "web" {
                            Err(LoadFailure::critical("syntax error"))
                        } else {
                            Ok(())
                        }
                    })
                    .shared(),
                )
            })
            .collect();

        let err = ConcurrentLoader::default()
            .run(extensions, &build.graph)
            .await
            .expect_err("critical failure aborts");
        assert_eq!(err.kind, ErrorKind::Plugin);
        assert!(err.message.contains("web"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_isolated_failure() {
        let manifests = vec![
            ExtensionManifest::new("slow"),
            ExtensionManifest::new("dep").requires(["slow"]),
        ];
        let build = DependencyGraph::build(manifests.clone());
        let extensions = manifests
            .into_iter()
            .map(|m| {
                ExtensionDescriptor::new(
                    m,
                    ClosureProcedure::new("sleepy", |id: ExtensionId| async move {
                        if id.as_str() == "slow" {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                        }
                        Ok(())
                    })
                    .shared(),
                )
            })
            .collect();

        let loader = ConcurrentLoader::new(LoaderSettings {
            load_timeout: Some(Duration::from_secs(1)),
            event_buffer: 8,
        });
        let report = loader.run(extensions, &build.graph).await.expect("load pass");

        assert!(matches!(
            report.outcome(&"slow".into()),
            Some(LoadOutcome::Failed { .. })
        ));
        assert!(matches!(
            report.outcome(&"dep".into()),
            Some(LoadOutcome::Skipped { .. })
        ));
    }

    #[tokio::test]
    async fn test_rejects_extension_whose_dependency_is_absent() {
        let manifests = vec![
            ExtensionManifest::new("a"),
            ExtensionManifest::new("b").requires(["a"]),
        ];
        let build = DependencyGraph::build(manifests.clone());
        let only_b = vec![ExtensionDescriptor::without_procedure(manifests[1].clone())];

        let err = ConcurrentLoader::default()
            .run(only_b, &build.graph)
            .await
            .expect_err("b cannot load without a");
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_suggested_dependency_orders_but_does_not_block() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manifests = vec![
            ExtensionManifest::new("theme"),
            ExtensionManifest::new("ui").suggests(["theme"]),
        ];
        let build = DependencyGraph::build(manifests.clone());
        let extensions: Vec<ExtensionDescriptor> = manifests
            .into_iter()
            .rev()
            .map(|m| {
                if m.id.as_str() == "theme" {
                    let log = log.clone();
                    ExtensionDescriptor::new(
                        m,
                        ClosureProcedure::new("theme", move |_| {
                            let log = log.clone();
                            async move {
                                log.lock().unwrap().push("theme".to_string());
                                Err(LoadFailure::isolated("no theme"))
                            }
                        })
                        .shared(),
                    )
                } else {
                    recording("ui", &log, m)
                }
            })
            .collect();

        let report = ConcurrentLoader::default()
            .run(extensions, &build.graph)
            .await
            .expect("load pass");

        let log = log.lock().unwrap().clone();
        assert!(position(&log, "theme") < position(&log, "start:ui"));
        assert_eq!(report.outcome(&"ui".into()), Some(&LoadOutcome::Loaded));
    }
}
