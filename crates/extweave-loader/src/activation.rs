//! Activation resolution.
//!
//! Combines explicit configuration with implicit activation through the
//! dependency graph, then settles incompatibilities.
//!
//! Propagation is a worklist fixed point: seed with every eligible
//! explicitly-enabled extension, pop an id, mark it active and push its
//! required dependencies, until the worklist is empty. Incompatibilities are
//! settled by dropping the later-sorted extension of the first conflicting
//! pair and resolving again from scratch, so the result never keeps an
//! extension that only a dropped extension needed.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, warn};

use extweave_core::ExtensionId;
use extweave_core::config::loader::PropagationPolicy;

use crate::diagnostics::PlanError;
use crate::graph::{DependencyGraph, GraphBuild};
use crate::manifest::ExtensionManifest;

/// Result of activation resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Activation {
    /// Extensions that will be loaded this run.
    pub active: BTreeSet<ExtensionId>,
    /// Extensions switched on by configuration (eligible or not).
    pub configured: BTreeSet<ExtensionId>,
    /// Extensions that can never be activated this run.
    pub ineligible: BTreeSet<ExtensionId>,
    /// Diagnostics raised while resolving (incompatibilities and their fallout).
    pub errors: Vec<PlanError>,
}

impl Activation {
    /// Active extensions that were not switched on by configuration.
    pub fn implicit(&self) -> impl Iterator<Item = &ExtensionId> {
        self.active.iter().filter(|id| !self.configured.contains(*id))
    }
}

/// Decides the active set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationResolver {
    policy: PropagationPolicy,
}

impl ActivationResolver {
    /// Creates a resolver with the given propagation policy.
    pub fn new(policy: PropagationPolicy) -> Self {
        Self { policy }
    }

    /// Resolves the active set.
    ///
    /// `is_configured_on` is consulted exactly once per discovered extension.
    pub fn resolve<T, F>(&self, build: &GraphBuild<T>, is_configured_on: F) -> Activation
    where
        T: AsRef<ExtensionManifest>,
        F: Fn(&ExtensionId) -> bool,
    {
        let configured: BTreeSet<ExtensionId> = build
            .items
            .iter()
            .map(|item| &item.as_ref().id)
            .filter(|id| is_configured_on(*id))
            .cloned()
            .collect();

        let incompatible = declared_incompatibilities(build);
        let mut ineligible = build.ineligible.clone();
        let mut errors = Vec::new();

        loop {
            let active = self.propagate(&build.graph, &configured, &ineligible);

            let Some((kept, dropped)) = first_conflict(&active, &incompatible) else {
                for id in active.iter().filter(|id| !configured.contains(*id)) {
                    debug!(extension_id = %id, "Implicitly enabling extension");
                }
                return Activation {
                    active,
                    configured,
                    ineligible,
                    errors,
                };
            };

            warn!(
                kept = %kept,
                dropped = %dropped,
                "Incompatible extensions are both active; deactivating the later one"
            );
            errors.push(PlanError::Incompatible {
                kept,
                dropped: dropped.clone(),
            });
            ineligible.insert(dropped);
            build
                .graph
                .propagate_ineligibility(&mut ineligible, &mut errors);
        }
    }

    fn propagate(
        &self,
        graph: &DependencyGraph,
        configured: &BTreeSet<ExtensionId>,
        ineligible: &BTreeSet<ExtensionId>,
    ) -> BTreeSet<ExtensionId> {
        let eligible = |id: &ExtensionId| graph.contains(id) && !ineligible.contains(id);

        let mut worklist: Vec<&ExtensionId> =
            configured.iter().filter(|id| eligible(*id)).collect();

        if self.policy == PropagationPolicy::AnyDependent {
            worklist.extend(
                graph
                    .ids()
                    .filter(|id| eligible(*id) && graph.is_required_by_any(id)),
            );
        }

        let mut active = BTreeSet::new();
        while let Some(id) = worklist.pop() {
            if active.contains(id) {
                continue;
            }
            active.insert(id.clone());

            if let Some(deps) = graph.dependencies(id) {
                worklist.extend(
                    deps.iter()
                        .filter(|dep| !active.contains(*dep) && eligible(*dep)),
                );
            }
        }

        active
    }
}

/// Symmetric incompatibility relation restricted to discovered extensions.
fn declared_incompatibilities<T: AsRef<ExtensionManifest>>(
    build: &GraphBuild<T>,
) -> HashMap<ExtensionId, BTreeSet<ExtensionId>> {
    let mut relation: HashMap<ExtensionId, BTreeSet<ExtensionId>> = HashMap::new();

    for item in &build.items {
        let manifest = item.as_ref();
        for other in &manifest.incompatible {
            if other == &manifest.id || !build.graph.contains(other) {
                continue;
            }
            relation
                .entry(manifest.id.clone())
                .or_default()
                .insert(other.clone());
            relation
                .entry(other.clone())
                .or_default()
                .insert(manifest.id.clone());
        }
    }

    relation
}

/// First conflicting pair `(a, b)` with `a < b`, both active.
fn first_conflict(
    active: &BTreeSet<ExtensionId>,
    incompatible: &HashMap<ExtensionId, BTreeSet<ExtensionId>>,
) -> Option<(ExtensionId, ExtensionId)> {
    active.iter().find_map(|a| {
        incompatible
            .get(a)?
            .iter()
            .find(|b| *b > a && active.contains(*b))
            .map(|b| (a.clone(), b.clone()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(values: &[&str]) -> BTreeSet<ExtensionId> {
        values.iter().map(|v| ExtensionId::from(*v)).collect()
    }

    fn on(values: &'static [&'static str]) -> impl Fn(&ExtensionId) -> bool {
        move |id: &ExtensionId| values.contains(&id.as_str())
    }

    #[test]
    fn test_transitive_propagation() {
        let build = DependencyGraph::build(vec![
            ExtensionManifest::new("a"),
            ExtensionManifest::new("b").requires(["a"]),
            ExtensionManifest::new("c").requires(["b"]),
        ]);
        let activation = ActivationResolver::default().resolve(&build, on(&["c"]));
        assert_eq!(activation.active, set(&["a", "b", "c"]));
        assert_eq!(activation.implicit().count(), 2);
        assert!(activation.errors.is_empty());
    }

    #[test]
    fn test_dependency_of_disabled_extension_stays_off() {
        let build = DependencyGraph::build(vec![
            ExtensionManifest::new("lib"),
            ExtensionManifest::new("user").requires(["lib"]),
            ExtensionManifest::new("other"),
        ]);
        let activation = ActivationResolver::default().resolve(&build, on(&["other"]));
        assert_eq!(activation.active, set(&["other"]));
    }

    #[test]
    fn test_any_dependent_policy_keeps_referenced_extensions() {
        let build = DependencyGraph::build(vec![
            ExtensionManifest::new("lib"),
            ExtensionManifest::new("user").requires(["lib"]),
            ExtensionManifest::new("other"),
        ]);
        let activation = ActivationResolver::new(PropagationPolicy::AnyDependent)
            .resolve(&build, on(&["other"]));
        assert_eq!(activation.active, set(&["lib", "other"]));
    }

    #[test]
    fn test_incompatible_pair_keeps_earlier_id() {
        let build = DependencyGraph::build(vec![
            ExtensionManifest::new("n").incompatible_with(["m"]),
            ExtensionManifest::new("m").incompatible_with(["n"]),
        ]);
        let activation = ActivationResolver::default().resolve(&build, on(&["m", "n"]));
        assert_eq!(activation.active, set(&["m"]));
        assert_eq!(
            activation.errors,
            vec![PlanError::Incompatible {
                kept: "m".into(),
                dropped: "n".into(),
            }]
        );
    }

    #[test]
    fn test_one_sided_incompatibility_counts() {
        let build = DependencyGraph::build(vec![
            ExtensionManifest::new("a"),
            ExtensionManifest::new("b").incompatible_with(["a"]),
        ]);
        let activation = ActivationResolver::default().resolve(&build, on(&["a", "b"]));
        assert_eq!(activation.active, set(&["a"]));
    }

    #[test]
    fn test_dropping_incompatible_extension_drops_its_dependents_and_their_needs() {
        let build = DependencyGraph::build(vec![
            ExtensionManifest::new("a").incompatible_with(["b"]),
            ExtensionManifest::new("b").requires(["helper"]),
            ExtensionManifest::new("helper"),
            ExtensionManifest::new("top").requires(["b"]),
        ]);
        let activation = ActivationResolver::default().resolve(&build, on(&["a", "top"]));

        assert_eq!(activation.active, set(&["a"]));
        assert!(activation.ineligible.contains(&ExtensionId::from("top")));
        assert_eq!(
            activation.errors,
            vec![
                PlanError::Incompatible {
                    kept: "a".into(),
                    dropped: "b".into(),
                },
                PlanError::UnavailableDependency {
                    id: "top".into(),
                    dependency: "b".into(),
                },
            ]
        );
    }

    #[test]
    fn test_ineligible_configured_extension_is_not_activated() {
        let build = DependencyGraph::build(vec![ExtensionManifest::new("x").requires(["y"])]);
        let activation = ActivationResolver::default().resolve(&build, on(&["x"]));
        assert!(activation.active.is_empty());
        assert!(activation.configured.contains(&ExtensionId::from("x")));
    }
}
