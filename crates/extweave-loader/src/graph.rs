//! Dependency graph construction.
//!
//! Builds the resolved required-dependency graph from the discovered
//! extensions, rejects unresolvable dependencies and cycles, and records
//! which extensions remain eligible for activation.
//!
//! Eligibility is closed under "requires": an extension whose required
//! dependency is ineligible is ineligible itself, so the load pass can never
//! wait on a dependency that is not going to load.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use serde::Serialize;
use tracing::{debug, warn};

use extweave_core::ExtensionId;

use crate::diagnostics::PlanError;
use crate::manifest::ExtensionManifest;

/// Resolved dependency edges between discovered extensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyGraph {
    /// Extension id → resolved required dependencies.
    edges: BTreeMap<ExtensionId, BTreeSet<ExtensionId>>,
    /// Extension id → accepted suggested dependencies (ordering only).
    soft_edges: BTreeMap<ExtensionId, BTreeSet<ExtensionId>>,
}

impl DependencyGraph {
    /// Builds the graph from discovered items.
    ///
    /// Items are sorted by id first; when an id was discovered more than
    /// once the first copy wins and the rest are reported and dropped.
    pub fn build<T: AsRef<ExtensionManifest>>(items: Vec<T>) -> GraphBuild<T> {
        let mut errors = Vec::new();

        let mut items = items;
        items.sort_by(|a, b| a.as_ref().id.cmp(&b.as_ref().id));

        let mut ordered: Vec<T> = Vec::with_capacity(items.len());
        for item in items {
            let duplicate = ordered
                .last()
                .map(|last| last.as_ref().id == item.as_ref().id)
                .unwrap_or(false);
            if duplicate {
                warn!(extension_id = %item.as_ref().id, "Dropping duplicate extension");
                errors.push(PlanError::DuplicateExtension {
                    id: item.as_ref().id.clone(),
                });
            } else {
                ordered.push(item);
            }
        }

        let discovered: BTreeSet<ExtensionId> =
            ordered.iter().map(|item| item.as_ref().id.clone()).collect();

        let mut graph = DependencyGraph::default();
        let mut ineligible = BTreeSet::new();

        for item in &ordered {
            let manifest = item.as_ref();
            let mut resolved = BTreeSet::new();

            for dependency in &manifest.dependencies {
                if discovered.contains(dependency) {
                    resolved.insert(dependency.clone());
                } else {
                    warn!(
                        extension_id = %manifest.id,
                        dependency = %dependency,
                        "Required dependency was not discovered"
                    );
                    errors.push(PlanError::MissingDependency {
                        id: manifest.id.clone(),
                        dependency: dependency.clone(),
                    });
                    ineligible.insert(manifest.id.clone());
                }
            }

            graph.edges.insert(manifest.id.clone(), resolved);
            graph.soft_edges.insert(manifest.id.clone(), BTreeSet::new());
        }

        for component in graph.cyclic_components() {
            let path = graph.cycle_path(&component);
            warn!(
                members = ?component.iter().map(ExtensionId::as_str).collect::<Vec<_>>(),
                "Dependency cycle detected"
            );
            ineligible.extend(component.iter().cloned());
            errors.push(PlanError::Cycle {
                members: component.into_iter().collect(),
                path,
            });
        }

        graph.propagate_ineligibility(&mut ineligible, &mut errors);

        for item in &ordered {
            let manifest = item.as_ref();
            for suggested in &manifest.suggested {
                graph.accept_soft_edge(&manifest.id, suggested, &discovered);
            }
        }

        GraphBuild {
            items: ordered,
            graph,
            ineligible,
            errors,
        }
    }

    /// Returns the resolved required dependencies of an extension.
    pub fn dependencies(&self, id: &ExtensionId) -> Option<&BTreeSet<ExtensionId>> {
        self.edges.get(id)
    }

    /// Returns the accepted suggested dependencies of an extension.
    pub fn soft_dependencies(&self, id: &ExtensionId) -> Option<&BTreeSet<ExtensionId>> {
        self.soft_edges.get(id)
    }

    /// Returns whether the graph has an entry for the extension.
    pub fn contains(&self, id: &ExtensionId) -> bool {
        self.edges.contains_key(id)
    }

    /// Iterates over every extension id in the graph, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &ExtensionId> {
        self.edges.keys()
    }

    /// Number of extensions in the graph.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Returns whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Iterates over the extensions that require `id`.
    pub fn dependents_of<'a>(
        &'a self,
        id: &'a ExtensionId,
    ) -> impl Iterator<Item = &'a ExtensionId> + 'a {
        self.edges
            .iter()
            .filter(move |(_, deps)| deps.contains(id))
            .map(|(owner, _)| owner)
    }

    /// Returns whether any extension in the graph requires `id`.
    pub fn is_required_by_any(&self, id: &ExtensionId) -> bool {
        self.dependents_of(id).next().is_some()
    }

    /// Every extension reachable from `id` through required edges.
    pub fn transitive_dependencies(&self, id: &ExtensionId) -> BTreeSet<ExtensionId> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<&ExtensionId> = self
            .dependencies(id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default();

        while let Some(next) = stack.pop() {
            if seen.insert(next.clone()) {
                if let Some(deps) = self.dependencies(next) {
                    stack.extend(deps.iter());
                }
            }
        }

        seen
    }

    /// Marks every extension that requires an ineligible extension as
    /// ineligible, until nothing changes.
    pub fn propagate_ineligibility(
        &self,
        ineligible: &mut BTreeSet<ExtensionId>,
        errors: &mut Vec<PlanError>,
    ) {
        loop {
            let mut changed = false;

            for (id, deps) in &self.edges {
                if ineligible.contains(id) {
                    continue;
                }
                if let Some(dependency) = deps.iter().find(|dep| ineligible.contains(*dep)) {
                    debug!(
                        extension_id = %id,
                        dependency = %dependency,
                        "Extension depends on an ineligible extension"
                    );
                    errors.push(PlanError::UnavailableDependency {
                        id: id.clone(),
                        dependency: dependency.clone(),
                    });
                    ineligible.insert(id.clone());
                    changed = true;
                }
            }

            if !changed {
                break;
            }
        }
    }

    /// Strongly connected components that contain a cycle (more than one
    /// member, or a self-edge), each sorted, in order of their first member.
    fn cyclic_components(&self) -> Vec<BTreeSet<ExtensionId>> {
        let mut tarjan = Tarjan::new(&self.edges);
        for id in self.edges.keys() {
            if !tarjan.index.contains_key(id) {
                tarjan.visit(id);
            }
        }

        let mut components: Vec<BTreeSet<ExtensionId>> = tarjan
            .components
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component.iter().any(|id| {
                        self.edges
                            .get(id)
                            .map(|deps| deps.contains(id))
                            .unwrap_or(false)
                    })
            })
            .map(|component| component.into_iter().collect())
            .collect();

        components.sort();
        components
    }

    /// One concrete cycle through the smallest member of `component`,
    /// found breadth-first so the reported path is a shortest one.
    fn cycle_path(&self, component: &BTreeSet<ExtensionId>) -> Vec<ExtensionId> {
        let Some(start) = component.iter().next() else {
            return Vec::new();
        };

        let mut parent: HashMap<&ExtensionId, &ExtensionId> = HashMap::new();
        let mut queue: VecDeque<&ExtensionId> = VecDeque::from([start]);

        while let Some(current) = queue.pop_front() {
            let Some(deps) = self.edges.get(current) else {
                continue;
            };
            for dep in deps.iter().filter(|dep| component.contains(*dep)) {
                if dep == start {
                    let mut path = vec![start.clone()];
                    let mut cursor = current;
                    let mut reversed = Vec::new();
                    while cursor != start {
                        reversed.push(cursor.clone());
                        cursor = parent[cursor];
                    }
                    path.extend(reversed.into_iter().rev());
                    path.push(start.clone());
                    return path;
                }
                if !parent.contains_key(dep) {
                    parent.insert(dep, current);
                    queue.push_back(dep);
                }
            }
        }

        vec![start.clone(), start.clone()]
    }

    /// Accepts `owner` → `target` as a soft edge when the target exists and
    /// the edge cannot close a cycle with the edges already present.
    fn accept_soft_edge(
        &mut self,
        owner: &ExtensionId,
        target: &ExtensionId,
        discovered: &BTreeSet<ExtensionId>,
    ) {
        if owner == target || !discovered.contains(target) {
            return;
        }
        if self
            .edges
            .get(owner)
            .map(|deps| deps.contains(target))
            .unwrap_or(false)
        {
            return;
        }
        if self.reaches(target, owner) {
            debug!(
                extension_id = %owner,
                suggested = %target,
                "Ignoring suggested dependency that would form a cycle"
            );
            return;
        }
        self.soft_edges
            .entry(owner.clone())
            .or_default()
            .insert(target.clone());
    }

    /// Whether `to` is reachable from `from` through required and soft edges.
    fn reaches(&self, from: &ExtensionId, to: &ExtensionId) -> bool {
        let mut seen: BTreeSet<&ExtensionId> = BTreeSet::new();
        let mut stack = vec![from];

        while let Some(current) = stack.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            let hard = self.edges.get(current).into_iter().flatten();
            let soft = self.soft_edges.get(current).into_iter().flatten();
            stack.extend(hard.chain(soft));
        }

        false
    }
}

/// Tarjan's strongly connected components over the required edges.
struct Tarjan<'a> {
    edges: &'a BTreeMap<ExtensionId, BTreeSet<ExtensionId>>,
    next_index: usize,
    index: HashMap<&'a ExtensionId, usize>,
    lowlink: HashMap<&'a ExtensionId, usize>,
    stack: Vec<&'a ExtensionId>,
    on_stack: BTreeSet<&'a ExtensionId>,
    components: Vec<Vec<ExtensionId>>,
}

impl<'a> Tarjan<'a> {
    fn new(edges: &'a BTreeMap<ExtensionId, BTreeSet<ExtensionId>>) -> Self {
        Self {
            edges,
            next_index: 0,
            index: HashMap::new(),
            lowlink: HashMap::new(),
            stack: Vec::new(),
            on_stack: BTreeSet::new(),
            components: Vec::new(),
        }
    }

    fn visit(&mut self, id: &'a ExtensionId) {
        self.index.insert(id, self.next_index);
        self.lowlink.insert(id, self.next_index);
        self.next_index += 1;
        self.stack.push(id);
        self.on_stack.insert(id);

        let edges = self.edges;
        if let Some(deps) = edges.get(id) {
            for dep in deps {
                if !self.index.contains_key(dep) {
                    self.visit(dep);
                    let low = self.lowlink[id].min(self.lowlink[dep]);
                    self.lowlink.insert(id, low);
                } else if self.on_stack.contains(dep) {
                    let low = self.lowlink[id].min(self.index[dep]);
                    self.lowlink.insert(id, low);
                }
            }
        }

        if self.lowlink[id] == self.index[id] {
            let mut component = Vec::new();
            while let Some(member) = self.stack.pop() {
                self.on_stack.remove(member);
                component.push(member.clone());
                if member == id {
                    break;
                }
            }
            self.components.push(component);
        }
    }
}

/// Output of [`DependencyGraph::build`].
#[derive(Debug, Clone)]
pub struct GraphBuild<T> {
    /// Discovered items, sorted by id and deduplicated.
    pub items: Vec<T>,
    /// Resolved graph over every item.
    pub graph: DependencyGraph,
    /// Items that can never be activated this run.
    pub ineligible: BTreeSet<ExtensionId>,
    /// Diagnostics collected while building.
    pub errors: Vec<PlanError>,
}

impl<T: AsRef<ExtensionManifest>> GraphBuild<T> {
    /// Returns whether the extension may be activated.
    pub fn is_eligible(&self, id: &ExtensionId) -> bool {
        self.graph.contains(id) && !self.ineligible.contains(id)
    }

    /// Sorted ids of every discovered item.
    pub fn ids(&self) -> Vec<ExtensionId> {
        self.items.iter().map(|item| item.as_ref().id.clone()).collect()
    }

    /// Looks up a discovered item by id.
    pub fn fetch(&self, id: &ExtensionId) -> Option<&T> {
        self.items
            .binary_search_by(|item| item.as_ref().id.cmp(id))
            .ok()
            .map(|index| &self.items[index])
    }
}
