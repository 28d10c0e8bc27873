//! Planning diagnostics.
//!
//! Everything that can go wrong before the load pass starts. None of these
//! abort the run; each one removes one or more extensions from the active
//! set and is reported with enough ids to reconstruct the chain.

use serde::Serialize;
use thiserror::Error;

use extweave_core::ExtensionId;

/// A graph-construction or activation problem.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PlanError {
    /// The same id was discovered more than once. The first copy is kept.
    #[error("extension '{id}' was discovered more than once; keeping the first copy")]
    DuplicateExtension {
        /// Duplicated id.
        id: ExtensionId,
    },

    /// A required dependency does not correspond to any discovered extension.
    #[error("extension '{id}' requires '{dependency}', which was not discovered")]
    MissingDependency {
        /// Requesting extension.
        id: ExtensionId,
        /// Unresolved dependency.
        dependency: ExtensionId,
    },

    /// A required dependency exists but can never be activated.
    #[error("extension '{id}' requires '{dependency}', which cannot be activated")]
    UnavailableDependency {
        /// Requesting extension.
        id: ExtensionId,
        /// Ineligible dependency.
        dependency: ExtensionId,
    },

    /// Two active extensions exclude each other. The later id is dropped.
    #[error("extension '{dropped}' is incompatible with '{kept}' and was deactivated")]
    Incompatible {
        /// Extension that stays active.
        kept: ExtensionId,
        /// Extension that was deactivated.
        dropped: ExtensionId,
    },

    /// A required-dependency cycle. None of the members can be activated.
    #[error("dependency cycle detected: {}", display_path(.path))]
    Cycle {
        /// Every extension in the strongly connected component, sorted.
        members: Vec<ExtensionId>,
        /// One concrete cycle, starting and ending at the same id.
        path: Vec<ExtensionId>,
    },
}

impl PlanError {
    /// Returns whether the diagnostic names the given extension.
    pub fn involves(&self, id: &ExtensionId) -> bool {
        match self {
            Self::DuplicateExtension { id: own } => own == id,
            Self::MissingDependency { id: own, dependency }
            | Self::UnavailableDependency { id: own, dependency } => {
                own == id || dependency == id
            }
            Self::Incompatible { kept, dropped } => kept == id || dropped == id,
            Self::Cycle { members, .. } => members.contains(id),
        }
    }
}

fn display_path(path: &[ExtensionId]) -> String {
    path.iter()
        .map(ExtensionId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_shows_path() {
        let err = PlanError::Cycle {
            members: vec!["p".into(), "q".into()],
            path: vec!["p".into(), "q".into(), "p".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle detected: p -> q -> p");
        assert!(err.involves(&"q".into()));
        assert!(!err.involves(&"r".into()));
    }

    #[test]
    fn test_serialized_kind_tag() {
        let err = PlanError::MissingDependency {
            id: "x".into(),
            dependency: "y".into(),
        };
        let json = serde_json::to_value(&err).expect("serialize");
        assert_eq!(json["kind"], "missing_dependency");
        assert_eq!(json["dependency"], "y");
    }
}
