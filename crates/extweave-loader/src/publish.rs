//! Process-wide snapshot of the active extension set.
//!
//! Published once per run, after activation resolution, and immutable from
//! then on. Readers either see nothing or the complete set.

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tracing::info;

use extweave_core::{AppError, AppResult, ExtensionId};

/// Immutable set of the extensions active this run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ActiveSnapshot {
    extensions: BTreeSet<ExtensionId>,
}

impl ActiveSnapshot {
    /// Creates a snapshot.
    pub fn new(extensions: BTreeSet<ExtensionId>) -> Self {
        Self { extensions }
    }

    /// Returns whether the extension is active.
    pub fn contains(&self, id: &str) -> bool {
        self.extensions.contains(id)
    }

    /// Iterates over active ids, sorted.
    pub fn iter(&self) -> impl Iterator<Item = &ExtensionId> {
        self.extensions.iter()
    }

    /// Number of active extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Returns whether no extension is active.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }
}

/// Write-once holder for the active snapshot.
#[derive(Debug, Default)]
pub struct ActivePublisher {
    snapshot: OnceLock<Arc<ActiveSnapshot>>,
}

static GLOBAL_PUBLISHER: ActivePublisher = ActivePublisher::new();

impl ActivePublisher {
    /// Creates an empty publisher.
    pub const fn new() -> Self {
        Self {
            snapshot: OnceLock::new(),
        }
    }

    /// The process-wide publisher.
    pub fn global() -> &'static ActivePublisher {
        &GLOBAL_PUBLISHER
    }

    /// Publishes the snapshot. Fails if one was already published.
    pub fn publish(&self, snapshot: ActiveSnapshot) -> AppResult<Arc<ActiveSnapshot>> {
        let snapshot = Arc::new(snapshot);
        self.snapshot
            .set(snapshot.clone())
            .map_err(|_| AppError::conflict("Active extension set has already been published"))?;

        info!(count = snapshot.len(), "Published active extension set");
        Ok(snapshot)
    }

    /// Returns the published snapshot, if any.
    pub fn get(&self) -> Option<Arc<ActiveSnapshot>> {
        self.snapshot.get().cloned()
    }

    /// Returns whether the extension is in the published snapshot.
    pub fn is_enabled(&self, id: &str) -> bool {
        self.snapshot
            .get()
            .map(|snapshot| snapshot.contains(id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_is_write_once() {
        let publisher = ActivePublisher::new();
        assert!(publisher.get().is_none());
        assert!(!publisher.is_enabled("a"));

        let first = ActiveSnapshot::new(["a".into(), "b".into()].into_iter().collect());
        publisher.publish(first.clone()).expect("first publish");
        assert!(publisher.is_enabled("a"));

        let err = publisher
            .publish(ActiveSnapshot::default())
            .expect_err("second publish must fail");
        assert_eq!(err.kind, extweave_core::error::ErrorKind::Conflict);
        assert_eq!(publisher.get().as_deref(), Some(&first));
    }
}
