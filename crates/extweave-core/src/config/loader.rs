//! Activation and load pass configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How implicit activation spreads through the dependency graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationPolicy {
    /// Only extensions required (transitively) by an active extension are
    /// force-activated.
    #[default]
    ActiveDependents,
    /// Any extension required by any known extension is force-activated,
    /// whether or not the requiring extension is itself active.
    AnyDependent,
}

/// Load pass configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Per-extension deadline for the load procedure, in seconds.
    /// `None` waits indefinitely.
    #[serde(default)]
    pub load_timeout_seconds: Option<u64>,
    /// Implicit activation policy.
    #[serde(default)]
    pub propagation: PropagationPolicy,
    /// Capacity of the completion broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl LoaderConfig {
    /// Returns the load deadline as a [`Duration`], if configured.
    pub fn load_timeout(&self) -> Option<Duration> {
        self.load_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            load_timeout_seconds: None,
            propagation: PropagationPolicy::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_event_buffer() -> usize {
    256
}
