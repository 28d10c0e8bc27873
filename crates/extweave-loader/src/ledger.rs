//! Completion ledger: records settled extensions and broadcasts each
//! settlement to waiting load tasks.
//!
//! Waiters subscribe to the broadcast *before* consulting the ledger, and
//! settlement records the outcome and broadcasts it inside the same write
//! section. A dependency settling between the check and the wait therefore
//! can never be missed.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use extweave_core::ExtensionId;

use crate::loader::LoadOutcome;

/// Broadcast when an extension settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    /// Extension that settled.
    pub id: ExtensionId,
    /// How it settled.
    pub outcome: LoadOutcome,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// Extension id → outcome.
    outcomes: HashMap<ExtensionId, LoadOutcome>,
    /// Settlement order.
    order: Vec<ExtensionId>,
}

/// Shared record of settled extensions.
#[derive(Debug)]
pub struct CompletionLedger {
    /// Settled extensions.
    state: RwLock<LedgerState>,
    /// Completion events.
    events: broadcast::Sender<CompletionEvent>,
}

impl CompletionLedger {
    /// Creates an empty ledger whose broadcast channel holds `buffer` events.
    pub fn new(buffer: usize) -> Self {
        let (events, _) = broadcast::channel(buffer.max(1));
        Self {
            state: RwLock::new(LedgerState::default()),
            events,
        }
    }

    /// Returns the outcome of a settled extension.
    pub async fn outcome(&self, id: &ExtensionId) -> Option<LoadOutcome> {
        let state = self.state.read().await;
        state.outcomes.get(id).cloned()
    }

    /// Records an outcome and broadcasts it.
    ///
    /// Returns `false` without broadcasting if the extension had already
    /// settled; the first outcome wins.
    pub async fn settle(&self, id: ExtensionId, outcome: LoadOutcome) -> bool {
        let mut state = self.state.write().await;
        if state.outcomes.contains_key(&id) {
            warn!(extension_id = %id, "Extension settled twice; keeping the first outcome");
            return false;
        }

        state.outcomes.insert(id.clone(), outcome.clone());
        state.order.push(id.clone());

        // No receivers is fine: nobody is waiting on this extension.
        let _ = self.events.send(CompletionEvent { id, outcome });
        true
    }

    /// Waits until the extension settles and returns its outcome.
    pub async fn wait_for(&self, id: &ExtensionId) -> LoadOutcome {
        let mut events = self.events.subscribe();

        if let Some(outcome) = self.outcome(id).await {
            return outcome;
        }

        loop {
            match events.recv().await {
                Ok(event) if &event.id == id => return event.outcome,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!(
                        extension_id = %id,
                        skipped,
                        "Completion listener lagged; re-checking ledger"
                    );
                    if let Some(outcome) = self.outcome(id).await {
                        return outcome;
                    }
                }
                Err(RecvError::Closed) => {
                    return self.outcome(id).await.unwrap_or_else(|| LoadOutcome::Failed {
                        reason: "completion channel closed".to_string(),
                    });
                }
            }
        }
    }

    /// Number of settled extensions.
    pub async fn len(&self) -> usize {
        let state = self.state.read().await;
        state.outcomes.len()
    }

    /// Outcomes in settlement order.
    pub async fn settled(&self) -> Vec<(ExtensionId, LoadOutcome)> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .filter_map(|id| state.outcomes.get(id).map(|o| (id.clone(), o.clone())))
            .collect()
    }
}
