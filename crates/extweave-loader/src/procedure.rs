//! Load procedures: the opaque step that installs an extension.
//!
//! The loader only decides *when* a procedure runs (after its dependencies
//! settle) and *how often* (exactly once per active extension). What the
//! procedure does is up to the host.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use extweave_core::ExtensionId;

/// The channel a load failure originated from. Decides whether the failure
/// is contained or aborts the whole load pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadChannel {
    /// Best-effort channel: the failure is logged and recorded, dependents
    /// are skipped, unrelated extensions keep loading.
    Isolated,
    /// Non-isolated channel: the failure aborts the load pass.
    Critical,
}

impl fmt::Display for LoadChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolated => write!(f, "isolated"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Error returned by a load procedure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({channel} channel)")]
pub struct LoadFailure {
    /// Channel the failure came from.
    pub channel: LoadChannel,
    /// Human-readable reason.
    pub message: String,
}

impl LoadFailure {
    /// A contained failure.
    pub fn isolated(message: impl Into<String>) -> Self {
        Self {
            channel: LoadChannel::Isolated,
            message: message.into(),
        }
    }

    /// A failure that aborts the load pass.
    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            channel: LoadChannel::Critical,
            message: message.into(),
        }
    }

    /// Returns whether this failure aborts the load pass.
    pub fn is_critical(&self) -> bool {
        self.channel == LoadChannel::Critical
    }
}

/// The step that installs a single extension. May suspend.
#[async_trait]
pub trait LoadProcedure: Send + Sync + fmt::Debug {
    /// Loads the extension identified by `id`.
    async fn load(&self, id: &ExtensionId) -> Result<(), LoadFailure>;
}

/// A procedure that does nothing. Used for manifests discovered without code.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProcedure;

#[async_trait]
impl LoadProcedure for NoopProcedure {
    async fn load(&self, _id: &ExtensionId) -> Result<(), LoadFailure> {
        Ok(())
    }
}

type ProcedureFn =
    Arc<dyn Fn(ExtensionId) -> BoxFuture<'static, Result<(), LoadFailure>> + Send + Sync>;

/// A closure-based load procedure.
#[derive(Clone)]
pub struct ClosureProcedure {
    /// Label shown in debug output.
    label: String,
    /// Procedure body.
    body: ProcedureFn,
}

impl fmt::Debug for ClosureProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureProcedure")
            .field("label", &self.label)
            .field("body", &"<closure>")
            .finish()
    }
}

impl ClosureProcedure {
    /// Creates a procedure from an async closure.
    pub fn new<F, Fut>(label: impl Into<String>, body: F) -> Self
    where
        F: Fn(ExtensionId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), LoadFailure>> + Send + 'static,
    {
        Self {
            label: label.into(),
            body: Arc::new(move |id| Box::pin(body(id))),
        }
    }

    /// Wraps the procedure into an `Arc<dyn LoadProcedure>`.
    pub fn shared(self) -> Arc<dyn LoadProcedure> {
        Arc::new(self)
    }
}

#[async_trait]
impl LoadProcedure for ClosureProcedure {
    async fn load(&self, id: &ExtensionId) -> Result<(), LoadFailure> {
        (self.body)(id.clone()).await
    }
}
