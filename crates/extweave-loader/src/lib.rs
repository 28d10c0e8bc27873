//! # extweave-loader
//!
//! Extension activation and load ordering. Provides:
//!
//! - Dependency graph construction with missing-dependency and cycle detection
//! - Activation resolution (explicit configuration plus implicit propagation,
//!   incompatibility resolution)
//! - A concurrent loader that runs every active extension exactly once, after
//!   its dependencies, without a precomputed schedule
//! - A write-once, process-wide snapshot of the active extension set

pub mod activation;
pub mod diagnostics;
pub mod graph;
pub mod ledger;
pub mod loader;
pub mod manifest;
pub mod pipeline;
pub mod procedure;
pub mod publish;

pub use activation::{Activation, ActivationResolver};
pub use diagnostics::PlanError;
pub use graph::{DependencyGraph, GraphBuild};
pub use ledger::{CompletionEvent, CompletionLedger};
pub use loader::{ConcurrentLoader, LoadOutcome, LoadReport, LoaderSettings};
pub use manifest::{ExtensionDescriptor, ExtensionManifest, ExtensionMeta};
pub use pipeline::{ExtensionPipeline, Plan, PlanReport};
pub use procedure::{ClosureProcedure, LoadChannel, LoadFailure, LoadProcedure, NoopProcedure};
pub use publish::{ActivePublisher, ActiveSnapshot};
