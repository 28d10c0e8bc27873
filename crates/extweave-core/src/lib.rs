//! # extweave-core
//!
//! Core crate for extweave. Contains the extension identifier type,
//! configuration schemas, and the unified error system.
//!
//! This crate has **no** internal dependencies on other extweave crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
pub use types::ExtensionId;
