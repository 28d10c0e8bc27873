//! Core type definitions used across the extweave workspace.

pub mod id;

pub use id::ExtensionId;
