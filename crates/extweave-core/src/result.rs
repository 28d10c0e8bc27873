//! Convenience result type alias for extweave.

use crate::error::AppError;

/// A specialized `Result` type for extweave operations.
pub type AppResult<T> = Result<T, AppError>;
