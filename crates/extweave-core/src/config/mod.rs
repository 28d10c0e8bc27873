//! Application configuration schemas.
//!
//! All configuration structs are deserialized through the `config` crate
//! from an optional TOML/JSON file overlaid with `EXTWEAVE__*` environment
//! variables. Each sub-module represents a logical configuration section.

pub mod extensions;
pub mod loader;
pub mod logging;

use serde::{Deserialize, Serialize};

use self::extensions::ExtensionsConfig;
use self::loader::LoaderConfig;
use self::logging::LoggingConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Load pass settings.
    #[serde(default)]
    pub loader: LoaderConfig,
    /// Per-extension enable/disable state.
    #[serde(default)]
    pub extensions: ExtensionsConfig,
}

impl AppConfig {
    /// Load configuration from a file (if present) and the environment.
    ///
    /// Environment variables use the `EXTWEAVE` prefix and `__` as the
    /// section separator, e.g. `EXTWEAVE__LOADER__LOAD_TIMEOUT_SECONDS=5`.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("EXTWEAVE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
