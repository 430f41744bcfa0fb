//! Layered configuration: defaults, then an optional file, then environment
//!
//! Environment variables use the `FLOWBOARD_` prefix and `__` between
//! nesting levels, e.g. `FLOWBOARD_LIMITS__MAX_TASK_COUNT=50` or
//! `FLOWBOARD_LOG__FORMAT=pretty`.

use crate::error::Result;
use crate::logging::LogConfig;
use crate::models::{
    DefinitionLimits, DEFAULT_MAX_DEFINITION_SIZE, DEFAULT_MAX_TASK_COUNT,
    DEFAULT_MAX_TASK_NAME_LEN,
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ENV_PREFIX: &str = "FLOWBOARD";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub limits: DefinitionLimits,
}

impl Settings {
    /// Load settings. A given `path` must exist; its format follows the
    /// file extension (`.yaml`, `.toml`, `.json`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("log.level", "info")?
            .set_default("log.format", "json")?
            .set_default(
                "limits.max_definition_size",
                DEFAULT_MAX_DEFINITION_SIZE as i64,
            )?
            .set_default("limits.max_task_count", DEFAULT_MAX_TASK_COUNT as i64)?
            .set_default("limits.max_task_name_len", DEFAULT_MAX_TASK_NAME_LEN as i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(settings)
    }
}
