use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{IngestError, Result};

/// Where the database lives while events are being ingested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagingMode {
    /// Build in an in-memory database and back it up to the destination
    /// once, at shutdown.
    #[default]
    Memory,
    /// Write straight to the destination file and run a consistency pass at
    /// shutdown.
    Direct,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub destination: PathBuf,
    #[serde(default)]
    pub staging: StagingMode,
    #[serde(default = "default_true")]
    pub overwrite: bool,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl IngestConfig {
    /// Defaults for everything except the destination.
    #[must_use]
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
            staging: StagingMode::default(),
            overwrite: default_true(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }

    #[must_use]
    pub fn with_staging(mut self, staging: StagingMode) -> Self {
        self.staging = staging;
        self
    }

    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Reject configs that can never produce an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Config`] for an empty destination path.
    pub fn validate(&self) -> Result<()> {
        if self.destination.as_os_str().is_empty() {
            return Err(IngestError::Config("destination must not be empty".into()));
        }
        Ok(())
    }
}

/// Load an ingestion config from a TOML file.
///
/// # Errors
///
/// Returns [`IngestError::Config`] if the file cannot be read, does not
/// parse, or fails validation.
pub fn load_config(path: &Path) -> Result<IngestConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Config(format!("Failed to read {}: {e}", path.display())))?;

    let config = toml::from_str::<IngestConfig>(&content)
        .map_err(|e| IngestError::Config(format!("Failed to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

const fn default_true() -> bool {
    true
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}
