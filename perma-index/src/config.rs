//! Corpus configuration.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Tuning knobs for a [`Corpus`](crate::Corpus).
#[derive(PartialEq, Eq, Debug, Deserialize, Serialize, Clone)]
#[serde(default, deny_unknown_fields)]
pub struct CorpusConfig {
    /// Capacity of the channel used by
    /// [`Corpus::spawn_enumerate`](crate::Corpus::spawn_enumerate).
    pub stream_capacity: usize,
    /// Log statistics after each bulk load.
    pub log_load_stats: bool,
    /// Serve latest, unfiltered attribute reads from the values
    /// maintained on ingest instead of replaying claims.
    pub attr_fast_path: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 64,
            log_load_stats: true,
            attr_fast_path: true,
        }
    }
}

impl CorpusConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&s).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Parse from TOML text.
    pub fn from_toml(s: &str) -> Result<Self> {
        let config = toml::from_str(s)?;
        Ok(config)
    }
}
