//! Configuration for the perma CLI.

use std::{
    env,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use perma_index::CorpusConfig;
use serde::Deserialize;
use tracing::debug;

const ENV_CONFIG_DIR: &str = "PERMA_CONFIG_DIR";

/// Name of the optional config file located in the perma config directory.
pub(crate) const CONFIG_FILE_NAME: &str = "perma.config.toml";

/// Name of the perma directory inside the platform config directory.
const PERMA_DIR: &str = "perma";

/// The configuration of the CLI.
#[derive(PartialEq, Eq, Debug, Deserialize, Clone, Default)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CliConfig {
    /// Settings for the in-memory corpus.
    pub(crate) corpus: CorpusConfig,
}

impl CliConfig {
    /// Creates a config from the given file, or the default config file.
    ///
    /// If there is no file and the default file does not exist, the default
    /// config is used.
    pub(crate) async fn load(file: Option<&Path>) -> Result<CliConfig> {
        let default_config = perma_config_path(CONFIG_FILE_NAME)?;

        let config_file = match file {
            Some(file) => Some(file),
            None => {
                if default_config.exists() {
                    Some(default_config.as_ref())
                } else {
                    None
                }
            }
        };
        let config = if let Some(file) = config_file {
            debug!(path = %file.display(), "loading config");
            let s = tokio::fs::read_to_string(file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            Self::load_toml(&s)?
        } else {
            Self::default()
        };
        Ok(config)
    }

    fn load_toml(s: &str) -> Result<CliConfig> {
        let config = toml::from_str(s)?;
        Ok(config)
    }
}

/// Returns the path to the user's perma config directory.
///
/// If the `PERMA_CONFIG_DIR` environment variable is set it will be used
/// unconditionally.
pub(crate) fn perma_config_root() -> Result<PathBuf> {
    if let Some(val) = env::var_os(ENV_CONFIG_DIR) {
        return Ok(PathBuf::from(val));
    }
    let cfg = dirs_next::config_dir()
        .ok_or_else(|| anyhow!("operating environment provides no directory for configuration"))?;
    Ok(cfg.join(PERMA_DIR))
}

/// Path that leads to a file in the perma config directory.
pub(crate) fn perma_config_path(file_name: impl AsRef<Path>) -> Result<PathBuf> {
    let path = perma_config_root()?.join(file_name);
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_invalid_field() {
        let source = r#"
          not_a_field = true
        "#;
        let res = CliConfig::load_toml(source);
        assert!(res.is_err());
    }

    #[test]
    fn test_toml_corpus() {
        let source = r#"
          [corpus]
          stream_capacity = 8
          log_load_stats = false
        "#;
        let config = CliConfig::load_toml(source).unwrap();
        assert_eq!(config.corpus.stream_capacity, 8);
        assert!(!config.corpus.log_load_stats);
        assert!(config.corpus.attr_fast_path);
    }

    #[test]
    fn test_toml_empty() {
        assert_eq!(CliConfig::load_toml("").unwrap(), CliConfig::default());
    }

    #[tokio::test]
    async fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        tokio::fs::write(&path, "[corpus]\nattr_fast_path = false\n")
            .await
            .unwrap();
        let config = CliConfig::load(Some(&path)).await.unwrap();
        assert!(!config.corpus.attr_fast_path);

        let missing = dir.path().join("missing.toml");
        assert!(CliConfig::load(Some(&missing)).await.is_err());
    }
}
