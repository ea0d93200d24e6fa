//! Configuration loader using figment.
//!
//! Sources are layered, later overriding earlier:
//!
//! 1. Built-in defaults
//! 2. Configuration file (`switchboard.toml` / `switchboard.yaml`,
//!    depending on the `toml-config` / `yaml-config` features)
//! 3. `SWITCHBOARD_*` environment variables with `__` as the path
//!    separator (`SWITCHBOARD_LOGGING__LEVEL=debug` → `logging.level`)
//! 4. Conventional credential variables: `SLACK_BOT_TOKEN`,
//!    `SLACK_SIGNING_SECRET`, `SLACK_APP_TOKEN`

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use tracing::{debug, warn};

use super::schema::SwitchboardConfig;
use crate::error::{ConfigError, ConfigResult};

/// Credential environment variables mapped into `credentials.*`.
const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[
    ("SLACK_BOT_TOKEN", "credentials.bot_token"),
    ("SLACK_SIGNING_SECRET", "credentials.signing_secret"),
    ("SLACK_APP_TOKEN", "credentials.app_token"),
];

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    figment: Figment,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a loader that searches the current directory and reads the
    /// environment.
    pub fn new() -> Self {
        Self {
            figment: Figment::new(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Sets a specific configuration file to load.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Disables reading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: SwitchboardConfig) -> Self {
        self.figment = self.figment.merge(Serialized::defaults(config));
        self
    }

    /// Loads and returns the configuration.
    pub fn load(self) -> ConfigResult<SwitchboardConfig> {
        let figment = self.build_figment()?;
        let config: SwitchboardConfig = figment
            .extract()
            .map_err(|e| ConfigError::ParseError(format!("failed to extract configuration: {e}")))?;

        debug!(
            logging_level = %config.logging.level,
            "Configuration loaded"
        );
        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(SwitchboardConfig::default()));

        let user_figment = std::mem::take(&mut self.figment);
        figment = figment.merge(user_figment);

        if let Some(path) = &self.config_file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.clone()));
            }
            figment = Self::merge_config_file(figment, path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            figment = figment.merge(
                Env::prefixed("SWITCHBOARD_")
                    .split("__")
                    .map(|key| key.as_str().replace("__", ".").into()),
            );
            for (var, key) in CREDENTIAL_ENV_VARS {
                if let Ok(value) = std::env::var(var) {
                    figment = figment.merge(Serialized::default(key, value));
                }
            }
        }

        Ok(figment)
    }

    /// Merges a single config file, dispatching on extension. Only
    /// feature-enabled formats are accepted.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::ParseError(format!(
                "unsupported or disabled configuration file format: .{ext}"
            ))),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if self.search_paths.is_empty() {
            std::env::current_dir().into_iter().collect()
        } else {
            self.search_paths.clone()
        }
    }

    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        for search_path in &search_paths {
            let path = search_path.join("switchboard.toml");
            if path.exists() {
                debug!(path = %path.display(), "Loading configuration file");
                figment = figment.merge(Toml::file(&path));
                found = true;
                break;
            }
        }

        #[cfg(feature = "yaml-config")]
        for search_path in &search_paths {
            for name in ["switchboard.yaml", "switchboard.yml"] {
                let path = search_path.join(name);
                if path.exists() {
                    debug!(path = %path.display(), "Loading configuration file");
                    figment = figment.merge(Yaml::file(&path));
                    found = true;
                    break;
                }
            }
        }

        if !found {
            warn!("No configuration file found, using defaults");
        }
        figment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{LogLevel, TransportConfig};

    #[test]
    fn defaults_load_without_any_sources() {
        let config = ConfigLoader::new().without_env().load().unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(matches!(config.transport, TransportConfig::HttpServer(_)));
        assert!(config.credentials.bot_token.is_none());
    }

    #[test]
    fn programmatic_merge_overrides_defaults() {
        let mut overrides = SwitchboardConfig::default();
        overrides.credentials.bot_token = Some("xoxb-merged".to_string());

        let config = ConfigLoader::new()
            .without_env()
            .merge(overrides)
            .load()
            .unwrap();
        assert_eq!(config.credentials.bot_token.as_deref(), Some("xoxb-merged"));
    }

    #[test]
    fn missing_explicit_file_errors() {
        let err = ConfigLoader::new()
            .without_env()
            .file("/definitely/not/here.toml")
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
