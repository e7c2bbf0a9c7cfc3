//! Configuration management for repocache

pub mod schema;

pub use schema::Config;

use crate::error::{RepoCacheError, RepoCacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repocache")
            .join("config.toml")
    }

    /// Default state directory (records, audit log)
    pub fn default_state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repocache")
    }

    /// Default working-copy root
    pub fn default_base_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("repocache")
            .join("environments")
    }

    /// Effective working-copy root for a config
    pub fn base_dir(config: &Config) -> PathBuf {
        config
            .storage
            .base_dir
            .clone()
            .unwrap_or_else(Self::default_base_dir)
    }

    /// Effective state directory for a config
    pub fn state_dir(config: &Config) -> PathBuf {
        config
            .storage
            .state_dir
            .clone()
            .unwrap_or_else(Self::default_state_dir)
    }

    /// Directory holding one JSON file per cache record
    pub fn records_dir(config: &Config) -> PathBuf {
        Self::state_dir(config).join("records")
    }

    /// Directory of per-working-copy lock files shared by every process
    pub fn locks_dir(config: &Config) -> PathBuf {
        Self::state_dir(config).join("locks")
    }

    /// Get the audit log path
    pub fn audit_log_path(config: &Config) -> PathBuf {
        Self::state_dir(config).join("audit.log")
    }

    /// Load configuration, falling back to defaults, then apply env overrides
    pub async fn load(&self) -> RepoCacheResult<Config> {
        let mut config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };

        self.apply_env(&mut config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> RepoCacheResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| RepoCacheError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| RepoCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Overlay environment variables on a loaded config
    fn apply_env(&self, config: &mut Config) -> RepoCacheResult<()> {
        if let Some(dir) = env_var("REPOCACHE_BASE_DIR") {
            config.storage.base_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = env_var("REPOCACHE_STATE_DIR") {
            config.storage.state_dir = Some(PathBuf::from(dir));
        }
        if let Some(secs) = env_var("REPOCACHE_TTL_SECS") {
            config.cache.ttl_secs = self.parse_secs("REPOCACHE_TTL_SECS", &secs)?;
        }
        if let Some(secs) = env_var("REPOCACHE_COMMAND_TIMEOUT_SECS") {
            config.analysis.timeout_secs =
                self.parse_secs("REPOCACHE_COMMAND_TIMEOUT_SECS", &secs)?;
        }
        if let Some(token) = env_var("GITHUB_TOKEN") {
            config.github.token = Some(token);
        }
        Ok(())
    }

    fn parse_secs(&self, name: &str, value: &str) -> RepoCacheResult<u64> {
        value
            .trim()
            .parse()
            .map_err(|_| RepoCacheError::ConfigInvalid {
                path: self.config_path.clone(),
                reason: format!("{} must be a whole number of seconds, got '{}'", name, value),
            })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> RepoCacheResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            RepoCacheError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> RepoCacheResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| RepoCacheError::io(format!("creating {}", parent.display()), e))?;
        }
        Ok(())
    }

    /// Ensure the working-copy root and state directories exist
    pub async fn ensure_state_dirs(config: &Config) -> RepoCacheResult<()> {
        let dirs = [
            Self::base_dir(config),
            Self::state_dir(config),
            Self::records_dir(config),
            Self::locks_dir(config),
        ];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                RepoCacheError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            std::fs::set_permissions(Self::base_dir(config), perms)
                .map_err(|e| RepoCacheError::io("setting base dir permissions", e))?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
