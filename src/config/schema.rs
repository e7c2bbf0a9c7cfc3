//! Configuration schema for repocache
//!
//! Configuration is stored at `~/.config/repocache/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Where working copies and records live
    pub storage: StorageConfig,

    /// Working-copy lifetime
    pub cache: CacheConfig,

    /// Analysis tool invocation
    pub analysis: AnalysisConfig,

    /// Repository host and API settings
    pub github: GithubConfig,

    /// Version-control client settings
    pub git: GitConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Enable audit logging
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Storage locations. Unset paths fall back to platform directories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of all per-caller working copies
    pub base_dir: Option<PathBuf>,

    /// Cache records and the audit log
    pub state_dir: Option<PathBuf>,
}

/// Working-copy lifetime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Idle time before a working copy is evicted
    pub ttl_secs: u64,

    /// How often the eviction sweep runs
    pub sweep_interval_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 12 * 60 * 60,
            sweep_interval_secs: 60 * 60,
        }
    }
}

/// Analysis tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Executable invoked inside the working copy
    pub tool: String,

    /// Flags always appended (markdown report mode)
    pub fixed_args: Vec<String>,

    /// Hard limit per invocation
    pub timeout_secs: u64,

    /// Token budget used when a structured run gives none
    pub default_max_tokens: u64,
}

impl AnalysisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tool: "ccontext".to_string(),
            fixed_args: vec!["-gm".to_string(), "-g".to_string()],
            timeout_secs: 300,
            default_max_tokens: 100_000,
        }
    }
}

/// Repository host settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Host accepted in repository URLs
    pub host: String,

    /// REST API root used to resolve commits
    pub api_base: String,

    /// Optional API token (raises rate limits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Per-request timeout for API calls
    pub request_timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            host: "github.com".to_string(),
            api_base: "https://api.github.com".to_string(),
            token: None,
            request_timeout_secs: 10,
        }
    }
}

/// Version-control client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Upper bound on a single clone
    pub clone_timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            clone_timeout_secs: 600,
        }
    }
}
