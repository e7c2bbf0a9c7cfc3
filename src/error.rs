//! Error types for repocache
//!
//! All modules use `RepoCacheResult<T>` as their return type.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for repocache operations
pub type RepoCacheResult<T> = Result<T, RepoCacheError>;

/// Stable, machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidUrl,
    UpstreamResolutionFailed,
    CloneFailed,
    CommandFailed,
    TimedOut,
    NotFound,
    InvalidInput,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidUrl => "invalid_url",
            Self::UpstreamResolutionFailed => "upstream_resolution_failed",
            Self::CloneFailed => "clone_failed",
            Self::CommandFailed => "command_failed",
            Self::TimedOut => "timed_out",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal",
        }
    }
}

/// All errors that can occur in repocache
#[derive(Error, Debug)]
pub enum RepoCacheError {
    // Request validation
    #[error("Invalid repository URL: {0}. Expected https://<host>/<owner>/<repo>")]
    InvalidUrl(String),

    #[error("Invalid caller identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // Upstream
    #[error("Failed to resolve latest commit for {url}: {reason}")]
    UpstreamResolutionFailed { url: String, reason: String },

    #[error("git clone failed for {url}: {stderr}")]
    CloneFailed { url: String, stderr: String },

    // Analysis command
    #[error("Analysis command exited with code {code}")]
    CommandFailed {
        code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("Analysis command timed out after {}s", timeout.as_secs())]
    TimedOut {
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    #[error("No working copy {slug} for caller {caller}")]
    NotFound { caller: String, slug: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RepoCacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a spawn error for a subprocess that never started
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    /// Category of this error, for callers that map errors to responses
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::UpstreamResolutionFailed { .. } => ErrorKind::UpstreamResolutionFailed,
            Self::CloneFailed { .. } => ErrorKind::CloneFailed,
            Self::CommandFailed { .. } => ErrorKind::CommandFailed,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidIdentity(_) | Self::InvalidCommand(_) | Self::ConfigInvalid { .. } => {
                ErrorKind::InvalidInput
            }
            _ => ErrorKind::Internal,
        }
    }

    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamResolutionFailed { .. })
    }

    /// Output captured before the command failed or was killed
    pub fn partial_output(&self) -> Option<(&str, &str)> {
        match self {
            Self::CommandFailed { stdout, stderr, .. } | Self::TimedOut { stdout, stderr, .. } => {
                Some((stdout, stderr))
            }
            _ => None,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidUrl(_) => Some("Use a URL like https://github.com/owner/repo"),
            Self::UpstreamResolutionFailed { .. } => {
                Some("Check network access or set GITHUB_TOKEN to raise the API rate limit")
            }
            Self::TimedOut { .. } => Some("Raise analysis.timeout_secs or narrow the includes"),
            Self::NotFound { .. } => Some("Run: repocache prepare <url>"),
            _ => None,
        }
    }
}
