//! Filesystem layout for working copies
//!
//! `{base_dir}/{namespace}/{slug}/`, where the namespace is derived from the
//! caller identity:
//!
//! | Identity | Namespace |
//! |----------|-----------|
//! | `""` | `anonymous` |
//! | `anon_<token>` | `anonymous/anon_<token>` |
//! | anything else | the identity itself |
//!
//! The layout creates namespace directories on demand but never the slug
//! directory, so [`Layout::exists`] reports whether materialization happened.

use crate::cache::slug::Slug;
use crate::error::{RepoCacheError, RepoCacheResult};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

/// Shared namespace for callers without an account
pub const ANONYMOUS: &str = "anonymous";

/// Prefix marking an already-anonymized visitor token
pub const ANON_PREFIX: &str = "anon_";

/// A working-copy directory found on disk
#[derive(Debug, Clone)]
pub struct DiskEntry {
    /// Caller identity the namespace belongs to
    pub caller: String,
    pub slug: Slug,
    pub path: PathBuf,
    pub modified: Option<SystemTime>,
}

/// Maps (caller identity, slug) to confined paths under `base_dir`
#[derive(Debug, Clone)]
pub struct Layout {
    base_dir: PathBuf,
}

impl Layout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Namespace path for a caller, relative to `base_dir`
    pub fn namespace(caller: &str) -> RepoCacheResult<PathBuf> {
        if caller.is_empty() {
            return Ok(PathBuf::from(ANONYMOUS));
        }

        // The shared namespace is reachable only through the empty identity
        let safe = caller != ANONYMOUS
            && !caller.starts_with('.')
            && caller.len() <= 128
            && caller
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'));
        if !safe {
            return Err(RepoCacheError::InvalidIdentity(caller.to_string()));
        }

        if caller.starts_with(ANON_PREFIX) {
            Ok(Path::new(ANONYMOUS).join(caller))
        } else {
            Ok(PathBuf::from(caller))
        }
    }

    /// Absolute path of the working copy for (caller, slug)
    pub fn path_for(&self, caller: &str, slug: &Slug) -> RepoCacheResult<PathBuf> {
        Ok(self.base_dir.join(Self::namespace(caller)?).join(slug.as_str()))
    }

    /// Whether the working copy has been materialized
    pub async fn exists(&self, caller: &str, slug: &Slug) -> RepoCacheResult<bool> {
        let path = self.path_for(caller, slug)?;
        Ok(fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false))
    }

    /// Create the caller's namespace directory with owner-only permissions
    pub async fn ensure_namespace(&self, caller: &str) -> RepoCacheResult<PathBuf> {
        let dir = self.base_dir.join(Self::namespace(caller)?);
        if fs::metadata(&dir).await.is_ok() {
            return Ok(dir);
        }

        fs::create_dir_all(&dir)
            .await
            .map_err(|e| RepoCacheError::io(format!("creating namespace {}", dir.display()), e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(&dir, perms)
                .await
                .map_err(|e| RepoCacheError::io("setting namespace permissions", e))?;
        }

        debug!("Created namespace {}", dir.display());
        Ok(dir)
    }

    /// Every slug-shaped directory under every namespace.
    ///
    /// Unreadable entries are skipped; a missing `base_dir` yields nothing.
    pub async fn scan(&self) -> Vec<DiskEntry> {
        let mut found = Vec::new();

        for namespace in list_dirs(&self.base_dir).await {
            let Some(name) = dir_name(&namespace) else {
                continue;
            };
            let is_shared = name == ANONYMOUS;
            let caller = if is_shared { String::new() } else { name };

            for child in list_dirs(&namespace).await {
                match slug_of(&child) {
                    Some(slug) => found.push(disk_entry(caller.clone(), slug, child).await),
                    // anonymous/anon_<token>/<slug>
                    None if is_shared => {
                        let Some(token) = dir_name(&child) else {
                            continue;
                        };
                        for nested in list_dirs(&child).await {
                            if let Some(slug) = slug_of(&nested) {
                                found.push(disk_entry(token.clone(), slug, nested).await);
                            }
                        }
                    }
                    None => {}
                }
            }
        }

        found
    }
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

fn slug_of(path: &Path) -> Option<Slug> {
    dir_name(path).as_deref().and_then(Slug::parse)
}

async fn disk_entry(caller: String, slug: Slug, path: PathBuf) -> DiskEntry {
    let modified = fs::metadata(&path)
        .await
        .ok()
        .and_then(|m| m.modified().ok());
    DiskEntry {
        caller,
        slug,
        path,
        modified,
    }
}

async fn list_dirs(dir: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Cannot read {}: {}", dir.display(), e);
            }
            return dirs;
        }
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    dirs
}
