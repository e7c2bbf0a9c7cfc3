//! Fakes for the network and version-control seams

use crate::cache::slug::{CommitResolver, RepoRef};
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::git::Cloner;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const SHA: &str = "9f1c2e3d4b5a69788796a5b4c3d2e1f0a9b8c7d6";

/// Resolves every repository to the same commit
pub struct FixedResolver {
    sha: String,
    calls: AtomicUsize,
}

impl FixedResolver {
    pub fn new(sha: &str) -> Self {
        Self {
            sha: sha.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitResolver for FixedResolver {
    async fn latest_commit(&self, _repo: &RepoRef) -> RepoCacheResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.sha.clone())
    }
}

/// "Clones" by creating the directory with a single file, counting calls
pub struct CountingCloner {
    count: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl CountingCloner {
    pub fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            delay: Duration::ZERO,
            fail: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Leave a half-written directory behind and fail
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Cloner for CountingCloner {
    async fn clone_repo(&self, url: &str, dest: &Path) -> RepoCacheResult<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| RepoCacheError::io("creating fake clone", e))?;

        if self.fail {
            return Err(RepoCacheError::CloneFailed {
                url: url.to_string(),
                stderr: "fatal: repository not found".to_string(),
            });
        }

        tokio::fs::write(dest.join("README.md"), "# widgets\n")
            .await
            .map_err(|e| RepoCacheError::io("writing fake clone", e))?;
        Ok(())
    }
}

/// Write an executable shell script into `dir`
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Wait for a script to write a pid into `path`
pub async fn recorded_pid(path: &Path) -> i32 {
    for _ in 0..200 {
        if let Ok(text) = std::fs::read_to_string(path) {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no pid written to {}", path.display());
}

/// Zombies count as gone; orphans are not always reaped in containers
#[cfg(target_os = "linux")]
pub fn is_running(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.trim_start().chars().next())
            .is_some_and(|state| state != 'Z' && state != 'X'),
        Err(_) => false,
    }
}

#[cfg(target_os = "linux")]
pub async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..200 {
        if !is_running(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
