//! `git clone` as a subprocess

use crate::error::{RepoCacheError, RepoCacheResult};
use crate::sandbox::GroupKill;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Materializes a repository into a directory
#[async_trait]
pub trait Cloner: Send + Sync {
    /// Clone `url` into `dest`. `dest` must not exist yet.
    async fn clone_repo(&self, url: &str, dest: &Path) -> RepoCacheResult<()>;
}

/// Cloner backed by the system `git` binary
pub struct GitCloner {
    program: String,
    timeout: Duration,
}

impl GitCloner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Use a different executable in place of `git`
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

impl Default for GitCloner {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[async_trait]
impl Cloner for GitCloner {
    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn clone_repo(&self, url: &str, dest: &Path) -> RepoCacheResult<()> {
        // url and dest are passed as discrete argv entries, never through a shell
        let mut cmd = Command::new(&self.program);
        cmd.arg("clone")
            .arg("--quiet")
            .arg("--")
            .arg(url)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // git hands the transfer to git-remote-https; kill them together
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("spawning git clone");
        let child = cmd
            .spawn()
            .map_err(|e| RepoCacheError::spawn("git clone", e))?;
        let mut group = GroupKill::new(child.id());

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RepoCacheError::CloneFailed {
                url: url.to_string(),
                stderr: format!("clone exceeded {}s", self.timeout.as_secs()),
            })?
            .map_err(|e| RepoCacheError::io("waiting for git clone", e))?;
        group.disarm();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RepoCacheError::CloneFailed {
                url: url.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        info!("Cloned {} into {}", url, dest.display());
        Ok(())
    }
}
