//! Repository analysis service
//!
//! Ties the cache to the command runner: ensure the working copy, run the
//! analysis tool inside it while holding its lease, then collect stdout and
//! the generated reports into one [`AnalysisReport`].
//!
//! Build one per process and share it. Leases are backed by lock files in
//! the state directory, so a `serve` process sweeping the cache defers to a
//! `run` in another process and two `run`s never clone the same copy twice.

use crate::audit::AuditLog;
use crate::cache::{
    spawn_eviction, CacheRecord, GithubResolver, JsonRecordStore, Layout, RepoCache, SweepReport,
    WorkingCopy,
};
use crate::config::{schema::Config, ConfigManager};
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::git::GitCloner;
use crate::output::{self, Artifacts};
use crate::sandbox::{AnalysisOptions, CommandRunner, CommandSpec, RunEvent, RunOutput};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_MAX_TOKENS: u64 = 100_000;

/// Everything a caller gets back from one analysis run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub slug: String,
    /// stdout with terminal escapes removed
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub file_tree: Option<String>,
    pub token_count: Option<u64>,
    pub markdown_content: Option<String>,
    pub pdf_exists: bool,
}

pub struct AnalysisService {
    cache: Arc<RepoCache>,
    runner: CommandRunner,
    audit: AuditLog,
    default_max_tokens: u64,
}

impl AnalysisService {
    pub fn new(cache: Arc<RepoCache>, runner: CommandRunner) -> Self {
        Self {
            cache,
            runner,
            audit: AuditLog::disabled(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Wire up the production stack: JSON records and lock files under the
    /// state dir, GitHub commit lookup, and the system `git`.
    pub fn from_config(config: &Config) -> Self {
        let audit = AuditLog::new(config);
        let cache = RepoCache::new(
            Layout::new(ConfigManager::base_dir(config)),
            Arc::new(JsonRecordStore::new(ConfigManager::records_dir(config))),
            Arc::new(GithubResolver::new(&config.github)),
            Arc::new(GitCloner::new(Duration::from_secs(
                config.git.clone_timeout_secs,
            ))),
        )
        .with_host(config.github.host.clone())
        .with_ttl(config.cache.ttl())
        .with_lock_dir(ConfigManager::locks_dir(config))
        .with_audit(audit.clone());

        Self::new(Arc::new(cache), CommandRunner::from_config(&config.analysis))
            .with_audit(audit)
            .with_default_max_tokens(config.analysis.default_max_tokens)
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u64) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    pub fn cache(&self) -> &Arc<RepoCache> {
        &self.cache
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    /// Make sure a working copy exists without running anything
    pub async fn prepare(&self, url: &str, caller: &str) -> RepoCacheResult<CacheRecord> {
        self.cache.ensure_working_copy(url, caller).await
    }

    /// Run the tool with structured options; `max_tokens` falls back to the
    /// configured default.
    pub async fn analyze(
        &self,
        url: &str,
        caller: &str,
        options: &AnalysisOptions,
    ) -> RepoCacheResult<AnalysisReport> {
        let mut options = options.clone();
        options.max_tokens.get_or_insert(self.default_max_tokens);
        let spec = CommandSpec::from_options(&options)?;

        let copy = self.cache.checkout(url, caller).await?;
        self.execute(copy, &spec, None).await
    }

    /// Run a free-text command
    pub async fn run(&self, url: &str, caller: &str, command: &str) -> RepoCacheResult<AnalysisReport> {
        let spec = self.runner.spec_from_raw(command)?;
        let copy = self.cache.checkout(url, caller).await?;
        self.execute(copy, &spec, None).await
    }

    /// Run a free-text command against an existing cache entry
    pub async fn run_slug(
        &self,
        caller: &str,
        slug: &str,
        command: &str,
    ) -> RepoCacheResult<AnalysisReport> {
        let spec = self.runner.spec_from_raw(command)?;
        let copy = self.cache.open(caller, slug).await?;
        self.execute(copy, &spec, None).await
    }

    /// Like [`run`](Self::run), forwarding output as it is produced
    pub async fn run_streaming(
        &self,
        url: &str,
        caller: &str,
        command: &str,
        on_event: &mut (dyn FnMut(RunEvent) + Send),
    ) -> RepoCacheResult<AnalysisReport> {
        let spec = self.runner.spec_from_raw(command)?;
        let copy = self.cache.checkout(url, caller).await?;
        self.execute(copy, &spec, Some(on_event)).await
    }

    /// Reports left by the last run in (caller, slug)
    pub async fn artifacts(&self, caller: &str, slug: &str) -> RepoCacheResult<Artifacts> {
        let lease = self.cache.lease_existing(caller, slug).await?;
        Ok(output::read_generated_artifacts(lease.path()).await)
    }

    /// Path of the generated PDF report, if there is one
    pub async fn pdf_path(&self, caller: &str, slug: &str) -> RepoCacheResult<PathBuf> {
        let lease = self.cache.lease_existing(caller, slug).await?;
        let path = output::pdf_path(lease.path());

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => Err(RepoCacheError::NotFound {
                caller: caller.to_string(),
                slug: format!("{}/{}", slug, output::PDF_REPORT),
            }),
        }
    }

    pub async fn list(&self) -> RepoCacheResult<Vec<CacheRecord>> {
        self.cache.records().list().await
    }

    pub async fn sweep(&self) -> RepoCacheResult<SweepReport> {
        self.cache.sweep().await
    }

    /// Start the periodic eviction sweep for this service's cache
    pub fn spawn_eviction(&self, every: Duration) -> JoinHandle<()> {
        spawn_eviction(self.cache.clone(), every)
    }

    async fn execute(
        &self,
        copy: WorkingCopy,
        spec: &CommandSpec,
        on_event: Option<&mut (dyn FnMut(RunEvent) + Send)>,
    ) -> RepoCacheResult<AnalysisReport> {
        let run_id = Uuid::new_v4();
        let command = self.runner.display(spec);
        info!("Run {}: '{}' in {}", run_id, command, copy.path().display());

        let result = match on_event {
            Some(on_event) => self.runner.run_streaming(copy.path(), spec, on_event).await,
            None => self.runner.run(copy.path(), spec).await,
        };

        let run = match result {
            Ok(run) => run,
            Err(e) => {
                warn!("Run {} failed in {}: {}", run_id, copy.slug(), e);
                self.audit
                    .log(
                        "command.failed",
                        &serde_json::json!({
                            "run_id": run_id.to_string(),
                            "slug": copy.slug(),
                            "caller": copy.caller(),
                            "command": command,
                            "error": e.kind().as_str(),
                        }),
                    )
                    .await;
                return Err(e);
            }
        };

        if let Err(e) = self.cache.touch(copy.caller(), copy.slug()).await {
            warn!("Run {}: could not refresh {}: {}", run_id, copy.slug(), e);
        }
        self.audit
            .log(
                "command.completed",
                &serde_json::json!({
                    "run_id": run_id.to_string(),
                    "slug": copy.slug(),
                    "caller": copy.caller(),
                    "command": command,
                    "exit_code": run.exit_code,
                }),
            )
            .await;

        let artifacts = output::read_generated_artifacts(copy.path()).await;
        Ok(build_report(copy.slug(), run, artifacts))
    }
}

fn build_report(slug: &str, run: RunOutput, artifacts: Artifacts) -> AnalysisReport {
    let stdout = output::strip_ansi(&run.stdout);
    let parsed = output::parse_stdout(&stdout);

    // Some tool versions only write the tree into the report
    let file_tree = parsed.file_tree.or_else(|| {
        artifacts
            .markdown_content
            .as_deref()
            .and_then(output::extract_marked_tree)
    });

    AnalysisReport {
        slug: slug.to_string(),
        stdout,
        stderr: run.stderr,
        exit_code: run.exit_code,
        file_tree,
        token_count: parsed.token_count,
        markdown_content: artifacts.markdown_content,
        pdf_exists: artifacts.pdf_exists,
    }
}
