//! Repository cache orchestrator
//!
//! Reconciles the record store against the filesystem and decides whether a
//! working copy is reused, re-cloned, adopted or cloned fresh.

use crate::audit::AuditLog;
use crate::cache::layout::Layout;
use crate::cache::locks::{KeyedLocks, Lease};
use crate::cache::record::{CacheRecord, RecordStore};
use crate::cache::slug::{generate_slug, CommitResolver, RepoRef, Slug};
use crate::error::{RepoCacheError, RepoCacheResult};
use crate::git::Cloner;
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Action chosen for a (record, directory) presence pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Record and directory present
    Reuse,
    /// Record present, directory gone: clone again into the same path
    Reclone,
    /// Directory present, record gone: trust the disk and write a record
    Adopt,
    /// Neither present
    Clone,
}

impl Reconciliation {
    pub fn decide(record_exists: bool, dir_exists: bool) -> Self {
        match (record_exists, dir_exists) {
            (true, true) => Self::Reuse,
            (true, false) => Self::Reclone,
            (false, true) => Self::Adopt,
            (false, false) => Self::Clone,
        }
    }

    pub fn needs_clone(&self) -> bool {
        matches!(self, Self::Reclone | Self::Clone)
    }

    /// Audit event name for this outcome
    fn event(&self) -> &'static str {
        match self {
            Self::Reuse => "working_copy.reused",
            Self::Reclone | Self::Clone => "working_copy.cloned",
            Self::Adopt => "working_copy.adopted",
        }
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reuse => write!(f, "reuse"),
            Self::Reclone => write!(f, "reclone"),
            Self::Adopt => write!(f, "adopt"),
            Self::Clone => write!(f, "clone"),
        }
    }
}

/// A reconciled working copy, held exclusively until dropped
#[derive(Debug)]
pub struct WorkingCopy {
    pub record: CacheRecord,
    pub outcome: Reconciliation,
    lease: Lease,
}

impl WorkingCopy {
    pub fn path(&self) -> &Path {
        self.lease.path()
    }

    pub fn slug(&self) -> &str {
        &self.record.slug
    }

    pub fn caller(&self) -> &str {
        &self.record.caller_identity
    }
}

/// Owns every working copy under one base directory.
///
/// Construct once per process and share it (`Arc<RepoCache>`). Without
/// [`with_lock_dir`](Self::with_lock_dir) leases only exclude callers that
/// go through the same instance; with it, every process using the same
/// lock directory is excluded as well.
pub struct RepoCache {
    pub(super) layout: Layout,
    pub(super) records: Arc<dyn RecordStore>,
    pub(super) locks: KeyedLocks,
    pub(super) audit: AuditLog,
    pub(super) ttl: Duration,
    host: String,
    resolver: Arc<dyn CommitResolver>,
    cloner: Arc<dyn Cloner>,
}

impl RepoCache {
    pub fn new(
        layout: Layout,
        records: Arc<dyn RecordStore>,
        resolver: Arc<dyn CommitResolver>,
        cloner: Arc<dyn Cloner>,
    ) -> Self {
        Self {
            layout,
            records,
            locks: KeyedLocks::new(),
            audit: AuditLog::disabled(),
            ttl: Duration::from_secs(12 * 60 * 60),
            host: "github.com".to_string(),
            resolver,
            cloner,
        }
    }

    /// Accept repository URLs on a different host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = audit;
        self
    }

    /// Back every lease with a lock file under `dir`
    pub fn with_lock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.locks = KeyedLocks::with_lock_dir(dir);
        self
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn records(&self) -> &dyn RecordStore {
        self.records.as_ref()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Validate a repository URL without any I/O
    pub fn repo_ref(&self, url: &str) -> RepoCacheResult<RepoRef> {
        RepoRef::parse(url, &self.host)
    }

    /// Compute the slug for `url` at its current upstream commit
    pub async fn slug_for(&self, url: &str) -> RepoCacheResult<Slug> {
        let repo = self.repo_ref(url)?;
        generate_slug(self.resolver.as_ref(), &repo).await
    }

    /// Resolve or materialize the working copy for (url, caller) and return
    /// its reconciled record.
    pub async fn ensure_working_copy(&self, url: &str, caller: &str) -> RepoCacheResult<CacheRecord> {
        Ok(self.checkout(url, caller).await?.record)
    }

    /// Like [`ensure_working_copy`](Self::ensure_working_copy), but keeps the
    /// working copy locked until the returned handle is dropped.
    pub async fn checkout(&self, url: &str, caller: &str) -> RepoCacheResult<WorkingCopy> {
        let repo = self.repo_ref(url)?;
        // Reject bad identities before touching the network
        Layout::namespace(caller)?;

        let slug = generate_slug(self.resolver.as_ref(), &repo).await?;
        let path = self.layout.path_for(caller, &slug)?;
        let lease = self.locks.acquire(&path).await?;

        self.reconcile(caller, &slug, Some(&repo.url), lease).await
    }

    /// Open an existing cache entry by slug.
    ///
    /// Re-clones from the recorded URL if the directory vanished and adopts an
    /// unrecorded directory; `NotFound` if neither exists.
    pub async fn open(&self, caller: &str, slug: &str) -> RepoCacheResult<WorkingCopy> {
        let slug = self.parse_slug(caller, slug)?;
        let path = self.layout.path_for(caller, &slug)?;
        let lease = self.locks.acquire(&path).await?;

        self.reconcile(caller, &slug, None, lease).await
    }

    /// Lock an existing working copy without materializing anything
    pub async fn lease_existing(&self, caller: &str, slug: &str) -> RepoCacheResult<Lease> {
        let parsed = self.parse_slug(caller, slug)?;
        let path = self.layout.path_for(caller, &parsed)?;
        let lease = self.locks.acquire(&path).await?;

        if !self.layout.exists(caller, &parsed).await? {
            return Err(not_found(caller, slug));
        }
        Ok(lease)
    }

    /// Keep a working copy alive after use
    pub async fn touch(&self, caller: &str, slug: &str) -> RepoCacheResult<()> {
        if !self.records.touch(caller, slug, Utc::now()).await? {
            debug!("No record to touch for {} ({})", slug, caller);
        }
        Ok(())
    }

    fn parse_slug(&self, caller: &str, slug: &str) -> RepoCacheResult<Slug> {
        Slug::parse(slug).ok_or_else(|| not_found(caller, slug))
    }

    async fn reconcile(
        &self,
        caller: &str,
        slug: &Slug,
        url: Option<&str>,
        lease: Lease,
    ) -> RepoCacheResult<WorkingCopy> {
        let path = lease.path().to_path_buf();
        let existing = self.records.get(caller, slug.as_str()).await?;
        let dir_exists = self.layout.exists(caller, slug).await?;
        let outcome = Reconciliation::decide(existing.is_some(), dir_exists);

        info!(
            "Working copy {} for '{}': {} (record: {}, directory: {})",
            slug,
            caller,
            outcome,
            existing.is_some(),
            dir_exists
        );

        let source_url = url
            .map(str::to_string)
            .or_else(|| existing.as_ref().and_then(|r| r.source_url.clone()));

        if outcome.needs_clone() {
            let Some(clone_url) = source_url.as_deref() else {
                // Reached by slug with nothing to clone from
                if existing.is_some() {
                    self.records.delete(caller, slug.as_str()).await?;
                }
                return Err(not_found(caller, slug.as_str()));
            };

            self.layout.ensure_namespace(caller).await?;
            if let Err(e) = self.cloner.clone_repo(clone_url, &path).await {
                discard_partial(&path).await;
                return Err(e);
            }
        }

        let now = Utc::now();
        let record = match existing {
            Some(mut record) => {
                record.last_used_at = now;
                if source_url.is_some() {
                    record.source_url = source_url;
                }
                record
            }
            None => CacheRecord::new(slug, source_url, caller),
        };
        self.records.upsert(&record).await?;

        self.audit
            .log(
                outcome.event(),
                &serde_json::json!({
                    "slug": record.slug,
                    "caller": record.caller_identity,
                    "outcome": outcome.to_string(),
                }),
            )
            .await;

        Ok(WorkingCopy {
            record,
            outcome,
            lease,
        })
    }
}

fn not_found(caller: &str, slug: &str) -> RepoCacheError {
    RepoCacheError::NotFound {
        caller: caller.to_string(),
        slug: slug.to_string(),
    }
}

/// Remove whatever a failed clone left behind
async fn discard_partial(path: &Path) {
    if tokio::fs::metadata(path).await.is_err() {
        return;
    }
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        warn!("Failed to remove partial clone {}: {}", path.display(), e);
    }
}
