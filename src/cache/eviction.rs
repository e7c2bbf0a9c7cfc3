//! Time-based eviction of working copies
//!
//! A sweep has two passes:
//!
//! 1. Record-driven: every record idle longer than the TTL loses its
//!    directory (best effort) and then the record itself.
//! 2. Disk-driven: slug directories with no record and an mtime older than
//!    the TTL are orphans from an interrupted clone and are removed.
//!
//! Entries locked by an in-flight checkout or run are skipped and counted as
//! deferred; the next sweep picks them up.

use crate::cache::locks::Lease;
use crate::cache::orchestrator::RepoCache;
use crate::cache::slug::Slug;
use crate::error::{RepoCacheError, RepoCacheResult};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Slugs whose record and directory were removed
    pub evicted: Vec<String>,
    /// Unrecorded directories removed
    pub orphans_removed: usize,
    /// Expired entries skipped because they were in use
    pub deferred: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.evicted.is_empty() && self.orphans_removed == 0 && self.deferred == 0
    }
}

impl RepoCache {
    /// Run one eviction sweep against the current time
    pub async fn sweep(&self) -> RepoCacheResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one eviction sweep as if the time were `now`
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> RepoCacheResult<SweepReport> {
        let ttl = chrono::Duration::from_std(self.ttl)
            .map_err(|e| RepoCacheError::Internal(format!("TTL out of range: {}", e)))?;
        let mut report = SweepReport::default();

        for record in self.records.list().await? {
            if !record.is_expired(ttl, now) {
                continue;
            }

            let caller = record.caller_identity.as_str();
            let path = match Slug::parse(&record.slug)
                .ok_or_else(|| RepoCacheError::Internal(format!("bad slug {}", record.slug)))
                .and_then(|slug| self.layout.path_for(caller, &slug))
            {
                Ok(path) => path,
                Err(e) => {
                    warn!("Dropping unusable record {}: {}", record.slug, e);
                    self.records.delete(caller, &record.slug).await?;
                    continue;
                }
            };

            let Some(_lease) = self.try_lease(&path) else {
                debug!("Deferring eviction of {}: in use", path.display());
                report.deferred += 1;
                continue;
            };

            // A run may have touched the record between list() and the lock
            match self.records.get(caller, &record.slug).await? {
                Some(fresh) if !fresh.is_expired(ttl, now) => continue,
                _ => {}
            }

            remove_working_copy(&path).await;
            self.records.delete(caller, &record.slug).await?;

            info!("Evicted {} for '{}'", record.slug, caller);
            self.audit
                .log(
                    "working_copy.evicted",
                    &serde_json::json!({
                        "slug": record.slug,
                        "caller": caller,
                        "last_used_at": record.last_used_at.to_rfc3339(),
                    }),
                )
                .await;
            report.evicted.push(record.slug.clone());
        }

        for entry in self.layout.scan().await {
            let stale = entry
                .modified
                .map(|m| now - DateTime::<Utc>::from(m) > ttl)
                .unwrap_or(true);
            if !stale {
                continue;
            }

            if self.is_recorded(&entry.caller, &entry.slug).await? {
                continue;
            }

            let Some(_lease) = self.try_lease(&entry.path) else {
                report.deferred += 1;
                continue;
            };

            // A clone may have finished between the check and the lock
            if self.is_recorded(&entry.caller, &entry.slug).await? {
                continue;
            }

            info!("Removing orphaned working copy {}", entry.path.display());
            remove_working_copy(&entry.path).await;
            report.orphans_removed += 1;
        }

        self.locks.prune();
        Ok(report)
    }

    async fn is_recorded(&self, caller: &str, slug: &Slug) -> RepoCacheResult<bool> {
        Ok(self.records.get(caller, slug.as_str()).await?.is_some())
    }

    /// A lease for the sweep, or `None` if the entry is busy or its lock
    /// cannot be taken
    fn try_lease(&self, path: &Path) -> Option<Lease> {
        match self.locks.try_acquire(path) {
            Ok(lease) => lease,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                None
            }
        }
    }
}

async fn remove_working_copy(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

/// Start the periodic sweep on the current runtime.
///
/// Call once per process; abort the handle to stop it.
pub fn spawn_eviction(cache: Arc<RepoCache>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match cache.sweep().await {
                Ok(report) if report.is_empty() => debug!("Eviction sweep: nothing to do"),
                Ok(report) => info!(
                    "Eviction sweep: {} evicted, {} orphans removed, {} deferred",
                    report.evicted.len(),
                    report.orphans_removed,
                    report.deferred
                ),
                Err(e) => warn!("Eviction sweep failed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::layout::Layout;
    use crate::cache::record::{CacheRecord, JsonRecordStore, MemoryRecordStore, RecordStore};
    use crate::test_support::{CountingCloner, FixedResolver, SHA};
    use tempfile::TempDir;

    const URL: &str = "https://github.com/acme/widgets";
    const TTL: Duration = Duration::from_secs(12 * 60 * 60);

    fn cache(temp: &TempDir) -> RepoCache {
        RepoCache::new(
            Layout::new(temp.path()),
            Arc::new(MemoryRecordStore::new()),
            Arc::new(FixedResolver::new(SHA)),
            Arc::new(CountingCloner::new()),
        )
        .with_ttl(TTL)
    }

    /// One of several instances sharing records and lock files on disk
    fn shared_cache(temp: &TempDir) -> RepoCache {
        RepoCache::new(
            Layout::new(temp.path().join("envs")),
            Arc::new(JsonRecordStore::new(temp.path().join("records"))),
            Arc::new(FixedResolver::new(SHA)),
            Arc::new(CountingCloner::new()),
        )
        .with_ttl(TTL)
        .with_lock_dir(temp.path().join("locks"))
    }

    async fn age_record(cache: &RepoCache, record: &CacheRecord, by: chrono::Duration) {
        let mut aged = record.clone();
        aged.last_used_at = Utc::now() - by;
        cache.records().upsert(&aged).await.unwrap();
    }

    fn ttl() -> chrono::Duration {
        chrono::Duration::from_std(TTL).unwrap()
    }

    #[tokio::test]
    async fn expired_copy_is_removed_everywhere() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let record = cache.ensure_working_copy(URL, "user_42").await.unwrap();
        let path = temp.path().join("user_42").join(&record.slug);

        age_record(&cache, &record, ttl() + chrono::Duration::seconds(1)).await;
        let report = cache.sweep().await.unwrap();

        assert_eq!(report.evicted, vec![record.slug.clone()]);
        assert!(!path.exists());
        assert!(cache.records().get("user_42", &record.slug).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fresh_copy_survives() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let record = cache.ensure_working_copy(URL, "user_42").await.unwrap();

        let report = cache.sweep().await.unwrap();

        assert!(report.is_empty());
        assert!(temp.path().join("user_42").join(&record.slug).is_dir());
        assert!(cache.records().get("user_42", &record.slug).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn in_use_copy_is_deferred() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let copy = cache.checkout(URL, "user_42").await.unwrap();
        let record = copy.record.clone();
        age_record(&cache, &record, ttl() * 2).await;

        let report = cache.sweep().await.unwrap();
        assert_eq!(report.deferred, 1);
        assert!(copy.path().is_dir());

        drop(copy);
        let report = cache.sweep().await.unwrap();
        assert_eq!(report.evicted.len(), 1);
    }

    #[tokio::test]
    async fn lease_in_another_instance_defers_eviction() {
        let temp = TempDir::new().unwrap();
        let runner_side = shared_cache(&temp);
        let sweeper_side = shared_cache(&temp);

        let copy = runner_side.checkout(URL, "user_42").await.unwrap();
        let later = Utc::now() + ttl() + chrono::Duration::seconds(5);

        let report = sweeper_side.sweep_at(later).await.unwrap();
        assert_eq!(report.deferred, 1);
        assert!(report.evicted.is_empty());
        assert!(copy.path().join("README.md").is_file());

        drop(copy);
        let report = sweeper_side.sweep_at(later).await.unwrap();
        assert_eq!(report.evicted.len(), 1);
        assert!(!temp.path().join("envs").join("user_42").join(&report.evicted[0]).exists());
    }

    #[tokio::test]
    async fn orphans_are_removed_once_stale() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let orphan = temp
            .path()
            .join("anonymous")
            .join(format!("acme-widgets-{}", SHA));
        std::fs::create_dir_all(&orphan).unwrap();

        // Young orphan: could still be adopted
        let report = cache.sweep().await.unwrap();
        assert_eq!(report.orphans_removed, 0);
        assert!(orphan.is_dir());

        let report = cache
            .sweep_at(Utc::now() + ttl() + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(report.orphans_removed, 1);
        assert!(!orphan.exists());
    }

    #[tokio::test]
    async fn recorded_directories_are_not_orphans() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let record = cache.ensure_working_copy(URL, "anon_10001").await.unwrap();
        // Keep the record fresh while the directory mtime looks ancient
        let far_future = Utc::now() + ttl() * 3;
        cache
            .records()
            .touch("anon_10001", &record.slug, far_future)
            .await
            .unwrap();

        let report = cache.sweep_at(far_future).await.unwrap();

        assert_eq!(report.orphans_removed, 0);
        assert!(temp
            .path()
            .join("anonymous")
            .join("anon_10001")
            .join(&record.slug)
            .is_dir());
    }

    #[tokio::test]
    async fn scheduler_sweeps_periodically() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(cache(&temp));
        let record = cache.ensure_working_copy(URL, "user_42").await.unwrap();
        age_record(&cache, &record, ttl() + chrono::Duration::seconds(1)).await;

        let handle = spawn_eviction(cache.clone(), Duration::from_millis(20));

        let mut gone = false;
        for _ in 0..100 {
            if cache.records().list().await.unwrap().is_empty() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(gone);
        assert!(!temp.path().join("user_42").join(&record.slug).exists());
    }
}
