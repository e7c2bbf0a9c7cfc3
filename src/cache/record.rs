//! Durable cache records
//!
//! A record says "caller X has a working copy of slug S, last used at T".
//! Records and directories fail independently, so nothing here assumes a
//! record implies a directory or the other way round.

use crate::cache::slug::Slug;
use crate::error::{RepoCacheError, RepoCacheResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokio::fs;
use tracing::{debug, warn};

/// Cache record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Cache key
    pub slug: String,

    /// Repository the working copy was cloned from; unknown for adopted
    /// directories reached by slug alone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Opaque caller identity (empty for anonymous)
    pub caller_identity: String,

    pub created_at: DateTime<Utc>,

    pub last_used_at: DateTime<Utc>,
}

impl CacheRecord {
    pub fn new(slug: &Slug, source_url: Option<String>, caller: &str) -> Self {
        let now = Utc::now();
        Self {
            slug: slug.to_string(),
            source_url,
            caller_identity: caller.to_string(),
            created_at: now,
            last_used_at: now,
        }
    }

    /// Whether the record has been idle longer than `ttl` at `now`
    pub fn is_expired(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.last_used_at > ttl
    }
}

/// Persistence for cache records, keyed by (caller, slug).
///
/// Writes are narrow and idempotent; last writer wins.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, caller: &str, slug: &str) -> RepoCacheResult<Option<CacheRecord>>;

    /// Insert or replace the record for (caller, slug)
    async fn upsert(&self, record: &CacheRecord) -> RepoCacheResult<()>;

    /// Remove the record; absent records are not an error
    async fn delete(&self, caller: &str, slug: &str) -> RepoCacheResult<()>;

    async fn list(&self) -> RepoCacheResult<Vec<CacheRecord>>;

    /// Bump `last_used_at`; returns false if there was no record
    async fn touch(&self, caller: &str, slug: &str, at: DateTime<Utc>) -> RepoCacheResult<bool> {
        match self.get(caller, slug).await? {
            Some(mut record) => {
                record.last_used_at = at;
                self.upsert(&record).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Stable file stem for (caller, slug): identities are opaque, so they are
/// hashed rather than embedded in file names.
fn record_key(caller: &str, slug: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(caller.as_bytes());
    hasher.update([0u8]);
    hasher.update(slug.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..12])
}

/// One JSON file per record under a directory
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_path(&self, caller: &str, slug: &str) -> PathBuf {
        self.dir.join(format!("{}.json", record_key(caller, slug)))
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn get(&self, caller: &str, slug: &str) -> RepoCacheResult<Option<CacheRecord>> {
        let path = self.file_path(caller, slug);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RepoCacheError::io(
                    format!("reading record {}", path.display()),
                    e,
                ))
            }
        };

        match serde_json::from_str::<CacheRecord>(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // A torn write reads as "no record"; reconciliation recreates it.
                warn!("Ignoring unreadable record {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    async fn upsert(&self, record: &CacheRecord) -> RepoCacheResult<()> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RepoCacheError::io("creating records directory", e))?;

        let path = self.file_path(&record.caller_identity, &record.slug);
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(record)?;

        fs::write(&tmp, content)
            .await
            .map_err(|e| RepoCacheError::io(format!("writing record {}", tmp.display()), e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| RepoCacheError::io(format!("replacing record {}", path.display()), e))?;

        debug!("Stored record {} for '{}'", record.slug, record.caller_identity);
        Ok(())
    }

    async fn delete(&self, caller: &str, slug: &str) -> RepoCacheResult<()> {
        let path = self.file_path(caller, slug);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RepoCacheError::io(
                format!("deleting record {}", path.display()),
                e,
            )),
        }
    }

    async fn list(&self) -> RepoCacheResult<Vec<CacheRecord>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }

        let mut records = vec![];
        let mut entries = fs::read_dir(&self.dir)
            .await
            .map_err(|e| RepoCacheError::io("reading records directory", e))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepoCacheError::io("reading record entry", e))?
        {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let content = fs::read_to_string(&path).await.ok();
                if let Some(content) = content {
                    if let Ok(record) = serde_json::from_str::<CacheRecord>(&content) {
                        records.push(record);
                    }
                }
            }
        }

        // Least recently used first
        records.sort_by(|a, b| a.last_used_at.cmp(&b.last_used_at));

        Ok(records)
    }
}

/// Process-local record store
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<(String, String), CacheRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), CacheRecord>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, caller: &str, slug: &str) -> RepoCacheResult<Option<CacheRecord>> {
        Ok(self
            .records()
            .get(&(caller.to_string(), slug.to_string()))
            .cloned())
    }

    async fn upsert(&self, record: &CacheRecord) -> RepoCacheResult<()> {
        self.records().insert(
            (record.caller_identity.clone(), record.slug.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn delete(&self, caller: &str, slug: &str) -> RepoCacheResult<()> {
        self.records()
            .remove(&(caller.to_string(), slug.to_string()));
        Ok(())
    }

    async fn list(&self) -> RepoCacheResult<Vec<CacheRecord>> {
        let mut records: Vec<CacheRecord> = self.records().values().cloned().collect();
        records.sort_by(|a, b| a.last_used_at.cmp(&b.last_used_at));
        Ok(records)
    }
}
