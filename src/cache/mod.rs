//! Per-caller working copies of remote repositories
//!
//! Working copies are keyed by slug (`owner-repo-sha`) and namespaced by
//! caller identity. Two independent stores describe the cache:
//!
//! | Store | Holds |
//! |-------|-------|
//! | Record store | caller, slug, source URL, timestamps |
//! | Filesystem | `{base_dir}/{namespace}/{slug}/` |
//!
//! Either can be missing an entry the other has; the orchestrator reconciles
//! the two on every access and the eviction sweep cleans up both.

pub mod eviction;
pub mod layout;
pub mod locks;
pub mod orchestrator;
pub mod record;
pub mod slug;

pub use eviction::{spawn_eviction, SweepReport};
pub use layout::{DiskEntry, Layout};
pub use locks::{KeyedLocks, Lease};
pub use orchestrator::{Reconciliation, RepoCache, WorkingCopy};
pub use record::{CacheRecord, JsonRecordStore, MemoryRecordStore, RecordStore};
pub use slug::{generate_slug, CommitResolver, GithubResolver, RepoRef, Slug};
