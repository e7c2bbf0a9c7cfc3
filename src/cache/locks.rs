//! Per-working-copy mutual exclusion
//!
//! One async mutex per working-copy path, optionally backed by an exclusive
//! lock file so that separate processes sharing a base directory exclude
//! each other too. Materialization and command runs hold the lease for
//! their whole duration, so concurrent requests for the same
//! (caller, slug) queue behind the first and then see its result. The
//! eviction sweep only ever `try_acquire`s: a busy entry is deferred to the
//! next sweep instead of being deleted underneath a running command.
//!
//! Lock files live outside the working copies and are never deleted: a
//! process may already have one open and be waiting on it.

use crate::error::{RepoCacheError, RepoCacheResult};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// How often a blocked `acquire` retries another process's lock file
const LOCK_RETRY: Duration = Duration::from_millis(50);

/// Table of per-path locks
#[derive(Default)]
pub struct KeyedLocks {
    slots: Mutex<HashMap<PathBuf, Slot>>,
    lock_dir: Option<PathBuf>,
}

/// Exclusive hold on one working copy; released on drop
#[derive(Debug)]
pub struct Lease {
    path: PathBuf,
    _file: Option<File>,
    _guard: OwnedMutexGuard<()>,
}

impl Lease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyedLocks {
    /// Locks that only exclude callers in this process
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks that also take an exclusive lock file under `dir`
    pub fn with_lock_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            slots: Mutex::default(),
            lock_dir: Some(dir.into()),
        }
    }

    pub fn lock_dir(&self) -> Option<&Path> {
        self.lock_dir.as_deref()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<PathBuf, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, path: &Path) -> Slot {
        self.slots()
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    /// Wait until `path` is free in this and every other process, then
    /// hold it
    pub async fn acquire(&self, path: &Path) -> RepoCacheResult<Lease> {
        let guard = self.slot(path).lock_owned().await;

        let file = match self.lock_dir {
            Some(ref dir) => {
                let file = open_lock_file(dir, path)?;
                loop {
                    if try_lock(&file, path)? {
                        break;
                    }
                    tokio::time::sleep(LOCK_RETRY).await;
                }
                Some(file)
            }
            None => None,
        };

        Ok(Lease {
            path: path.to_path_buf(),
            _file: file,
            _guard: guard,
        })
    }

    /// Hold `path` only if nobody else does, in any process
    pub fn try_acquire(&self, path: &Path) -> RepoCacheResult<Option<Lease>> {
        let Ok(guard) = self.slot(path).try_lock_owned() else {
            return Ok(None);
        };

        let file = match self.lock_dir {
            Some(ref dir) => {
                let file = open_lock_file(dir, path)?;
                if !try_lock(&file, path)? {
                    debug!("{} is locked by another process", path.display());
                    return Ok(None);
                }
                Some(file)
            }
            None => None,
        };

        Ok(Some(Lease {
            path: path.to_path_buf(),
            _file: file,
            _guard: guard,
        }))
    }

    /// Whether a lease on `path` is held in this process
    pub fn is_held(&self, path: &Path) -> bool {
        self.slots()
            .get(path)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Drop slots nobody holds or waits on
    pub fn prune(&self) {
        self.slots().retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `{dir}/<hash of path>.lock`
fn lock_file_path(dir: &Path, path: &Path) -> PathBuf {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    dir.join(format!("{}.lock", hex::encode(&digest[..16])))
}

fn open_lock_file(dir: &Path, path: &Path) -> RepoCacheResult<File> {
    std::fs::create_dir_all(dir)
        .map_err(|e| RepoCacheError::io(format!("creating lock dir {}", dir.display()), e))?;

    let lock_path = lock_file_path(dir, path);
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| RepoCacheError::io(format!("opening lock {}", lock_path.display()), e))
}

/// `Ok(false)` when another holder has the lock
fn try_lock(file: &File, path: &Path) -> RepoCacheResult<bool> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(RepoCacheError::io(
            format!("locking {}", path.display()),
            e,
        )),
    }
}
