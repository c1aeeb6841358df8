//! Review-mode range resolution and the checkpoint contract.
//!
//! The checkpoint is explicit state: a session reads it at the start of an
//! invocation and writes it back only after a successful analysis. Storage
//! lives behind [`CheckpointStore`]; the JSON file store here is one
//! implementation, the in-memory store another.

use crate::error::CheckpointError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// Which range of changes an invocation reviews.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewMode {
    /// Explicit revision range.
    Range { base: String, head: String },
    /// Everything (committed and uncommitted) since the last checkpoint.
    SinceCheckpoint,
}

/// Baseline used when no checkpoint has been recorded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeedPolicy {
    /// Compare against the current HEAD: the first run reviews only
    /// uncommitted work.
    #[default]
    Head,
    /// Compare against the empty tree: the whole worktree is new on the
    /// first run.
    Empty,
}

/// Start of a resolved range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeBase {
    Revision(String),
    Marker(String),
    Head,
    EmptyTree,
}

/// Fully resolved range handed to a [`DiffSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRange {
    pub base: RangeBase,
    /// Revision or marker id of the range end.
    pub head: String,
}

/// Fetches diff text for a range. Implemented by the surrounding VCS layer.
pub trait DiffSource {
    fn diff(&self, range: &DiffRange) -> anyhow::Result<String>;
}

/// Resolve the range for a review mode.
///
/// `current_marker` identifies the state being reviewed now (for example a
/// tree hash of the worktree); it becomes the next checkpoint.
pub fn resolve_range(
    mode: &ReviewMode,
    previous: Option<&Checkpoint>,
    current_marker: &str,
    seed: SeedPolicy,
) -> DiffRange {
    match mode {
        ReviewMode::Range { base, head } => DiffRange {
            base: RangeBase::Revision(base.clone()),
            head: head.clone(),
        },
        ReviewMode::SinceCheckpoint => {
            let base = match previous {
                Some(checkpoint) => RangeBase::Marker(checkpoint.marker_id.clone()),
                None => {
                    info!("No checkpoint recorded; seeding baseline with {:?}", seed);
                    match seed {
                        SeedPolicy::Head => RangeBase::Head,
                        SeedPolicy::Empty => RangeBase::EmptyTree,
                    }
                }
            };
            DiffRange {
                base,
                head: current_marker.to_string(),
            }
        }
    }
}

/// Durable review marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub marker_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    pub fn now(marker_id: impl Into<String>) -> Self {
        Self {
            marker_id: marker_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Storage for the single checkpoint record.
pub trait CheckpointStore {
    /// Take the writer lock; fails with `Conflict` if someone else holds it.
    fn lock(&self) -> Result<(), CheckpointError>;
    fn unlock(&self);
    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError>;
    fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;
}

/// A locked read-then-conditional-write cycle over a store.
pub struct CheckpointSession<'a, S: CheckpointStore + ?Sized> {
    store: &'a S,
    previous: Option<Checkpoint>,
}

impl<'a, S: CheckpointStore + ?Sized> CheckpointSession<'a, S> {
    pub fn begin(store: &'a S) -> Result<Self, CheckpointError> {
        store.lock()?;
        match store.read() {
            Ok(previous) => Ok(Self { store, previous }),
            Err(e) => {
                store.unlock();
                Err(e)
            }
        }
    }

    pub fn previous(&self) -> Option<&Checkpoint> {
        self.previous.as_ref()
    }

    /// Write `next` if the stored record is still the one read at `begin`.
    pub fn commit(self, next: Checkpoint) -> Result<(), CheckpointError> {
        let current = self.store.read()?;
        if current != self.previous {
            return Err(CheckpointError::Conflict(
                "checkpoint changed since this review started".to_string(),
            ));
        }
        self.store.write(&next)?;
        debug!("Checkpoint advanced to {}", next.marker_id);
        Ok(())
    }
}

impl<S: CheckpointStore + ?Sized> Drop for CheckpointSession<'_, S> {
    fn drop(&mut self) {
        self.store.unlock();
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<(bool, Option<Checkpoint>)>,
}

impl MemoryCheckpointStore {
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        Self {
            state: Mutex::new((false, Some(checkpoint))),
        }
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, (bool, Option<Checkpoint>)> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn lock(&self) -> Result<(), CheckpointError> {
        let mut state = self.guard();
        if state.0 {
            return Err(CheckpointError::Conflict("in-memory checkpoint".to_string()));
        }
        state.0 = true;
        Ok(())
    }

    fn unlock(&self) {
        self.guard().0 = false;
    }

    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.guard().1.clone())
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.guard().1 = Some(checkpoint.clone());
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointRecord {
    version: u32,
    marker_id: String,
    updated_at: DateTime<Utc>,
}

/// Who holds a file-store lock. Written into the lock file.
#[derive(Debug, Serialize, Deserialize)]
struct LockHolder {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

/// JSON file store guarded by an exclusively created `<file>.lock`.
///
/// The lock file records the holder's pid and acquisition time. A run that
/// crashed leaves it behind; the conflict error names the file to delete.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn stale_lock_hint(&self) -> String {
        let holder = fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockHolder>(&raw).ok());
        match holder {
            Some(h) => format!(
                "{} (held by pid {} since {}; delete it if that process is gone)",
                self.lock_path.display(),
                h.pid,
                h.acquired_at.to_rfc3339()
            ),
            None => format!(
                "{} (delete it if no other run is active)",
                self.lock_path.display()
            ),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn lock(&self) -> Result<(), CheckpointError> {
        if let Some(parent) = self.lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CheckpointError::Conflict(self.stale_lock_hint()))
            }
            Err(e) => return Err(e.into()),
        };

        let holder = LockHolder {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        };
        let written = serde_json::to_string(&holder)
            .map_err(CheckpointError::from)
            .and_then(|body| file.write_all(body.as_bytes()).map_err(CheckpointError::from));
        if let Err(e) = written {
            self.unlock();
            return Err(e);
        }
        debug!("Checkpoint lock taken: {}", self.lock_path.display());
        Ok(())
    }

    fn unlock(&self) {
        let _ = fs::remove_file(&self.lock_path);
    }

    fn read(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: CheckpointRecord = serde_json::from_str(&content)?;
        Ok(Some(Checkpoint {
            marker_id: record.marker_id,
            timestamp: record.updated_at,
        }))
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let record = CheckpointRecord {
            version: 1,
            marker_id: checkpoint.marker_id.clone(),
            updated_at: checkpoint.timestamp,
        };
        let mut body = serde_json::to_string_pretty(&record)?;
        body.push('\n');
        fs::write(&self.path, body)?;
        Ok(())
    }
}
