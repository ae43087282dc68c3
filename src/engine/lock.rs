//! Run-overlap guard.
//!
//! An exclusive OS advisory lock (`flock` on Unix, `LockFileEx` on Windows)
//! on `cycle.lock_file`, held through an open handle for the whole cycle.
//! The kernel releases it when the handle closes, including when the
//! process dies, so a crashed run never leaves a lock behind. While held,
//! the file carries `{pid, acquired_at, cycle_id}` as JSON so a skipped
//! invocation can report who is running.
//!
//! ```plain
//!   unlocked ──try_lock_exclusive──► held ──drop / process exit──► unlocked
//! ```
//!
//! The file itself is never unlinked: removing it would let a waiter lock
//! the orphaned inode while a newcomer creates and locks a fresh one.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockInfo {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    pub cycle_id: String,
}

impl LockInfo {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        // A timestamp from the future (clock skew) counts as brand new.
        (now - self.acquired_at).to_std().unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug)]
pub enum LockAttempt {
    Acquired(RunLock),
    /// Another run holds the lock. `None` when its details could not be
    /// read, e.g. it has locked but not yet written them.
    Held(Option<LockInfo>),
}

/// Held for the duration of one cycle; released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(path: impl AsRef<Path>, cycle_id: &str) -> Result<LockAttempt> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        if let Err(e) = file.try_lock_exclusive() {
            if is_contended(&e) {
                return Ok(LockAttempt::Held(read_lock(path)));
            }
            return Err(e).with_context(|| format!("Failed to lock {}", path.display()));
        }

        let info = LockInfo {
            pid: std::process::id(),
            acquired_at: Utc::now(),
            cycle_id: cycle_id.to_string(),
        };
        let json = serde_json::to_string(&info)?;
        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| file.write_all(json.as_bytes()))
            .and_then(|_| file.sync_all())
            .with_context(|| format!("Failed to write lock file {}", path.display()))?;

        debug!(path = %path.display(), cycle_id, "Run lock acquired");
        Ok(LockAttempt::Acquired(RunLock {
            file,
            path: path.to_path_buf(),
        }))
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Clear the holder details while still locked; closing the handle
        // releases the lock.
        if let Err(e) = self.file.set_len(0) {
            warn!(path = %self.path.display(), error = %e, "Failed to clear run lock");
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.raw_os_error().is_some() && e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn read_lock(path: &Path) -> Option<LockInfo> {
    let raw = fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
