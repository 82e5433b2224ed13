use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config;
use crate::store::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub pid: u32,
    pub started_at: NaiveDateTime,
    pub snapshot: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
pub enum LockHolder {
    Free,
    /// The record is missing when the holder has not written it yet.
    Held(Option<RunRecord>),
}

pub struct RunLock {
    file: File,
    record_path: PathBuf,
    pid: u32,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if read_record(&self.record_path).is_some_and(|record| record.pid == self.pid) {
            let _ = fs::remove_file(&self.record_path);
        }
        let _ = self.file.unlock();
    }
}

pub fn acquire(snapshot: &Path) -> Result<RunLock> {
    acquire_at(&config::lock_path(), &config::run_record_path(), snapshot)
}

pub fn inspect() -> Result<LockHolder> {
    inspect_at(&config::lock_path(), &config::run_record_path())
}

fn acquire_at(lock_path: &Path, record_path: &Path, snapshot: &Path) -> Result<RunLock> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create lock directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;

    if file.try_lock_exclusive().is_err() {
        match read_record(record_path) {
            Some(record) => bail!(
                "another steam-playtime run (PID {}, started {}) is updating {}; wait for it to finish",
                record.pid,
                record.started_at.format("%Y-%m-%d %H:%M:%S"),
                record.snapshot.display()
            ),
            None => bail!("another steam-playtime run holds the lock; wait for it to finish"),
        }
    }

    let record = RunRecord {
        pid: std::process::id(),
        started_at: Local::now().naive_local(),
        snapshot: snapshot.to_path_buf(),
    };
    let lock = RunLock {
        file,
        record_path: record_path.to_path_buf(),
        pid: record.pid,
    };
    write_atomic(record_path, &serde_json::to_vec_pretty(&record)?)?;
    debug!(pid = record.pid, lock = %lock_path.display(), "acquired run lock");
    Ok(lock)
}

// Read-only: a stale record left by a crashed run is ignored, not removed.
fn inspect_at(lock_path: &Path, record_path: &Path) -> Result<LockHolder> {
    if !lock_path.exists() {
        return Ok(LockHolder::Free);
    }
    let file = File::open(lock_path)
        .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;
    if file.try_lock_shared().is_ok() {
        let _ = file.unlock();
        return Ok(LockHolder::Free);
    }
    Ok(LockHolder::Held(read_record(record_path)))
}

fn read_record(path: &Path) -> Option<RunRecord> {
    let raw = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(record) => Some(record),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "ignoring unreadable run record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct LockPaths {
        _tmp: TempDir,
        lock: PathBuf,
        record: PathBuf,
        snapshot: PathBuf,
    }

    fn lock_paths() -> LockPaths {
        let tmp = TempDir::new().expect("temp dir");
        LockPaths {
            lock: tmp.path().join("steam-playtime.lock"),
            record: tmp.path().join("steam-playtime.run.json"),
            snapshot: tmp.path().join("sessions.json"),
            _tmp: tmp,
        }
    }

    #[test]
    fn held_lock_exposes_run_record_until_dropped() {
        let paths = lock_paths();
        let lock = acquire_at(&paths.lock, &paths.record, &paths.snapshot).expect("acquire");

        match inspect_at(&paths.lock, &paths.record).expect("inspect held") {
            LockHolder::Held(Some(record)) => {
                assert_eq!(record.pid, std::process::id());
                assert_eq!(record.snapshot, paths.snapshot);
            }
            other => panic!("expected a held lock with a record, got {other:?}"),
        }

        drop(lock);
        assert_eq!(
            inspect_at(&paths.lock, &paths.record).expect("inspect free"),
            LockHolder::Free
        );
        assert!(!paths.record.exists());
    }

    #[test]
    fn second_run_is_refused_with_holder_details() {
        let paths = lock_paths();
        let _lock = acquire_at(&paths.lock, &paths.record, &paths.snapshot).expect("acquire");

        let err = acquire_at(&paths.lock, &paths.record, &paths.snapshot)
            .err()
            .expect("second acquire must fail");
        let message = err.to_string();
        assert!(message.contains(&format!("PID {}", std::process::id())));
        assert!(message.contains("sessions.json"));
    }

    #[test]
    fn inspecting_a_free_lock_leaves_stale_record_alone() {
        let paths = lock_paths();
        fs::write(&paths.lock, "").expect("lock file");
        let stale = RunRecord {
            pid: 1,
            started_at: NaiveDateTime::parse_from_str("2024-01-05 23:50:00", "%Y-%m-%d %H:%M:%S")
                .expect("timestamp"),
            snapshot: paths.snapshot.clone(),
        };
        fs::write(&paths.record, serde_json::to_string(&stale).expect("encode")).expect("record");

        assert_eq!(
            inspect_at(&paths.lock, &paths.record).expect("inspect"),
            LockHolder::Free
        );
        assert!(paths.record.exists());
    }

    #[test]
    fn missing_lock_file_means_free() {
        let paths = lock_paths();
        assert_eq!(
            inspect_at(&paths.lock, &paths.record).expect("inspect"),
            LockHolder::Free
        );
        assert!(!paths.lock.exists());
    }
}
