use std::path::PathBuf;

use thiserror::Error;

use crate::events::AppId;

/// A persisted file exists but cannot be used. Always fatal for the run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} holds an invalid session for app {app_id}: [{start}, {end}]", .path.display())]
    InvalidSpan {
        path: PathBuf,
        app_id: AppId,
        start: i64,
        end: i64,
    },
    #[error("failed to serialize {}", .path.display())]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("no play sessions recorded yet; nothing to aggregate")]
pub struct EmptyDataError;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[error("failed to resolve a name for app {app_id}: {reason}")]
pub struct ResolutionError {
    pub app_id: AppId,
    pub reason: String,
}
