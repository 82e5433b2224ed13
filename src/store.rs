use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::events::AppId;
use crate::sessions::Session;

const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

type Span = (NaiveDateTime, NaiveDateTime);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStore {
    apps: BTreeMap<AppId, BTreeSet<Span>>,
}

// {"schema_version": 1, "apps": {"42": [[1704103200, 1704108600]]}}
// Timestamps are the log's naive local clock read as UTC epoch seconds.
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    apps: BTreeMap<AppId, Vec<(i64, i64)>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_sessions<I>(sessions: I) -> Self
    where
        I: IntoIterator<Item = Session>,
    {
        let mut store = Self::new();
        store.extend(sessions);
        store
    }

    /// Returns `true` when the session was added. Sessions ending before they
    /// start are refused.
    pub fn insert(&mut self, session: Session) -> bool {
        if session.end < session.start {
            debug!(
                app_id = %session.app_id,
                start = %session.start,
                end = %session.end,
                "refusing session that ends before it starts"
            );
            return false;
        }
        self.apps
            .entry(session.app_id)
            .or_default()
            .insert((session.start, session.end))
    }

    pub fn extend<I>(&mut self, sessions: I)
    where
        I: IntoIterator<Item = Session>,
    {
        for session in sessions {
            self.insert(session);
        }
    }

    pub fn merge(old: SessionStore, new: SessionStore) -> SessionStore {
        let mut merged = old;
        merged.merge_from(new);
        merged
    }

    pub fn merge_from(&mut self, other: SessionStore) -> usize {
        let mut added = 0;
        for (app_id, spans) in other.apps {
            let target = self.apps.entry(app_id).or_default();
            for span in spans {
                if target.insert(span) {
                    added += 1;
                }
            }
        }
        added
    }

    pub fn is_empty(&self) -> bool {
        self.apps.values().all(BTreeSet::is_empty)
    }

    pub fn session_count(&self) -> usize {
        self.apps.values().map(BTreeSet::len).sum()
    }

    pub fn app_ids(&self) -> Vec<AppId> {
        self.apps.keys().copied().collect()
    }

    pub fn sessions_for(&self, app_id: AppId) -> impl Iterator<Item = Session> + '_ {
        self.apps
            .get(&app_id)
            .into_iter()
            .flatten()
            .map(move |(start, end)| Session {
                app_id,
                start: *start,
                end: *end,
            })
    }

    pub fn sessions(&self) -> impl Iterator<Item = Session> + '_ {
        self.apps.iter().flat_map(|(app_id, spans)| {
            spans.iter().map(move |(start, end)| Session {
                app_id: *app_id,
                start: *start,
                end: *end,
            })
        })
    }

    pub fn total_minutes_for(&self, app_id: AppId) -> f64 {
        self.sessions_for(app_id).map(|session| session.minutes()).sum()
    }

    /// Reads the snapshot at `path`. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(path).map_err(|source| StorageError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed: SnapshotFile =
            serde_json::from_str(&raw).map_err(|source| StorageError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        let mut store = Self::new();
        for (app_id, spans) in parsed.apps {
            let target = store.apps.entry(app_id).or_default();
            for (start, end) in spans {
                let invalid = || StorageError::InvalidSpan {
                    path: path.to_path_buf(),
                    app_id,
                    start,
                    end,
                };
                if end < start {
                    return Err(invalid());
                }
                let start_at = from_epoch(start).ok_or_else(invalid)?;
                let end_at = from_epoch(end).ok_or_else(invalid)?;
                target.insert((start_at, end_at));
            }
        }
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let snapshot = SnapshotFile {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            apps: self
                .apps
                .iter()
                .filter(|(_, spans)| !spans.is_empty())
                .map(|(app_id, spans)| {
                    let pairs = spans
                        .iter()
                        .map(|(start, end)| (to_epoch(*start), to_epoch(*end)))
                        .collect();
                    (*app_id, pairs)
                })
                .collect(),
        };
        let data =
            serde_json::to_string(&snapshot).map_err(|source| StorageError::Encode {
                path: path.to_path_buf(),
                source,
            })?;
        write_atomic(path, data.as_bytes())
    }
}

pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let write_err = |source: std::io::Error| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|err| write_err(err.error))?;
    Ok(())
}

fn to_epoch(at: NaiveDateTime) -> i64 {
    at.and_utc().timestamp()
}

fn from_epoch(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|at| at.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::parse_events;
    use crate::sessions::reconstruct;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .and_then(|d| d.and_hms_opt(h, m, 0))
            .expect("valid timestamp")
    }

    fn session(app: u32, start: NaiveDateTime, end: NaiveDateTime) -> Session {
        Session {
            app_id: AppId(app),
            start,
            end,
        }
    }

    const LOG: [&str; 6] = [
        "[2024-01-01 10:00:00] AppID 42 state changed : App Running",
        "[2024-01-01 11:30:00] AppID 42 state changed : Fully Installed",
        "[2024-01-02 20:00:00] AppID 7 state changed : App Running",
        "[2024-01-02 21:00:00] AppID 7 state changed : Fully Installed",
        "[2024-01-03 08:00:00] AppID 42 state changed : App Running",
        "[2024-01-03 08:15:00] AppID 42 state changed : Fully Installed",
    ];

    #[test]
    fn duplicate_sessions_collapse() {
        let mut store = SessionStore::new();
        assert!(store.insert(session(42, at(1, 10, 0), at(1, 11, 0))));
        assert!(!store.insert(session(42, at(1, 10, 0), at(1, 11, 0))));
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn session_ending_before_start_is_refused() {
        let mut store = SessionStore::new();
        assert!(!store.insert(session(42, at(1, 10, 0), at(1, 9, 0))));
        assert!(!store.insert(session(42, at(2, 10, 0), at(1, 9, 0))));
        assert!(store.is_empty());
        assert!(store.app_ids().is_empty());

        let store = SessionStore::from_sessions([
            session(42, at(2, 10, 0), at(1, 9, 0)),
            session(42, at(1, 10, 0), at(1, 10, 0)),
        ]);
        assert_eq!(store.session_count(), 1);
    }

    #[test]
    fn merging_same_logs_again_is_idempotent() {
        let first = SessionStore::from_sessions(reconstruct(parse_events(LOG)));
        let again = SessionStore::from_sessions(reconstruct(parse_events(LOG)));
        let merged = SessionStore::merge(first.clone(), again);
        assert_eq!(merged, first);
        assert_eq!(merged.session_count(), 3);
    }

    #[test]
    fn merge_unions_per_app() {
        let old = SessionStore::from_sessions([
            session(1, at(1, 9, 0), at(1, 10, 0)),
            session(2, at(1, 12, 0), at(1, 13, 0)),
        ]);
        let new = SessionStore::from_sessions([
            session(2, at(1, 12, 0), at(1, 13, 0)),
            session(2, at(2, 12, 0), at(2, 12, 30)),
            session(3, at(2, 18, 0), at(2, 19, 0)),
        ]);

        let mut merged = old.clone();
        let added = merged.merge_from(new);

        assert_eq!(added, 2);
        assert_eq!(merged.app_ids(), vec![AppId(1), AppId(2), AppId(3)]);
        assert_eq!(merged.sessions_for(AppId(1)).count(), 1);
        assert_eq!(merged.sessions_for(AppId(2)).count(), 2);
        assert_eq!(merged.sessions_for(AppId(3)).count(), 1);
        assert_eq!(merged.total_minutes_for(AppId(2)), 90.0);
    }

    #[test]
    fn overlapping_rotated_logs_do_not_duplicate() {
        let previous = &LOG[..4];
        let current = &LOG[2..];
        let lines = previous.iter().chain(current.iter());
        let store = SessionStore::from_sessions(reconstruct(parse_events(lines)));
        assert_eq!(store.session_count(), 3);
    }

    #[test]
    fn missing_snapshot_loads_empty() {
        let tmp = TempDir::new().expect("temp dir");
        let store = SessionStore::load(&tmp.path().join("sessions.json")).expect("load");
        assert!(store.is_empty());
    }

    #[test]
    fn snapshot_roundtrip_preserves_sessions() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("nested").join("sessions.json");
        let store = SessionStore::from_sessions(reconstruct(parse_events(LOG)));

        store.save(&path).expect("save");
        let loaded = SessionStore::load(&path).expect("load");

        assert_eq!(loaded, store);
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("sessions.json");
        SessionStore::from_sessions([session(1, at(1, 9, 0), at(1, 10, 0))])
            .save(&path)
            .expect("first save");
        let bigger = SessionStore::from_sessions(reconstruct(parse_events(LOG)));
        bigger.save(&path).expect("second save");

        assert_eq!(SessionStore::load(&path).expect("load"), bigger);
        let leftovers = fs::read_dir(tmp.path()).expect("read dir").count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("sessions.json");
        fs::write(&path, "{not json").expect("write");
        assert!(matches!(
            SessionStore::load(&path),
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[test]
    fn reversed_span_is_rejected() {
        let tmp = TempDir::new().expect("temp dir");
        let path = tmp.path().join("sessions.json");
        fs::write(&path, r#"{"schema_version":1,"apps":{"42":[[200,100]]}}"#).expect("write");
        assert!(matches!(
            SessionStore::load(&path),
            Err(StorageError::InvalidSpan { app_id: AppId(42), .. })
        ));
    }
}
