use std::collections::HashMap;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::debug;

use crate::events::{AppId, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Session {
    pub app_id: AppId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Session {
    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    pub fn minutes(&self) -> f64 {
        self.duration().num_seconds() as f64 / 60.0
    }
}

/// Pairs start and end events per app. Input must be chronological.
#[derive(Debug, Default)]
pub struct SessionReconstructor {
    open: HashMap<AppId, NaiveDateTime>,
}

impl SessionReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: Event) -> Option<Session> {
        if event.is_start {
            // latest start wins when two starts arrive without an end
            self.open.insert(event.app_id, event.timestamp);
            return None;
        }

        let start = self.open.remove(&event.app_id)?;
        if event.timestamp < start {
            debug!(
                app_id = %event.app_id,
                %start,
                end = %event.timestamp,
                "dropping session that ends before it starts"
            );
            return None;
        }

        Some(Session {
            app_id: event.app_id,
            start,
            end: event.timestamp,
        })
    }

    pub fn open_sessions(&self) -> Vec<(AppId, NaiveDateTime)> {
        let mut open: Vec<(AppId, NaiveDateTime)> = self
            .open
            .iter()
            .map(|(app_id, start)| (*app_id, *start))
            .collect();
        open.sort();
        open
    }

    pub fn finish(self) {
        if !self.open.is_empty() {
            debug!(
                open = self.open.len(),
                "discarding sessions still open at end of input"
            );
        }
    }
}

pub fn reconstruct<I>(events: I) -> Vec<Session>
where
    I: IntoIterator<Item = Event>,
{
    let mut reconstructor = SessionReconstructor::new();
    let sessions = events
        .into_iter()
        .filter_map(|event| reconstructor.observe(event))
        .collect();
    reconstructor.finish();
    sessions
}
