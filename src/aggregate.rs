use chrono::{Days, NaiveDate};

use crate::error::EmptyDataError;
use crate::events::AppId;
use crate::store::SessionStore;

/// Row `i` belongs to `app_ids[i]`; column `j` is `first_day + j` days.
#[derive(Debug, Clone, PartialEq)]
pub struct DayMatrix {
    pub app_ids: Vec<AppId>,
    pub first_day: NaiveDate,
    pub minutes: Vec<Vec<f64>>,
}

impl DayMatrix {
    pub fn day_count(&self) -> usize {
        self.minutes.first().map_or(0, Vec::len)
    }

    pub fn last_day(&self) -> NaiveDate {
        self.day_at(self.day_count().saturating_sub(1))
    }

    pub fn days(&self) -> Vec<NaiveDate> {
        (0..self.day_count()).map(|index| self.day_at(index)).collect()
    }

    pub fn row(&self, app_id: AppId) -> Option<&[f64]> {
        let index = self.app_ids.iter().position(|id| *id == app_id)?;
        self.minutes.get(index).map(Vec::as_slice)
    }

    pub fn row_total(&self, index: usize) -> f64 {
        self.minutes.get(index).map_or(0.0, |row| row.iter().sum())
    }

    pub fn max_value(&self) -> f64 {
        self.minutes
            .iter()
            .flatten()
            .copied()
            .fold(0.0, f64::max)
    }

    fn day_at(&self, index: usize) -> NaiveDate {
        self.first_day
            .checked_add_days(Days::new(index as u64))
            .unwrap_or(NaiveDate::MAX)
    }
}

pub fn aggregate(store: &SessionStore) -> Result<DayMatrix, EmptyDataError> {
    let min_start = store.sessions().map(|session| session.start).min();
    let max_end = store.sessions().map(|session| session.end).max();
    let (Some(min_start), Some(max_end)) = (min_start, max_end) else {
        return Err(EmptyDataError);
    };

    let first_day = min_start.date();
    let day_count =
        usize::try_from((max_end.date() - first_day).num_days()).map_or(1, |span| span + 1);

    // frozen once; rows and legend both index through this list
    let app_ids: Vec<AppId> = store
        .app_ids()
        .into_iter()
        .filter(|app_id| store.sessions_for(*app_id).next().is_some())
        .collect();
    let mut minutes = vec![vec![0.0; day_count]; app_ids.len()];

    for (row, app_id) in minutes.iter_mut().zip(&app_ids) {
        for session in store.sessions_for(*app_id) {
            let offset = (session.start.date() - first_day).num_days();
            let cell = usize::try_from(offset)
                .ok()
                .and_then(|index| row.get_mut(index));
            if let Some(cell) = cell {
                *cell += session.minutes();
            }
        }
    }

    Ok(DayMatrix {
        app_ids,
        first_day,
        minutes,
    })
}
