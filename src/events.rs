use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RUNNING_MARKER: &str = "App Running";

static STATE_CHANGE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\] AppID (\d+) state changed : ([\w ,].*)$",
    )
    .expect("state change pattern is valid")
});

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AppId(pub u32);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub app_id: AppId,
    pub timestamp: NaiveDateTime,
    pub is_start: bool,
}

/// Classifies one content log line. Lines outside the state-change grammar
/// yield `None`.
pub fn parse_line(line: &str) -> Option<Event> {
    let line = line.trim_end_matches(['\r', '\n']);
    let captures = STATE_CHANGE_LINE.captures(line)?;
    let timestamp =
        NaiveDateTime::parse_from_str(captures.get(1)?.as_str(), LOG_TIMESTAMP_FORMAT).ok()?;
    let app_id = captures.get(2)?.as_str().parse::<u32>().ok()?;
    let state = captures.get(3)?.as_str();
    Some(Event {
        app_id: AppId(app_id),
        timestamp,
        is_start: state.contains(RUNNING_MARKER),
    })
}

pub fn parse_events<I>(lines: I) -> impl Iterator<Item = Event>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    lines
        .into_iter()
        .filter_map(|line| parse_line(line.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid timestamp")
    }

    #[test]
    fn parses_running_line_as_start() {
        let event =
            parse_line("[2024-01-01 10:00:00] AppID 42 state changed : App Running").expect("event");
        assert_eq!(event.app_id, AppId(42));
        assert_eq!(event.timestamp, at(10, 0, 0));
        assert!(event.is_start);
    }

    #[test]
    fn steam_flag_list_with_running_is_start() {
        let event = parse_line(
            "[2024-01-01 10:00:00] AppID 730 state changed : Fully Installed,App Running,",
        )
        .expect("event");
        assert_eq!(event.app_id, AppId(730));
        assert!(event.is_start);
    }

    #[test]
    fn other_state_text_is_end_marker() {
        let event = parse_line(
            "[2024-01-01 11:30:00] AppID 42 state changed : Fully Installed,\r\n",
        )
        .expect("event");
        assert_eq!(event.timestamp, at(11, 30, 0));
        assert!(!event.is_start);
    }

    #[test]
    fn rejects_lines_outside_grammar() {
        for line in [
            "",
            "[2024-01-01 10:00:00] AppID 42 update started : download 0/100",
            "[2024-01-01 10:00:00] AppID abc state changed : App Running",
            "2024-01-01 10:00:00 AppID 42 state changed : App Running",
            "[2024-13-01 10:00:00] AppID 42 state changed : App Running",
            "[2024-01-01 10:00:00] AppID 42 state changed : ",
            "[2024-01-01 10:00:00] AppID 99999999999 state changed : App Running",
        ] {
            assert_eq!(parse_line(line), None, "line should be skipped: {line:?}");
        }
    }

    #[test]
    fn parse_events_keeps_input_order_and_skips_noise() {
        let lines = [
            "[2024-01-01 10:00:00] AppID 1 state changed : App Running",
            "some unrelated log chatter",
            "[2024-01-01 10:05:00] AppID 2 state changed : App Running",
            "[2024-01-01 10:10:00] AppID 1 state changed : Fully Installed",
        ];
        let ids: Vec<u32> = parse_events(lines).map(|event| event.app_id.0).collect();
        assert_eq!(ids, vec![1, 2, 1]);
    }
}
