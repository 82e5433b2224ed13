use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::names::DEFAULT_STORE_API_URL;

const CONFIG_SCHEMA_VERSION: u32 = 1;
const DEFAULT_LOOKUP_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_LOG_FILES: [&str; 2] = ["content_log.previous.txt", "content_log.txt"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaytimeConfig {
    pub schema_version: u32,
    pub logs: LogsConfig,
    pub lookup: LookupConfig,
    pub chart: ChartConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub steam_logs_dir: Option<String>,
    /// Oldest first.
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub api_url: String,
    pub timeout_secs: u64,
    pub on_failure: LookupFailurePolicy,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LookupFailurePolicy {
    /// Label the series with the numeric app id.
    #[default]
    RawId,
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChartConfig {
    pub unit: ChartUnit,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChartUnit {
    #[default]
    Hours,
    Minutes,
}

impl ChartUnit {
    pub fn scale(self, minutes: f64) -> f64 {
        match self {
            Self::Hours => minutes / 60.0,
            Self::Minutes => minutes,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            Self::Hours => "h",
            Self::Minutes => "m",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Hours => "hours",
            Self::Minutes => "minutes",
        }
    }
}

impl Default for PlaytimeConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            logs: LogsConfig::default(),
            lookup: LookupConfig::default(),
            chart: ChartConfig::default(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            steam_logs_dir: None,
            files: DEFAULT_LOG_FILES.iter().map(|name| name.to_string()).collect(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_STORE_API_URL.to_string(),
            timeout_secs: DEFAULT_LOOKUP_TIMEOUT_SECONDS,
            on_failure: LookupFailurePolicy::RawId,
        }
    }
}

impl PlaytimeConfig {
    pub fn load_or_init() -> Result<Self> {
        let cfg_path = config_path();
        if let Some(parent) = cfg_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        if cfg_path.exists() {
            let raw = fs::read_to_string(&cfg_path)
                .with_context(|| format!("failed to read {}", cfg_path.display()))?;
            let mut parsed: PlaytimeConfig = serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", cfg_path.display()))?;
            if parsed.normalize_and_migrate() {
                parsed.save()?;
            }
            Ok(parsed)
        } else {
            let cfg = PlaytimeConfig::default();
            cfg.save()?;
            Ok(cfg)
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory {}", parent.display())
            })?;
        }

        let data = serde_json::to_string_pretty(self)?;
        fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    /// `$STEAM_LOGS_DIR` wins over the config file, then the platform default.
    pub fn steam_logs_dir(&self) -> PathBuf {
        if let Some(from_env) = env::var("STEAM_LOGS_DIR")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            return PathBuf::from(from_env);
        }

        self.logs
            .steam_logs_dir
            .as_ref()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_steam_logs_dir)
    }

    pub fn log_paths(&self) -> Vec<PathBuf> {
        let dir = self.steam_logs_dir();
        self.logs.files.iter().map(|name| dir.join(name)).collect()
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(env_u64(
            "STEAM_PLAYTIME_LOOKUP_TIMEOUT_SECS",
            self.lookup.timeout_secs,
        ))
    }

    fn normalize_and_migrate(&mut self) -> bool {
        let mut changed = false;

        if self.schema_version < CONFIG_SCHEMA_VERSION {
            self.schema_version = CONFIG_SCHEMA_VERSION;
            changed = true;
        }

        if let Some(dir) = self.logs.steam_logs_dir.as_mut() {
            let trimmed = dir.trim().to_string();
            if trimmed.is_empty() {
                self.logs.steam_logs_dir = None;
                changed = true;
            } else if *dir != trimmed {
                *dir = trimmed;
                changed = true;
            }
        }

        let files: Vec<String> = self
            .logs
            .files
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        if files.is_empty() {
            self.logs.files = LogsConfig::default().files;
            changed = true;
        } else if files != self.logs.files {
            self.logs.files = files;
            changed = true;
        }

        if self.lookup.api_url.trim().is_empty() {
            self.lookup.api_url = DEFAULT_STORE_API_URL.to_string();
            changed = true;
        }
        if self.lookup.timeout_secs == 0 {
            self.lookup.timeout_secs = DEFAULT_LOOKUP_TIMEOUT_SECONDS;
            changed = true;
        }

        changed
    }
}

pub fn playtime_home() -> PathBuf {
    if let Ok(custom) = env::var("STEAM_PLAYTIME_HOME") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".steam-playtime")
}

pub fn config_path() -> PathBuf {
    playtime_home().join("config.json")
}

pub fn snapshot_path() -> PathBuf {
    playtime_home().join("sessions.json")
}

pub fn name_cache_path() -> PathBuf {
    playtime_home().join("name_cache.json")
}

pub fn lock_path() -> PathBuf {
    playtime_home().join("steam-playtime.lock")
}

pub fn run_record_path() -> PathBuf {
    playtime_home().join("steam-playtime.run.json")
}

#[cfg(windows)]
fn default_steam_logs_dir() -> PathBuf {
    PathBuf::from(r"C:\Program Files (x86)\Steam\logs")
}

#[cfg(target_os = "macos")]
fn default_steam_logs_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Library/Application Support/Steam/logs")
}

#[cfg(all(unix, not(target_os = "macos")))]
fn default_steam_logs_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let candidates = [
        home.join(".steam/steam/logs"),
        home.join(".local/share/Steam/logs"),
        home.join(".var/app/com.valvesoftware.Steam/.local/share/Steam/logs"),
    ];
    candidates
        .iter()
        .find(|path| path.is_dir())
        .cloned()
        .unwrap_or_else(|| candidates[0].clone())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_read_previous_log_before_current() {
        let cfg = PlaytimeConfig::default();
        assert_eq!(
            cfg.logs.files,
            vec!["content_log.previous.txt", "content_log.txt"]
        );
        assert_eq!(cfg.lookup.on_failure, LookupFailurePolicy::RawId);
        assert_eq!(cfg.chart.unit, ChartUnit::Hours);
    }

    #[test]
    fn migration_restores_blank_values() {
        let mut cfg = PlaytimeConfig {
            schema_version: 0,
            logs: LogsConfig {
                steam_logs_dir: Some("   ".to_string()),
                files: vec![" ".to_string()],
            },
            lookup: LookupConfig {
                api_url: String::new(),
                timeout_secs: 0,
                on_failure: LookupFailurePolicy::Abort,
            },
            chart: ChartConfig::default(),
        };

        let changed = cfg.normalize_and_migrate();

        assert!(changed);
        assert_eq!(cfg.schema_version, CONFIG_SCHEMA_VERSION);
        assert_eq!(cfg.logs.steam_logs_dir, None);
        assert_eq!(cfg.logs.files, LogsConfig::default().files);
        assert_eq!(cfg.lookup.api_url, DEFAULT_STORE_API_URL);
        assert_eq!(cfg.lookup.timeout_secs, DEFAULT_LOOKUP_TIMEOUT_SECONDS);
        assert_eq!(cfg.lookup.on_failure, LookupFailurePolicy::Abort);
    }

    #[test]
    fn clean_config_is_left_alone() {
        let mut cfg = PlaytimeConfig::default();
        assert!(!cfg.normalize_and_migrate());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PlaytimeConfig =
            serde_json::from_str(r#"{"chart":{"unit":"minutes"},"lookup":{"on_failure":"abort"}}"#)
                .expect("parse");
        assert_eq!(cfg.chart.unit, ChartUnit::Minutes);
        assert_eq!(cfg.lookup.on_failure, LookupFailurePolicy::Abort);
        assert_eq!(cfg.lookup.api_url, DEFAULT_STORE_API_URL);
        assert_eq!(cfg.logs.files.len(), 2);
    }

    #[test]
    fn log_paths_join_configured_dir() {
        let cfg = PlaytimeConfig {
            logs: LogsConfig {
                steam_logs_dir: Some("/games/steam/logs".to_string()),
                files: vec!["a.txt".to_string(), "b.txt".to_string()],
            },
            ..PlaytimeConfig::default()
        };
        if env::var_os("STEAM_LOGS_DIR").is_none() {
            assert_eq!(
                cfg.log_paths(),
                vec![
                    PathBuf::from("/games/steam/logs/a.txt"),
                    PathBuf::from("/games/steam/logs/b.txt"),
                ]
            );
        }
    }

    #[test]
    fn unit_conversion() {
        assert_eq!(ChartUnit::Hours.scale(90.0), 1.5);
        assert_eq!(ChartUnit::Minutes.scale(90.0), 90.0);
    }
}
