use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use tracing::{debug, info, warn};

use crate::aggregate::{DayMatrix, aggregate};
use crate::chart::{self, ChartData};
use crate::config::{self, LookupFailurePolicy, PlaytimeConfig};
use crate::events::{AppId, parse_events};
use crate::logs::read_log_lines;
use crate::names::{NameCache, NameLookup, Resolution, SteamStoreLookup, resolve_names};
use crate::run_lock::{self, LockHolder};
use crate::sessions::{SessionReconstructor, reconstruct};
use crate::store::SessionStore;
use crate::util::human_minutes;

const PLAIN_WIDTH: u16 = 100;
const PLAIN_HEIGHT: u16 = 30;

#[derive(Debug, Clone)]
pub struct RunPaths {
    pub logs: Vec<PathBuf>,
    pub snapshot: PathBuf,
    pub name_cache: PathBuf,
}

impl RunPaths {
    pub fn from_config(config: &PlaytimeConfig) -> Self {
        Self {
            logs: config.log_paths(),
            snapshot: config::snapshot_path(),
            name_cache: config::name_cache_path(),
        }
    }
}

pub struct Report {
    pub matrix: DayMatrix,
    pub labels: Vec<String>,
    pub resolution: Resolution,
}

/// Merges sessions parsed from `lines` into `previous`, returning the merged
/// store and how many sessions were new.
pub fn update_store<I>(previous: SessionStore, lines: I) -> (SessionStore, usize)
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let parsed = SessionStore::from_sessions(reconstruct(parse_events(lines)));
    let mut merged = previous;
    let added = merged.merge_from(parsed);
    (merged, added)
}

pub fn build_report(
    paths: &RunPaths,
    lookup: &dyn NameLookup,
    policy: LookupFailurePolicy,
) -> Result<Report> {
    let lines = read_log_lines(&paths.logs)?;
    let previous = SessionStore::load(&paths.snapshot)?;
    let previous_count = previous.session_count();

    let (store, added) = update_store(previous, &lines);
    store.save(&paths.snapshot)?;
    info!(
        previous = previous_count,
        added,
        total = store.session_count(),
        snapshot = %paths.snapshot.display(),
        "session snapshot updated"
    );

    let matrix = aggregate(&store)?;
    let mut cache = NameCache::load(&paths.name_cache)?;
    let resolution = resolve_names(&matrix.app_ids, &mut cache, lookup)?;

    for failure in &resolution.failures {
        warn!(app_id = %failure.app_id, reason = %failure.reason, "name lookup failed");
    }
    if policy == LookupFailurePolicy::Abort && !resolution.failures.is_empty() {
        let ids: Vec<String> = resolution
            .failures
            .iter()
            .map(|failure| failure.app_id.to_string())
            .collect();
        bail!("could not resolve names for app(s) {}", ids.join(", "));
    }

    let labels = matrix
        .app_ids
        .iter()
        .map(|app_id| resolution.display_name(*app_id))
        .collect();
    Ok(Report {
        matrix,
        labels,
        resolution,
    })
}

pub fn run(config: &PlaytimeConfig, plain: bool) -> Result<()> {
    let paths = RunPaths::from_config(config);
    let _lock = run_lock::acquire(&paths.snapshot)?;
    let lookup = SteamStoreLookup::new(&config.lookup.api_url, config.lookup_timeout());
    let report = build_report(&paths, &lookup, config.lookup.on_failure)?;

    let data = ChartData {
        matrix: &report.matrix,
        labels: &report.labels,
        unit: config.chart.unit,
    };
    if plain || !io::stdout().is_terminal() {
        println!(
            "{}",
            chart::layout(&data, PLAIN_WIDTH, PLAIN_HEIGHT).to_plain()
        );
        return Ok(());
    }
    run_interactive_chart(&data)
}

fn run_interactive_chart(data: &ChartData<'_>) -> Result<()> {
    chart::enter_terminal()?;

    let run = || -> Result<()> {
        chart::draw(data)?;
        loop {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => {
                    if key.code == KeyCode::Char('q')
                        || key.code == KeyCode::Esc
                        || (key.code == KeyCode::Char('c')
                            && key.modifiers.contains(KeyModifiers::CONTROL))
                    {
                        break;
                    }
                }
                Event::Resize(_, _) => chart::draw(data)?,
                _ => {}
            }
        }
        Ok(())
    };

    let run_result = run();
    let _ = chart::leave_terminal();
    run_result
}

pub fn print_status(config: &PlaytimeConfig) -> Result<()> {
    let paths = RunPaths::from_config(config);
    let store = SessionStore::load(&paths.snapshot)?;
    let cache = NameCache::load(&paths.name_cache)?;
    let holder = run_lock::inspect()?;

    println!("steam-playtime status");
    match holder {
        LockHolder::Free => println!("run_in_progress: false"),
        LockHolder::Held(record) => {
            println!("run_in_progress: true");
            if let Some(record) = record {
                println!("run_pid: {}", record.pid);
                println!("run_started: {}", record.started_at.format("%Y-%m-%d %H:%M:%S"));
                println!("run_snapshot: {}", record.snapshot.display());
            }
        }
    }
    println!("config: {}", config::config_path().display());
    println!("snapshot: {}", paths.snapshot.display());
    println!("name_cache: {} ({} names)", paths.name_cache.display(), cache.len());
    print_log_sources(&paths.logs);
    println!("stored_sessions: {}", store.session_count());

    let label = |app_id: AppId| {
        cache
            .get(app_id)
            .map(str::to_string)
            .unwrap_or_else(|| app_id.to_string())
    };

    let mut totals: Vec<(AppId, usize, f64)> = store
        .app_ids()
        .into_iter()
        .map(|app_id| {
            (
                app_id,
                store.sessions_for(app_id).count(),
                store.total_minutes_for(app_id),
            )
        })
        .collect();
    totals.sort_by(|a, b| b.2.total_cmp(&a.2));
    if !totals.is_empty() {
        println!("totals:");
        for (app_id, sessions, minutes) in totals {
            println!(
                "  - {} [{app_id}]: {} over {sessions} session(s)",
                label(app_id),
                human_minutes(minutes)
            );
        }
    }

    let lines = read_log_lines(&paths.logs)?;
    let mut reconstructor = SessionReconstructor::new();
    for event in parse_events(&lines) {
        reconstructor.observe(event);
    }
    let open = reconstructor.open_sessions();
    if open.is_empty() {
        println!("running_now: none");
    } else {
        println!("running_now:");
        for (app_id, started) in open {
            println!("  - {} [{app_id}] since {started}", label(app_id));
        }
    }
    Ok(())
}

pub fn doctor(config: &PlaytimeConfig) -> Result<u8> {
    let mut issues = 0u8;
    let paths = RunPaths::from_config(config);
    let logs_dir = config.steam_logs_dir();

    println!("steam-playtime doctor");
    println!("config_path: {}", config::config_path().display());

    if logs_dir.is_dir() {
        println!("[OK] Steam logs directory found: {}", logs_dir.display());
    } else {
        issues += 1;
        println!(
            "[WARN] Steam logs directory not found: {} (set STEAM_LOGS_DIR or logs.steam_logs_dir)",
            logs_dir.display()
        );
    }

    let mut readable_logs = 0usize;
    for path in &paths.logs {
        if !path.exists() {
            println!("[INFO] {} not present.", path.display());
            continue;
        }
        match read_log_lines(std::slice::from_ref(path)) {
            Ok(lines) => {
                readable_logs += 1;
                let events = parse_events(&lines).count();
                println!(
                    "[OK] {} readable ({} state-change events).",
                    path.display(),
                    events
                );
            }
            Err(err) => {
                issues += 1;
                println!("[WARN] {err:#}");
            }
        }
    }
    if readable_logs == 0 {
        issues += 1;
        println!("[WARN] No readable content logs; nothing new can be recorded.");
    }

    issues += check_persisted("session snapshot", &paths.snapshot, |path| {
        SessionStore::load(path).map(|store| format!("{} sessions", store.session_count()))
    });
    issues += check_persisted("name cache", &paths.name_cache, |path| {
        NameCache::load(path).map(|cache| format!("{} names", cache.len()))
    });

    if issues == 0 {
        println!("Doctor: healthy");
        Ok(0)
    } else {
        println!("Doctor: {issues} issue(s) found");
        Ok(1)
    }
}

fn check_persisted<E: std::error::Error>(
    label: &str,
    path: &Path,
    load: impl FnOnce(&Path) -> std::result::Result<String, E>,
) -> u8 {
    if !path.exists() {
        println!("[INFO] No {label} yet at {}.", path.display());
        return 0;
    }
    match load(path) {
        Ok(summary) => {
            println!("[OK] {label} readable: {summary}.");
            0
        }
        Err(err) => {
            debug!(error = ?err, "persisted file check failed");
            println!("[WARN] {label} unusable: {err}");
            1
        }
    }
}

fn print_log_sources(paths: &[PathBuf]) {
    println!("log_sources:");
    for path in paths {
        let state = if path.exists() { "present" } else { "missing" };
        println!("  - {} ({state})", path.display());
    }
}
