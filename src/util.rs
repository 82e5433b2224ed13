use tracing_subscriber::{EnvFilter, fmt};

use crate::config::ChartUnit;

pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();
}

pub fn format_amount(value: f64, unit: ChartUnit) -> String {
    match unit {
        ChartUnit::Hours => format!("{value:.1}{}", unit.suffix()),
        ChartUnit::Minutes => format!("{value:.0}{}", unit.suffix()),
    }
}

pub fn human_minutes(minutes: f64) -> String {
    if !minutes.is_finite() || minutes <= 0.0 {
        return "0m".to_string();
    }
    let total = minutes.round() as u64;
    let days = total / 1_440;
    let hours = (total % 1_440) / 60;
    let mins = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins}m")
    }
}

pub fn truncate(input: &str, max_len: usize) -> String {
    if input.chars().count() <= max_len {
        return input.to_string();
    }
    if max_len <= 3 {
        return input.chars().take(max_len).collect();
    }
    let kept: String = input.chars().take(max_len - 3).collect();
    format!("{kept}...")
}
