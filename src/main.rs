use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use steam_playtime::app;
use steam_playtime::cli::{Cli, Commands};
use steam_playtime::config::PlaytimeConfig;
use steam_playtime::util::setup_tracing;

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("steam-playtime error: {err:#}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<u8> {
    setup_tracing();
    let cli = Cli::parse();
    let config = PlaytimeConfig::load_or_init()?;

    match cli.command {
        Some(Commands::Status) => {
            app::print_status(&config)?;
            Ok(0)
        }
        Some(Commands::Doctor) => app::doctor(&config),
        None => {
            app::run(&config, cli.plain)?;
            Ok(0)
        }
    }
}
