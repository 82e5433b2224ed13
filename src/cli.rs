use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "steam-playtime",
    version,
    about = "Chart daily Steam playtime reconstructed from local content logs"
)]
pub struct Cli {
    /// Print the chart as plain text instead of opening the interactive view.
    #[arg(long, global = true)]
    pub plain: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print stored totals per app and apps currently running.
    Status,
    /// Check log sources and persisted files.
    Doctor,
}
