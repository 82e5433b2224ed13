pub mod aggregate;
pub mod app;
pub mod chart;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod logs;
pub mod names;
pub mod run_lock;
pub mod sessions;
pub mod store;
pub mod util;

