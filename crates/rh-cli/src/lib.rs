//! Release health CLI library.
//!
//! This crate provides the CLI interface for release health.

mod cli;
pub mod commands;
mod config;

pub use cli::{ChartKind, Cli, Commands, WindowArgs};
pub use config::Config;
