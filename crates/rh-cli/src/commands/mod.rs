//! CLI subcommand implementations.

pub mod bounds;
pub mod details;
pub mod releases;
pub mod stats;
mod util;
