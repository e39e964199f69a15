//! Command-line interface for convoforge.
//!
//! Provides commands for running the generation pipeline and inspecting
//! stage contracts.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
