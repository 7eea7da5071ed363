//! `council-job` command-line front end
//!
//! Argument parsing, subcommand handlers, and text rendering live here so
//! they can be tested without spawning the binary.

pub mod cli;
pub mod commands;
pub mod render;

pub use cli::{Cli, Command};
