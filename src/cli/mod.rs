//! Command-line interface for kbook
//!
//! - `args`: clap argument definitions
//! - `run`: entry point, config discovery, dispatch, and error output
//! - `commands`: command implementations
//! - `report`: user-facing error reports

pub mod args;
mod commands;
mod report;
mod run;

pub use args::{Cli, Commands, InputArgs};
pub use run::run;
