//! CLI entry point and dispatch
//!
//! `run()` parses arguments, discovers configuration, installs logging,
//! creates the tokio runtime, dispatches, and owns ALL error output.

use clap::Parser;

use kbook_config::Config;
use kbook_engine::KbookError;
use kbook_utils::logging::{LogFormat, init_tracing};
use kbook_utils::{ConfigError, LlmError, ValidationError};

use super::args::{Cli, Commands};
use super::commands;
use super::report::contextual_report;
use crate::exit_codes::{ExitCode, ToExitCode};

/// Main CLI execution function.
///
/// Prints every error itself; main.rs only turns the returned code into the
/// process exit status.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    if let Err(e) = init_tracing(cli.verbose, format) {
        eprintln!("⚠ logging was not initialized: {e}");
    }

    let config = match Config::discover(&cli.config_overrides()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", contextual_report(&err, "config"));
            return Err(err.to_exit_code());
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = match &cli.command {
        Commands::Generate { .. } => "generate",
        Commands::Outline { .. } => "outline",
        Commands::Config { .. } => "config",
        Commands::Languages => "languages",
    };

    let result = rt.block_on(async {
        match &cli.command {
            Commands::Generate {
                inputs,
                out,
                format,
            } => {
                commands::execute_generate_command(&config, inputs, out.as_deref(), *format).await
            }
            Commands::Outline { inputs } => {
                commands::execute_outline_command(&config, inputs).await
            }
            Commands::Config { json } => commands::execute_config_command(&config, *json),
            Commands::Languages => commands::execute_languages_command(),
        }
    });

    if let Err(error) = result {
        return Err(report_failure(&error, operation));
    }
    Ok(())
}

/// Print the most specific report available for `error` and pick its exit code
fn report_failure(error: &anyhow::Error, operation: &str) -> ExitCode {
    if let Some(e) = error.downcast_ref::<KbookError>() {
        eprintln!("{}", contextual_report(e, operation));
        return e.to_exit_code();
    }
    if let Some(e) = error.downcast_ref::<LlmError>() {
        eprintln!("{}", contextual_report(e, operation));
        return e.to_exit_code();
    }
    if let Some(e) = error.downcast_ref::<ConfigError>() {
        eprintln!("{}", contextual_report(e, operation));
        return e.to_exit_code();
    }
    if let Some(e) = error.downcast_ref::<ValidationError>() {
        eprintln!("{}", contextual_report(e, operation));
        return ExitCode::CLI_ARGS;
    }

    eprintln!(
        "✗ Unexpected error: {}",
        kbook_llm::redact_error_message(&format!("{error:#}"))
    );
    eprintln!("\n  General troubleshooting:");
    eprintln!("    - Run with --verbose for more detailed output");
    eprintln!("    - Run 'kbook config' to check the effective configuration");
    ExitCode::INTERNAL
}
