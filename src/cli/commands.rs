//! CLI command implementations
//!
//! Each `execute_*` function handles one subcommand. Progress goes to stderr;
//! stdout carries only the requested artifact (book, outline JSON, config).

use anyhow::{Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::debug;

use kbook_config::Config;
use kbook_engine::{ExportFormat, KbookError, Session, SessionEvent, StepResult, UnitOutcome};
use kbook_llm::redact_error_message;
use kbook_utils::types::{AVAILABLE_LANGUAGES, language_name, reading_level_label};
use kbook_utils::{ReferenceFile, UserInputs};

use super::args::InputArgs;

// ============================================================================
// Shared helpers
// ============================================================================

fn read_references(paths: &[PathBuf]) -> Result<Vec<ReferenceFile>> {
    paths
        .iter()
        .map(|path| -> Result<ReferenceFile> {
            let content = std::fs::read_to_string(path)
                .map_err(KbookError::from)
                .with_context(|| format!("reading reference file {}", path.display()))?;
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            Ok(ReferenceFile::new(name, content))
        })
        .collect()
}

/// Validate the inputs before any credentials are needed
fn checked_inputs(args: &InputArgs, config: &Config) -> Result<UserInputs> {
    let inputs = args.to_inputs(config);
    inputs.validate().map_err(KbookError::from)?;
    debug!(
        language = language_name(&inputs.language),
        reading_level = %reading_level_label(inputs.reading_level),
        mode = %inputs.generation_mode,
        "inputs accepted"
    );
    Ok(inputs)
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::PhaseChanged { to, .. } => eprintln!("• {to}"),
        SessionEvent::AttemptFailed {
            attempt,
            max_attempts,
            message,
        } => eprintln!(
            "⚠ attempt {attempt}/{max_attempts} failed: {}",
            redact_error_message(message)
        ),
        SessionEvent::OutlineReady { title, sections } => {
            eprintln!("✓ outline ready: \"{title}\" ({sections} chapters)");
        }
        SessionEvent::ChapterStarted { title, rewrite, .. } => {
            let verb = if *rewrite { "rewriting" } else { "writing" };
            eprintln!("→ {verb} {title}");
        }
        SessionEvent::ChapterCompleted { chars, .. } => eprintln!("  ✓ done ({chars} chars)"),
        SessionEvent::ChapterFailed { title, message, .. } => {
            eprintln!("  ✗ {title}: {}", redact_error_message(message));
        }
        _ => {}
    }
}

/// Print session events until the session is dropped
fn spawn_progress_printer(mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "progress output lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Submit inputs, then apply every revision round in order
async fn prepare_outline(
    session: &mut Session,
    inputs: UserInputs,
    references: Vec<ReferenceFile>,
    revisions: &[String],
) -> Result<()> {
    session.submit_inputs(inputs, references).await?;
    for feedback in revisions {
        session.regenerate_outline(feedback).await?;
    }
    Ok(())
}

// ============================================================================
// Generate Command
// ============================================================================

/// Outline, chapters, export
pub async fn execute_generate_command(
    config: &Config,
    args: &InputArgs,
    out: Option<&Path>,
    format: ExportFormat,
) -> Result<()> {
    let inputs = checked_inputs(args, config)?;
    let references = read_references(&args.references)?;
    let mut session = Session::from_config(config)?;
    let printer = spawn_progress_printer(session.subscribe());

    prepare_outline(&mut session, inputs, references, &args.revisions).await?;
    session.proceed_to_chapters()?;

    // First Ctrl-C pauses after the running chapter; a second one exits.
    let switch = session.auto_switch();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            switch.set(false);
            eprintln!("⏸ pausing after the current chapter (Ctrl-C again to abort)");
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        }
    });

    session.set_auto_mode(true)?;
    let mut failure = None;
    loop {
        match session.step().await? {
            StepResult::Ran(UnitOutcome::Failed { error, .. }) => failure = Some(error),
            StepResult::Ran(_) => {}
            StepResult::Finished | StepResult::Idle => break,
        }
    }
    interrupt.abort();

    let progress = session.progress();
    session.view_result()?;
    match out {
        Some(dir) => {
            let path = session.write_export(dir, format)?;
            eprintln!("✓ wrote {}", path.display());
        }
        None => println!("{}", session.export()),
    }
    eprintln!(
        "{}: {}/{} chapters ({:.0}%)",
        progress.status, progress.completed, progress.total, progress.percentage
    );

    drop(session);
    let _ = printer.await;

    match failure {
        Some(error) => Err(KbookError::from(error).into()),
        None => Ok(()),
    }
}

// ============================================================================
// Outline Command
// ============================================================================

/// Outline and title only, printed as JSON
pub async fn execute_outline_command(config: &Config, args: &InputArgs) -> Result<()> {
    let inputs = checked_inputs(args, config)?;
    let references = read_references(&args.references)?;
    let mut session = Session::from_config(config)?;
    let printer = spawn_progress_printer(session.subscribe());

    prepare_outline(&mut session, inputs, references, &args.revisions).await?;
    let output = json!({
        "title": session.title(),
        "structure": session.structure(),
        "chapters": session.tasks().iter().map(|t| &t.title).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    drop(session);
    let _ = printer.await;
    Ok(())
}

// ============================================================================
// Config Command
// ============================================================================

pub fn execute_config_command(config: &Config, as_json: bool) -> Result<()> {
    let rows = config.effective_config();
    if as_json {
        let entries: serde_json::Map<String, serde_json::Value> = rows
            .into_iter()
            .map(|(key, value, source)| {
                (
                    key.to_string(),
                    json!({ "value": value, "source": source.to_string() }),
                )
            })
            .collect();
        let output = json!({
            "config_file": config.config_file.as_ref().map(|p| p.display().to_string()),
            "values": entries,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &config.config_file {
        Some(path) => println!("config file: {}", path.display()),
        None => println!("config file: (none found, using defaults)"),
    }
    let width = rows.iter().map(|(key, ..)| key.len()).max().unwrap_or(0);
    for (key, value, source) in rows {
        println!("  {key:<width$} = {value}  ({source})");
    }
    Ok(())
}

// ============================================================================
// Languages Command
// ============================================================================

pub fn execute_languages_command() -> Result<()> {
    for language in AVAILABLE_LANGUAGES {
        println!("{}\t{}", language.code, language.name);
    }
    Ok(())
}
