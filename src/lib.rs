//! kbook - human-in-the-loop book generation
//!
//! kbook drives a staged workflow on top of a streaming text-generation
//! service: the user supplies a subject, reviews and optionally revises a
//! generated outline and title, then chapters are written one at a time, each
//! with the text of every earlier chapter as context.
//!
//! kbook can be used in two ways:
//! - **CLI**: `kbook generate --subject "Tide pools" --out book/`
//! - **Library**: build a [`Session`] and drive it from any front end
//!
//! # Quick Start (Library)
//!
//! ```no_run
//! use kbook::{CliArgs, Config, Session, UserInputs};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::discover(&CliArgs::default())?;
//! let mut session = Session::from_config(&config)?;
//! session
//!     .submit_inputs(UserInputs::new("Tide pools"), Vec::new())
//!     .await?;
//! session.proceed_to_chapters()?;
//! session.set_auto_mode(true)?;
//! session.drive().await?;
//! println!("{}", session.export());
//! # Ok(())
//! # }
//! ```
//!
//! Live progress is available through [`Session::subscribe`], which yields
//! [`SessionEvent`]s for phase changes, outline attempts, and chapter
//! fragments as they stream in.

pub mod cli;
pub mod exit_codes;

pub use exit_codes::{ExitCode, ToExitCode};

pub use kbook_config::{CliArgs, Config, ConfigSource};
pub use kbook_engine::{
    AutoControl, AutoModeSwitch, Banner, ChapterTask, ExportFormat, KbookError, NextStep, Phase,
    ProgressStatus, ProgressSummary, Session, SessionEvent, StepResult, TaskStatus, TaskStore,
    UnitOutcome, compile_document, safe_file_name,
};
pub use kbook_llm::{
    BookStructure, CallPurpose, GenerationBackend, GenerationClient, GenerationRequest, Section,
    Subsection, TextStream, parse_structured_result,
};
#[cfg(feature = "test-utils")]
pub use kbook_llm::{RecordedCall, ScriptStep, ScriptedBackend};
pub use kbook_utils::{
    ErrorKind, GenerationMode, LlmError, ReferenceFile, UserFriendlyError, UserInputs,
    ValidationError,
};

#[doc(hidden)]
pub mod engine {
    pub use kbook_engine::*;
}

#[doc(hidden)]
pub mod llm {
    pub use kbook_llm::*;
}
