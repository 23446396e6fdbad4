//! Process exit codes and their mapping from errors

use kbook_engine::KbookError;
use kbook_utils::error::{ConfigError, ErrorKind, LlmError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// General failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid arguments, inputs, or configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A generation call timed out
    pub const TIMEOUT: ExitCode = ExitCode(10);

    /// The generation service failed or returned unusable text
    pub const GENERATION_FAILURE: ExitCode = ExitCode(70);

    /// Reading references or writing the book failed
    pub const IO: ExitCode = ExitCode(74);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

pub trait ToExitCode {
    fn to_exit_code(&self) -> ExitCode;
}

impl ToExitCode for LlmError {
    fn to_exit_code(&self) -> ExitCode {
        match (self, self.kind()) {
            (Self::Timeout { .. }, _) => ExitCode::TIMEOUT,
            (_, ErrorKind::Configuration) => ExitCode::CLI_ARGS,
            _ => ExitCode::GENERATION_FAILURE,
        }
    }
}

impl ToExitCode for ConfigError {
    fn to_exit_code(&self) -> ExitCode {
        ExitCode::CLI_ARGS
    }
}

impl ToExitCode for KbookError {
    fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Llm(e) => e.to_exit_code(),
            Self::Io(_) => ExitCode::IO,
            Self::Config(_)
            | Self::Validation(_)
            | Self::EmptyFeedback
            | Self::EmptyRewriteInstructions => ExitCode::CLI_ARGS,
            Self::PhaseViolation { .. }
            | Self::UnknownTask(_)
            | Self::RewriteInProgress(_)
            | Self::NoRewriteOpen => ExitCode::INTERNAL,
        }
    }
}
