//! Errors at the engine and session boundary

use thiserror::Error;

use kbook_utils::error::{ConfigError, ErrorCategory, LlmError, UserFriendlyError, ValidationError};

use crate::phase::Phase;

#[derive(Error, Debug)]
pub enum KbookError {
    #[error("Generation error: {0}")]
    Llm(#[from] LlmError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot {operation} while {phase}")]
    PhaseViolation {
        operation: &'static str,
        phase: Phase,
    },

    #[error("No chapter with id '{0}'")]
    UnknownTask(String),

    #[error("A rewrite is already open for chapter '{0}'")]
    RewriteInProgress(String),

    #[error("No rewrite request is open")]
    NoRewriteOpen,

    #[error("Rewrite instructions must not be empty")]
    EmptyRewriteInstructions,

    #[error("Regeneration feedback must not be empty")]
    EmptyFeedback,
}

impl KbookError {
    pub(crate) fn phase(operation: &'static str, phase: Phase) -> Self {
        Self::PhaseViolation { operation, phase }
    }
}

impl UserFriendlyError for KbookError {
    fn user_message(&self) -> String {
        match self {
            Self::Llm(e) => e.user_message(),
            Self::Validation(e) => e.user_message(),
            Self::Config(e) => e.user_message(),
            Self::Io(e) => format!("File system operation failed: {e}"),
            Self::PhaseViolation { operation, phase } => {
                format!("'{operation}' is not available while {phase}")
            }
            Self::UnknownTask(id) => format!("There is no chapter with id '{id}'"),
            Self::RewriteInProgress(id) => {
                format!("Finish or cancel the open rewrite of '{id}' first")
            }
            Self::NoRewriteOpen => "There is no open rewrite request to submit".to_string(),
            Self::EmptyRewriteInstructions => "Rewrite instructions are required".to_string(),
            Self::EmptyFeedback => "Describe what should change in the outline".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Llm(e) => e.context(),
            Self::Validation(e) => e.context(),
            Self::Config(e) => e.context(),
            Self::PhaseViolation { .. } => {
                Some("Each workflow phase only allows a fixed set of operations.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Llm(e) => e.suggestions(),
            Self::Validation(e) => e.suggestions(),
            Self::Config(e) => e.suggestions(),
            Self::Io(_) => vec!["Check that the path exists and is writable".to_string()],
            Self::PhaseViolation { .. } => {
                vec!["Move the session to the right phase before retrying".to_string()]
            }
            Self::UnknownTask(_) => vec!["List the chapters to find a valid id".to_string()],
            Self::RewriteInProgress(_)
            | Self::NoRewriteOpen
            | Self::EmptyRewriteInstructions
            | Self::EmptyFeedback => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Llm(e) => e.category(),
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Config(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::FileSystem,
            _ => ErrorCategory::Workflow,
        }
    }
}
