//! Error taxonomy for kbook
//!
//! Every layer reports failures through a `thiserror` enum that also implements
//! [`UserFriendlyError`], so the CLI and any other presentation layer can render a
//! message, some context, and concrete suggestions without matching on variants.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Trait for errors that can be rendered for a human
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Generation,
    Validation,
    Workflow,
    FileSystem,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Generation => write!(f, "Generation"),
            Self::Validation => write!(f, "Validation"),
            Self::Workflow => write!(f, "Workflow"),
            Self::FileSystem => write!(f, "File System"),
        }
    }
}

/// Coarse failure kinds the workflow reasons about.
///
/// Outline acquisition retries on the first three; validation failures are
/// reported before any remote call is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The service call itself failed (network, HTTP status, timeout)
    TransportFailure,
    /// The call succeeded but produced no usable text
    EmptyResponse,
    /// Text was received but could not be parsed into the expected shape
    MalformedResponse,
    /// User input failed its minimum constraints
    ValidationFailure,
    /// The backend cannot be used as configured
    Configuration,
}

/// Errors raised by generation backends and the client adapter
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    /// Transport-level failure (HTTP connectivity, broken stream)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider authentication failure (401, 403, missing API key)
    #[error("Provider authentication error: {0}")]
    ProviderAuth(String),

    /// Provider quota/rate limit exceeded (429)
    #[error("Provider quota exceeded: {0}")]
    ProviderQuota(String),

    /// Provider service outage (5xx errors)
    #[error("Provider outage: {0}")]
    ProviderOutage(String),

    /// Invocation timed out
    #[error("Timeout after {duration:?}")]
    Timeout { duration: Duration },

    /// The call returned, but with blank text
    #[error("Empty response: {0}")]
    EmptyResponse(String),

    /// The returned text could not be parsed; `raw` keeps the offending text
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String, raw: String },

    /// Configuration error
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),

    /// Unsupported feature or provider
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl LlmError {
    /// Map this error onto the coarse kind used by retry and banner logic
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_)
            | Self::ProviderAuth(_)
            | Self::ProviderQuota(_)
            | Self::ProviderOutage(_)
            | Self::Timeout { .. } => ErrorKind::TransportFailure,
            Self::EmptyResponse(_) => ErrorKind::EmptyResponse,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::Misconfiguration(_) | Self::Unsupported(_) => ErrorKind::Configuration,
        }
    }

    /// Raw text attached to a malformed response, for diagnostics
    #[must_use]
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::Transport(msg) => format!("Generation service transport error: {msg}"),
            Self::ProviderAuth(msg) => format!("Generation service rejected credentials: {msg}"),
            Self::ProviderQuota(msg) => format!("Generation service quota exceeded: {msg}"),
            Self::ProviderOutage(msg) => format!("Generation service outage: {msg}"),
            Self::Timeout { duration } => {
                format!("Generation call timed out after {duration:?}")
            }
            Self::EmptyResponse(msg) => format!("Generation service returned nothing: {msg}"),
            Self::MalformedResponse { message, .. } => {
                format!("Generation service returned unusable output: {message}")
            }
            Self::Misconfiguration(msg) => format!("Generation backend misconfigured: {msg}"),
            Self::Unsupported(msg) => format!("Not supported: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self.kind() {
            ErrorKind::TransportFailure => Some(
                "Transport errors occur when the generation service cannot be reached or fails the request."
                    .to_string(),
            ),
            ErrorKind::EmptyResponse => {
                Some("The service answered but produced no text.".to_string())
            }
            ErrorKind::MalformedResponse => Some(
                "The outline must be a JSON object of section titles to descriptions or one level of sub-sections."
                    .to_string(),
            ),
            ErrorKind::Configuration | ErrorKind::ValidationFailure => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProviderAuth(_) | Self::Misconfiguration(_) => vec![
                "Check that the API key environment variable named in [llm] api_key_env is set"
                    .to_string(),
                "Run 'kbook config' to see the effective configuration".to_string(),
            ],
            Self::ProviderQuota(_) | Self::ProviderOutage(_) => vec![
                "Wait a few minutes and try again".to_string(),
                "Switch to the fast generation mode to use a cheaper model".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Increase [llm] timeout_secs in the configuration".to_string(),
                "Reduce the target chapter length".to_string(),
            ],
            Self::MalformedResponse { .. } | Self::EmptyResponse(_) => vec![
                "Retry the outline generation".to_string(),
                "Simplify the additional instructions".to_string(),
            ],
            Self::Transport(_) | Self::Unsupported(_) => vec![
                "Check network connectivity".to_string(),
                "Run with --verbose to see detailed error information".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::Configuration => ErrorCategory::Configuration,
            _ => ErrorCategory::Generation,
        }
    }
}

/// User input failed a minimum constraint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Subject must not be empty")]
    EmptySubject,

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        min: u32,
        max: u32,
        value: u32,
    },

    #[error("{field} must be a multiple of {step}, got {value}")]
    Misaligned {
        field: &'static str,
        step: u32,
        value: u32,
    },
}

impl ValidationError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ValidationFailure
    }
}

impl UserFriendlyError for ValidationError {
    fn user_message(&self) -> String {
        format!("Invalid input: {self}")
    }

    fn context(&self) -> Option<String> {
        Some("Inputs are checked before any request is sent.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::EmptySubject => vec!["Provide a subject with --subject".to_string()],
            Self::OutOfRange { field, min, max, .. } => {
                vec![format!("Choose {field} between {min} and {max}")]
            }
            Self::Misaligned { field, step, .. } => {
                vec![format!("Round the {field} to a multiple of {step}")]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {reason}")]
    DiscoveryFailed { reason: String },

    #[error("Configuration validation failed: {error_count} errors")]
    ValidationFailed {
        errors: Vec<String>,
        error_count: usize,
    },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => {
                format!("Configuration file has invalid format: {reason}")
            }
            Self::InvalidValue { key, value } => {
                format!("Configuration '{key}' has invalid value: {value}")
            }
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::DiscoveryFailed { reason } => {
                format!("Could not locate configuration: {reason}")
            }
            Self::ValidationFailed { errors, .. } => {
                format!("Configuration is invalid:\n  - {}", errors.join("\n  - "))
            }
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Configuration is read from .kbook/config.toml, $KBOOK_HOME/config.toml, or the user config directory."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => {
                vec!["Check the path passed with --config".to_string()]
            }
            _ => vec![
                "Run 'kbook config' to see which values are in effect".to_string(),
                "Compare the file against the documented [llm], [retry], and [defaults] sections"
                    .to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}
