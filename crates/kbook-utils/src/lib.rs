//! Foundation utilities shared by every kbook crate.

pub mod error;
pub mod logging;
pub mod types;

pub use error::{ConfigError, ErrorCategory, ErrorKind, LlmError, UserFriendlyError, ValidationError};
pub use types::{GenerationMode, ReferenceFile, UserInputs, concat_reference_texts};
