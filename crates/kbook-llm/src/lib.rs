//! Text-generation backends for kbook
//!
//! Providers implement [`GenerationBackend`]; [`GenerationClient`] layers prompt
//! construction, model selection, and retry rules on top so the engine never
//! deals with a provider directly.

mod client;
mod gemini_backend;
pub(crate) mod http_client;
pub mod prompts;
mod retry;
#[cfg(any(test, feature = "test-utils"))]
mod scripted_backend;
mod structure;
mod types;

use std::sync::Arc;

pub use client::{ChapterRequest, GenerationClient};
pub use http_client::redact_error_message;
pub use kbook_utils::error::LlmError;
pub use retry::RetryPolicy;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted_backend::{RecordedCall, ScriptStep, ScriptedBackend};
pub use structure::{
    BookStructure, Section, Subsection, parse_structured_result, strip_code_fence,
};
pub use types::{CallPurpose, GenerationBackend, GenerationRequest, TextStream, collect_text};

use gemini_backend::GeminiBackend;
use kbook_config::Config;

/// Construct the backend named by `[llm] provider`.
///
/// # Errors
///
/// - `LlmError::Unsupported` for unknown providers, or `scripted` without the
///   `test-utils` feature
/// - `LlmError::Misconfiguration` when credentials are missing
pub fn from_config(config: &Config) -> Result<Arc<dyn GenerationBackend>, LlmError> {
    match config.llm.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiBackend::new_from_config(config)?)),
        #[cfg(any(test, feature = "test-utils"))]
        "scripted" => Ok(Arc::new(ScriptedBackend::offline())),
        #[cfg(not(any(test, feature = "test-utils")))]
        "scripted" => Err(LlmError::Unsupported(
            "the scripted provider is only available in builds with the test-utils feature"
                .to_string(),
        )),
        unknown => Err(LlmError::Unsupported(format!(
            "Unknown generation provider '{unknown}'. Supported providers: gemini."
        ))),
    }
}
