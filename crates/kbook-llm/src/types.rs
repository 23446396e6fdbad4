//! Core types for the generation backend abstraction

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use crate::LlmError;

/// Fragments of text in arrival order; an `Err` item ends the stream
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Which step of the workflow a call serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallPurpose {
    /// Book structure request
    Outline,
    /// Book title request
    Title,
    /// One chapter body
    Chapter,
}

impl fmt::Display for CallPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outline => write!(f, "outline"),
            Self::Title => write!(f, "title"),
            Self::Chapter => write!(f, "chapter"),
        }
    }
}

/// Input to a single backend call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub purpose: CallPurpose,
    /// Model identifier, already resolved from the generation mode
    pub model: String,
    pub prompt: String,
    pub timeout: Duration,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(
        purpose: CallPurpose,
        model: impl Into<String>,
        prompt: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            purpose,
            model: model.into(),
            prompt: prompt.into(),
            timeout,
        }
    }
}

/// A remote text-generation capability.
///
/// Implementations make exactly one attempt per call; retries belong to
/// [`crate::RetryPolicy`] at the call sites.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Single-shot call returning the completed text (possibly blank)
    async fn complete(&self, request: GenerationRequest) -> Result<String, LlmError>;

    /// Open a fragment stream.
    ///
    /// An `Err` here is an initiation failure; failures after the stream is
    /// returned arrive as `Err` items.
    async fn stream(&self, request: GenerationRequest) -> Result<TextStream, LlmError>;
}

/// Drain a stream into one string, stopping at the first error
pub async fn collect_text(mut stream: TextStream) -> Result<String, LlmError> {
    let mut text = String::new();
    while let Some(fragment) = stream.next().await {
        text.push_str(&fragment?);
    }
    Ok(text)
}
