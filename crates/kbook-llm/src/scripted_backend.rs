//! Deterministic backend replaying queued responses
//!
//! Each [`CallPurpose`] has its own queue, so a test scripts outline, title,
//! and chapter replies independently of how the calls interleave. Every call is
//! recorded for later assertions.

use async_trait::async_trait;
use futures::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use crate::LlmError;
use crate::types::{CallPurpose, GenerationBackend, GenerationRequest, TextStream};

/// One scripted reply
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// The call fails before any text is produced
    OpenFailure(LlmError),
    /// Text delivered as these fragments
    Chunks(Vec<String>),
    /// Fragments followed by a failure
    ChunksThenFailure(Vec<String>, LlmError),
}

/// A call as the backend saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub purpose: CallPurpose,
    pub model: String,
    pub prompt: String,
    pub streaming: bool,
}

#[derive(Default)]
pub struct ScriptedBackend {
    queues: Mutex<HashMap<CallPurpose, VecDeque<ScriptStep>>>,
    calls: Mutex<Vec<RecordedCall>>,
    offline: bool,
}

impl ScriptedBackend {
    /// Backend that fails any call without a queued reply
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend that synthesizes a placeholder book when nothing is queued
    #[must_use]
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn push(&self, purpose: CallPurpose, step: ScriptStep) -> &Self {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(purpose)
            .or_default()
            .push_back(step);
        self
    }

    /// Queue a successful reply made of `chunks`
    pub fn push_text<I, S>(&self, purpose: CallPurpose, chunks: I) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(
            purpose,
            ScriptStep::Chunks(chunks.into_iter().map(Into::into).collect()),
        )
    }

    pub fn push_failure(&self, purpose: CallPurpose, error: LlmError) -> &Self {
        self.push(purpose, ScriptStep::OpenFailure(error))
    }

    /// Queue fragments that end in `error`
    pub fn push_broken_stream<I, S>(
        &self,
        purpose: CallPurpose,
        chunks: I,
        error: LlmError,
    ) -> &Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(
            purpose,
            ScriptStep::ChunksThenFailure(chunks.into_iter().map(Into::into).collect(), error),
        )
    }

    /// Every call so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn calls_for(&self, purpose: CallPurpose) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.purpose == purpose)
            .collect()
    }

    /// Replies still queued for `purpose`
    #[must_use]
    pub fn remaining(&self, purpose: CallPurpose) -> usize {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&purpose)
            .map_or(0, VecDeque::len)
    }

    fn next_step(
        &self,
        request: &GenerationRequest,
        streaming: bool,
    ) -> Result<ScriptStep, LlmError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedCall {
                purpose: request.purpose,
                model: request.model.clone(),
                prompt: request.prompt.clone(),
                streaming,
            });
        let queued = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&request.purpose)
            .and_then(VecDeque::pop_front);
        match queued {
            Some(step) => Ok(step),
            None if self.offline => Ok(ScriptStep::Chunks(placeholder(request.purpose))),
            None => Err(LlmError::Transport(format!(
                "scripted backend has no {} reply queued",
                request.purpose
            ))),
        }
    }
}

fn placeholder(purpose: CallPurpose) -> Vec<String> {
    match purpose {
        CallPurpose::Outline => {
            let sections: Vec<String> = (1..=kbook_utils::types::DEFAULT_CHAPTERS)
                .map(|n| format!("\"Part {n}\":\"Placeholder description for part {n}\""))
                .collect();
            vec![format!("{{{}}}", sections.join(","))]
        }
        CallPurpose::Title => {
            vec!["An Offline Draft Written Without Any Generation Service At All".to_string()]
        }
        CallPurpose::Chapter => vec![
            "## Placeholder chapter\n\n".to_string(),
            "Offline draft text.".to_string(),
        ],
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: GenerationRequest) -> Result<String, LlmError> {
        match self.next_step(&request, false)? {
            ScriptStep::OpenFailure(e) | ScriptStep::ChunksThenFailure(_, e) => Err(e),
            ScriptStep::Chunks(chunks) => Ok(chunks.concat()),
        }
    }

    async fn stream(&self, request: GenerationRequest) -> Result<TextStream, LlmError> {
        let items: Vec<Result<String, LlmError>> = match self.next_step(&request, true)? {
            ScriptStep::OpenFailure(e) => return Err(e),
            ScriptStep::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            ScriptStep::ChunksThenFailure(chunks, e) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(e)))
                .collect(),
        };
        Ok(Box::pin(stream::iter(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::collect_text;
    use std::time::Duration;

    fn req(purpose: CallPurpose) -> GenerationRequest {
        GenerationRequest::new(purpose, "m", "p", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn queues_are_separate_per_purpose() {
        let backend = ScriptedBackend::new();
        backend
            .push_text(CallPurpose::Title, ["A title"])
            .push_text(CallPurpose::Outline, ["{\"A\":", "\"x\"}"]);

        let outline = collect_text(backend.stream(req(CallPurpose::Outline)).await.unwrap())
            .await
            .unwrap();
        assert_eq!(outline, "{\"A\":\"x\"}");
        assert_eq!(backend.complete(req(CallPurpose::Title)).await.unwrap(), "A title");
        assert_eq!(backend.calls().len(), 2);
        assert!(backend.calls()[0].streaming);
    }

    #[tokio::test]
    async fn empty_queue_fails_unless_offline() {
        assert!(ScriptedBackend::new().complete(req(CallPurpose::Title)).await.is_err());
        let offline = ScriptedBackend::offline();
        let outline = collect_text(offline.stream(req(CallPurpose::Outline)).await.unwrap())
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&outline).unwrap();
        assert_eq!(value.as_object().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn broken_stream_yields_chunks_then_error() {
        let backend = ScriptedBackend::new();
        backend.push_broken_stream(
            CallPurpose::Chapter,
            ["## One\n", "partial"],
            LlmError::Transport("reset".into()),
        );
        let s = backend.stream(req(CallPurpose::Chapter)).await.unwrap();
        assert!(collect_text(s).await.is_err());
        assert_eq!(backend.remaining(CallPurpose::Chapter), 0);
    }
}
