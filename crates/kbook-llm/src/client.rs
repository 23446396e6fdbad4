//! Generation client adapter
//!
//! Wraps a [`GenerationBackend`] with prompt construction, model selection,
//! and the per-call retry rules:
//!
//! - the outline stream is requested once; the caller owns its retry loop
//! - the title call retries on any error or a blank answer
//! - chapter streams retry initiation only; a stream that breaks mid-way is
//!   handed back as-is

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use kbook_config::{Config, ModelMap};
use kbook_utils::{GenerationMode, UserInputs};

use crate::LlmError;
use crate::http_client::redact_error_message;
use crate::prompts::{self, ChapterPrompt};
use crate::retry::RetryPolicy;
use crate::structure::BookStructure;
use crate::types::{CallPurpose, GenerationBackend, GenerationRequest, TextStream};

/// Arguments for one chapter stream
#[derive(Debug, Clone, Copy)]
pub struct ChapterRequest<'a> {
    pub inputs: &'a UserInputs,
    pub title: &'a str,
    pub unit_outline: &'a str,
    pub full_structure: &'a str,
    pub prior_text: &'a str,
    pub reference_text: &'a str,
    pub rewrite_instructions: Option<&'a str>,
}

#[derive(Clone)]
pub struct GenerationClient {
    backend: Arc<dyn GenerationBackend>,
    models: ModelMap,
    retry: RetryPolicy,
    timeout: Duration,
}

impl GenerationClient {
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        models: ModelMap,
        retry: RetryPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            models,
            retry,
            timeout,
        }
    }

    /// Build the configured backend and wrap it.
    ///
    /// # Errors
    ///
    /// Fails when the provider is unknown or its credentials are missing.
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let backend = crate::from_config(config)?;
        Ok(Self::with_backend(backend, config))
    }

    /// Wrap an existing backend using the models, retry, and timeout settings of `config`
    #[must_use]
    pub fn with_backend(backend: Arc<dyn GenerationBackend>, config: &Config) -> Self {
        Self::new(
            backend,
            config.llm.models.clone(),
            RetryPolicy::from_config(&config.retry),
            Duration::from_secs(config.llm.timeout_secs),
        )
    }

    #[must_use]
    pub fn model_for(&self, mode: GenerationMode) -> &str {
        self.models.for_mode(mode)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    #[must_use]
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    fn request(
        &self,
        purpose: CallPurpose,
        inputs: &UserInputs,
        prompt: String,
    ) -> GenerationRequest {
        GenerationRequest::new(
            purpose,
            self.model_for(inputs.generation_mode),
            prompt,
            self.timeout,
        )
    }

    /// Open the outline stream. Single attempt.
    ///
    /// # Errors
    ///
    /// Returns the backend's initiation error.
    pub async fn generate_structured(
        &self,
        inputs: &UserInputs,
        reference_text: &str,
    ) -> Result<TextStream, LlmError> {
        let prompt = prompts::structure_prompt(inputs, reference_text);
        self.backend
            .stream(self.request(CallPurpose::Outline, inputs, prompt))
            .await
    }

    /// Request a title for `structure`, retrying on errors and blank answers.
    ///
    /// # Errors
    ///
    /// Returns the last attempt's error once the budget is spent.
    pub async fn generate_title(
        &self,
        inputs: &UserInputs,
        structure: &BookStructure,
        reference_text: &str,
    ) -> Result<String, LlmError> {
        let prompt = prompts::title_prompt(inputs, &structure.to_pretty_json(), reference_text);
        let request = self.request(CallPurpose::Title, inputs, prompt);
        let backend = Arc::clone(&self.backend);
        let attempts = self.retry.attempts();

        self.retry
            .run_observed(
                move |attempt| {
                    let backend = Arc::clone(&backend);
                    let request = request.clone();
                    async move {
                        debug!(attempt, "requesting book title");
                        let text = backend.complete(request).await?;
                        let title = text.trim();
                        if title.is_empty() {
                            Err(LlmError::EmptyResponse(format!(
                                "book title was empty on attempt {attempt}"
                            )))
                        } else {
                            Ok(title.to_string())
                        }
                    }
                },
                |attempt, err| {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        error = %redact_error_message(&err.to_string()),
                        "title attempt failed"
                    );
                },
            )
            .await
    }

    /// Open a chapter stream, retrying initiation only.
    ///
    /// # Errors
    ///
    /// Returns the last initiation error once the budget is spent.
    pub async fn generate_chapter_stream(
        &self,
        chapter: ChapterRequest<'_>,
    ) -> Result<TextStream, LlmError> {
        let prompt = prompts::chapter_prompt(&ChapterPrompt {
            inputs: chapter.inputs,
            title: chapter.title,
            unit_outline: chapter.unit_outline,
            full_structure: chapter.full_structure,
            prior_text: chapter.prior_text,
            reference_text: chapter.reference_text,
            rewrite_instructions: chapter.rewrite_instructions,
        });
        let request = self.request(CallPurpose::Chapter, chapter.inputs, prompt);
        let backend = Arc::clone(&self.backend);
        let attempts = self.retry.attempts();
        let title = chapter.title;

        self.retry
            .run_observed(
                move |_| {
                    let backend = Arc::clone(&backend);
                    let request = request.clone();
                    async move { backend.stream(request).await }
                },
                |attempt, err| {
                    warn!(
                        attempt,
                        max_attempts = attempts,
                        chapter = title,
                        error = %redact_error_message(&err.to_string()),
                        "chapter stream initiation failed"
                    );
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted_backend::ScriptedBackend;
    use crate::structure::parse_structured_result;
    use crate::types::collect_text;

    fn client(backend: &Arc<ScriptedBackend>) -> GenerationClient {
        GenerationClient::new(
            Arc::clone(backend) as Arc<dyn GenerationBackend>,
            ModelMap {
                fast: "fast-model".into(),
                high_quality: "hq-model".into(),
            },
            RetryPolicy::default(),
            Duration::from_secs(5),
        )
    }

    fn structure() -> BookStructure {
        parse_structured_result(r#"{"A":"x"}"#).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn title_retries_blank_and_errors_then_trims() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_text(CallPurpose::Title, ["   "])
            .push_failure(CallPurpose::Title, LlmError::ProviderOutage("503".into()))
            .push_text(CallPurpose::Title, ["  The Title  \n"]);
        let title = client(&backend)
            .generate_title(&UserInputs::new("s"), &structure(), "")
            .await
            .unwrap();
        assert_eq!(title, "The Title");
        assert_eq!(backend.calls_for(CallPurpose::Title).len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn title_exhaustion_surfaces_last_error() {
        let backend = Arc::new(ScriptedBackend::new());
        for _ in 0..3 {
            backend.push_text(CallPurpose::Title, [""]);
        }
        let err = client(&backend)
            .generate_title(&UserInputs::new("s"), &structure(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::EmptyResponse(_)));
        assert_eq!(backend.calls_for(CallPurpose::Title).len(), 3);
    }

    #[tokio::test]
    async fn structured_call_is_not_retried_and_uses_mode_model() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_failure(CallPurpose::Outline, LlmError::Transport("down".into()));
        let mut inputs = UserInputs::new("s");
        inputs.generation_mode = GenerationMode::HighQuality;
        assert!(client(&backend).generate_structured(&inputs, "").await.is_err());
        let calls = backend.calls_for(CallPurpose::Outline);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "hq-model");
    }

    #[tokio::test(start_paused = true)]
    async fn chapter_initiation_is_retried_but_mid_stream_failure_is_returned() {
        let backend = Arc::new(ScriptedBackend::new());
        backend
            .push_failure(CallPurpose::Chapter, LlmError::Transport("refused".into()))
            .push_broken_stream(
                CallPurpose::Chapter,
                ["## A\n"],
                LlmError::Transport("reset".into()),
            );
        let inputs = UserInputs::new("s");
        let stream = client(&backend)
            .generate_chapter_stream(ChapterRequest {
                inputs: &inputs,
                title: "A",
                unit_outline: "x",
                full_structure: "{}",
                prior_text: "",
                reference_text: "",
                rewrite_instructions: None,
            })
            .await
            .unwrap();
        assert!(collect_text(stream).await.is_err());
        let calls = backend.calls_for(CallPurpose::Chapter);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].model, "fast-model");
        assert!(calls[1].prompt.contains("## A"));
    }
}
