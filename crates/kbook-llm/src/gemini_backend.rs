//! Gemini HTTP backend
//!
//! Talks to the Generative Language REST API: `generateContent` for single-shot
//! calls and `streamGenerateContent?alt=sse` for fragment streams.

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

use crate::LlmError;
use crate::http_client::{HttpClient, redact_error_message};
use crate::types::{GenerationBackend, GenerationRequest, TextStream};
use kbook_config::Config;

/// Default API root
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const PROVIDER: &str = "gemini";

pub(crate) struct GeminiBackend {
    client: HttpClient,
    base_url: String,
    api_key: String,
}

impl GeminiBackend {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        max_timeout: Duration,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            client: HttpClient::with_max_timeout(max_timeout)?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
        })
    }

    /// Build from configuration, reading the key from `[llm] api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the key variable is unset or blank.
    pub fn new_from_config(config: &Config) -> Result<Self, LlmError> {
        let api_key_env = &config.llm.api_key_env;
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "API key not found in environment variable '{api_key_env}'. \
                     Set it or configure a different api_key_env in [llm]."
                ))
            })?;
        Self::new(
            api_key,
            config.llm.base_url.clone(),
            Duration::from_secs(config.llm.timeout_secs),
        )
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{model}:{method}", self.base_url)
    }

    fn request(&self, url: &str, prompt: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&GeminiRequest::user_prompt(prompt))
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: GenerationRequest) -> Result<String, LlmError> {
        debug!(
            provider = PROVIDER,
            purpose = %request.purpose,
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "Invoking Gemini generateContent"
        );
        let url = self.endpoint(&request.model, "generateContent");
        let response = self
            .client
            .execute(self.request(&url, &request.prompt), request.timeout, true, PROVIDER)
            .await?;

        let body: GeminiResponse = response.json().await.map_err(|e| {
            LlmError::Transport(format!(
                "Failed to read Gemini response: {}",
                redact_error_message(&e.to_string())
            ))
        })?;
        Ok(body.text())
    }

    async fn stream(&self, request: GenerationRequest) -> Result<TextStream, LlmError> {
        debug!(
            provider = PROVIDER,
            purpose = %request.purpose,
            model = %request.model,
            "Opening Gemini stream"
        );
        let url = format!(
            "{}?alt=sse",
            self.endpoint(&request.model, "streamGenerateContent")
        );
        let response = self
            .client
            .execute(self.request(&url, &request.prompt), request.timeout, false, PROVIDER)
            .await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(sse_text_stream(bytes))
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    queued: VecDeque<String>,
    /// Reported once the texts decoded before it have been yielded
    pending_error: Option<LlmError>,
    finished: bool,
}

impl SseState {
    fn enqueue(&mut self, payloads: Vec<String>) {
        for payload in payloads {
            match parse_event(&payload) {
                Ok(Some(text)) => self.queued.push_back(text),
                Ok(None) => {}
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    fn fail(&mut self, error: LlmError) {
        self.pending_error = Some(error);
        self.finished = true;
    }
}

fn sse_text_stream(bytes: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>) -> TextStream {
    let state = SseState {
        bytes,
        decoder: SseDecoder::default(),
        queued: VecDeque::new(),
        pending_error: None,
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(text) = st.queued.pop_front() {
                return Some((Ok(text), st));
            }
            if let Some(error) = st.pending_error.take() {
                return Some((Err(error), st));
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let payloads = st.decoder.push(&chunk);
                    st.enqueue(payloads);
                }
                Some(Err(e)) => st.fail(LlmError::Transport(format!(
                    "Gemini stream interrupted: {}",
                    redact_error_message(&e.to_string())
                ))),
                None => {
                    st.finished = true;
                    let payloads = st.decoder.finish();
                    st.enqueue(payloads);
                }
            }
        }
    }))
}

/// Line-oriented decoder for `text/event-stream` bodies.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; only complete lines
/// are decoded.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes, returning the `data:` payloads of every completed line
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\n', '\r']);
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

/// Decode one SSE payload into its text, if it carries any
fn parse_event(payload: &str) -> Result<Option<String>, LlmError> {
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Ok(None);
    }
    let event: GeminiResponse =
        serde_json::from_str(payload).map_err(|e| LlmError::MalformedResponse {
            message: format!("Unreadable Gemini stream event: {e}"),
            raw: payload.to_string(),
        })?;
    let text = event.text();
    trace!(chars = text.len(), "Gemini stream event");
    Ok((!text.is_empty()).then_some(text))
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
}

impl GeminiRequest {
    fn user_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    /// Text of the first candidate, parts concatenated
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}
