//! Shared HTTP client for HTTP-based generation providers
//!
//! One `reqwest::Client` is built per backend and reused for every call.
//! Each call is a single attempt; status codes are mapped onto [`LlmError`]
//! variants so the retry policy upstream can decide what to do.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::LlmError;

/// Default connect timeout (30 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub(crate) struct HttpClient {
    client: Arc<Client>,
    max_timeout: Duration,
}

impl HttpClient {
    /// Create a client whose requests never run longer than `max_timeout`
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the client cannot be constructed
    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .use_rustls_tls()
            .build()
            .map_err(|e| LlmError::Misconfiguration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client: Arc::new(client),
            max_timeout,
        })
    }

    /// Start a POST request on the shared client
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Send a request once and map failure statuses.
    ///
    /// For streaming responses the timeout only bounds the wait for headers
    /// when `bound_body` is false.
    ///
    /// # Errors
    ///
    /// - `LlmError::ProviderAuth` for 401/403
    /// - `LlmError::ProviderQuota` for 429
    /// - `LlmError::ProviderOutage` for 5xx
    /// - `LlmError::Timeout` when the deadline passes
    /// - `LlmError::Transport` for anything else
    pub async fn execute(
        &self,
        request_builder: RequestBuilder,
        request_timeout: Duration,
        bound_body: bool,
        provider_name: &str,
    ) -> Result<Response, LlmError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let builder = if bound_body {
            request_builder.timeout(effective_timeout)
        } else {
            request_builder
        };
        let request = builder
            .build()
            .map_err(|e| LlmError::Transport(format!("Failed to build request: {e}")))?;

        debug!(
            provider = provider_name,
            timeout_secs = effective_timeout.as_secs(),
            "Executing HTTP request"
        );

        let response = match tokio::time::timeout(effective_timeout, self.client.execute(request))
            .await
        {
            Err(_) => {
                return Err(LlmError::Timeout {
                    duration: effective_timeout,
                });
            }
            Ok(Err(e)) if e.is_timeout() => {
                return Err(LlmError::Timeout {
                    duration: effective_timeout,
                });
            }
            Ok(Err(e)) => {
                return Err(LlmError::Transport(format!(
                    "{provider_name} request failed: {}",
                    redact_error_message(&e.to_string())
                )));
            }
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if status.is_client_error() {
            return Err(map_client_error(status, provider_name));
        }
        if status.is_server_error() {
            return Err(LlmError::ProviderOutage(format!(
                "{provider_name} returned server error: {status}"
            )));
        }
        Ok(response)
    }
}

/// Map HTTP client error status codes to `LlmError` variants
fn map_client_error(status: StatusCode, provider_name: &str) -> LlmError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            LlmError::ProviderAuth(format!("{provider_name} authentication failed: {status}"))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            LlmError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        _ => LlmError::Transport(format!("{provider_name} returned client error: {status}")),
    }
}

/// Pattern to match URLs with embedded credentials
static URL_WITH_CREDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(https?://)[^:@\s]+:[^@\s]+@").unwrap());

/// Pattern to match `key=` query parameters
static KEY_QUERY_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([?&](?:key|api_key)=)[^&\s]+").unwrap());

/// Pattern to match potential API keys (long runs of key-like characters)
static POTENTIAL_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^A-Za-z0-9_-])[A-Za-z0-9_-]{32,}(?:[^A-Za-z0-9_-]|$)").unwrap()
});

/// Strip credentials from a message before it is logged or shown.
///
/// - `user:pass@` in URLs
/// - `key=` / `api_key=` query parameters
/// - anything shaped like a long API key
#[must_use]
pub fn redact_error_message(message: &str) -> String {
    let redacted = URL_WITH_CREDS.replace_all(message, "$1[REDACTED]@");
    let redacted = KEY_QUERY_PARAM.replace_all(&redacted, "$1[REDACTED]");
    let redacted = POTENTIAL_KEY.replace_all(&redacted, "[REDACTED_KEY]");
    redacted.into_owned()
}
