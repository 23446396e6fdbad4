//! Outline acquisition: structure and title, retried as one unit

use tracing::{Instrument, debug, info, warn};

use kbook_llm::{
    BookStructure, GenerationClient, LlmError, collect_text, parse_structured_result,
    redact_error_message,
};
use kbook_utils::UserInputs;
use kbook_utils::logging::outline_span;

use crate::events::{EventBus, SessionEvent};

/// A parsed outline with its title, ready for review
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineDraft {
    pub structure: BookStructure,
    pub title: String,
}

/// Request, parse, and title an outline.
///
/// Each attempt streams the structure, rejects blank or malformed text, then
/// asks for a title. Any failure discards the attempt and, while the budget
/// lasts, the whole sequence is retried after the configured delay.
/// `on_attempt_failed` sees every failed attempt, the last one included.
///
/// # Errors
///
/// The last attempt's error once the budget is spent.
pub async fn acquire_outline(
    client: &GenerationClient,
    inputs: &UserInputs,
    reference_text: &str,
    events: &EventBus,
    mut on_attempt_failed: impl FnMut(u32, &LlmError),
) -> Result<OutlineDraft, LlmError> {
    let policy = client.retry_policy();
    let max_attempts = policy.attempts();
    let span = outline_span(&inputs.subject, inputs.outline_regeneration_prompt.is_some());

    async move {
        let draft = policy
            .run_observed(
                move |attempt| attempt_outline(client, inputs, reference_text, attempt),
                |attempt, err: &LlmError| {
                    let message = err.to_string();
                    warn!(
                        attempt,
                        max_attempts,
                        error = %redact_error_message(&message),
                        "outline attempt failed"
                    );
                    events.publish(SessionEvent::AttemptFailed {
                        attempt,
                        max_attempts,
                        message,
                    });
                    on_attempt_failed(attempt, err);
                },
            )
            .await?;
        info!(
            sections = draft.structure.len(),
            title = %draft.title,
            "outline ready"
        );
        Ok(draft)
    }
    .instrument(span)
    .await
}

async fn attempt_outline(
    client: &GenerationClient,
    inputs: &UserInputs,
    reference_text: &str,
    attempt: u32,
) -> Result<OutlineDraft, LlmError> {
    debug!(attempt, "requesting outline");
    let stream = client.generate_structured(inputs, reference_text).await?;
    let text = collect_text(stream).await?;
    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse(
            "Empty book structure received".to_string(),
        ));
    }
    let structure = parse_structured_result(&text)?;
    let requested = inputs.number_of_chapters as usize;
    if structure.len() != requested {
        warn!(
            requested,
            received = structure.len(),
            "outline section count differs from the requested chapter count"
        );
    }
    let title = client
        .generate_title(inputs, &structure, reference_text)
        .await?;
    Ok(OutlineDraft { structure, title })
}
