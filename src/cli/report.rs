//! User-facing error reports on stderr

use kbook_llm::redact_error_message;
use kbook_utils::UserFriendlyError;

/// Render `error` with its context and suggestions. Every line is redacted.
pub(crate) fn contextual_report<E: UserFriendlyError>(error: &E, operation: &str) -> String {
    let mut report = format!(
        "✗ {} failed: {}",
        operation,
        redact_error_message(&error.user_message())
    );
    if let Some(context) = error.context() {
        report.push_str(&format!("\n\n  {}", redact_error_message(&context)));
    }
    let suggestions = error.suggestions();
    if !suggestions.is_empty() {
        report.push_str("\n\n  Suggestions:");
        for (i, suggestion) in suggestions.iter().enumerate() {
            report.push_str(&format!("\n    {}. {}", i + 1, suggestion));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbook_utils::{LlmError, ValidationError};

    #[test]
    fn report_lists_numbered_suggestions() {
        let report = contextual_report(&ValidationError::EmptySubject, "generate");
        assert!(
            report.starts_with("✗ generate failed: Invalid input: Subject must not be empty")
        );
        assert!(report.contains("Suggestions:\n    1. "));
    }

    #[test]
    fn report_redacts_keys() {
        let err = LlmError::Transport(
            "GET https://example.com/v1?key=AIzaSyA1234567890abcdefghijklmnop failed".into(),
        );
        let report = contextual_report(&err, "outline");
        assert!(!report.contains("AIzaSyA1234567890abcdefghijklmnop"));
    }
}
