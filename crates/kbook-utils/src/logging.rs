//! Logging and observability setup
//!
//! Structured logging goes through `tracing`. Binaries call [`init_tracing`] once;
//! libraries only emit events and spans.

use std::io::IsTerminal;
use tracing::{Level, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, one line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Check if colored output should be used.
///
/// Returns true only if stderr is a terminal and `NO_COLOR` is unset.
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Default filter directive when `RUST_LOG` is not set
#[must_use]
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "kbook=debug,info"
    } else {
        "kbook=info,warn"
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins over the verbosity default. Logs go to stderr so stdout stays
/// free for the generated document.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(verbose: bool, format: LogFormat) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_current_span(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .try_init()?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(use_color())
                        .with_target(verbose)
                        .with_thread_ids(false)
                        .with_line_number(false)
                        .with_file(false)
                        .with_span_events(if verbose {
                            FmtSpan::CLOSE
                        } else {
                            FmtSpan::NONE
                        })
                        .compact(),
                )
                .try_init()?;
        }
    }

    Ok(())
}

/// Span covering one outline acquisition (all attempts)
#[must_use]
pub fn outline_span(subject: &str, regeneration: bool) -> tracing::Span {
    span!(
        Level::INFO,
        "outline_acquisition",
        subject = %subject,
        regeneration = regeneration,
    )
}

/// Span covering one chapter generation run
#[must_use]
pub fn chapter_span(task_id: &str, title: &str, rewrite: bool) -> tracing::Span {
    span!(
        Level::INFO,
        "chapter_generation",
        task_id = %task_id,
        title = %title,
        rewrite = rewrite,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_directive_enables_debug() {
        assert!(default_directive(true).contains("kbook=debug"));
        assert!(default_directive(false).contains("kbook=info"));
    }

    #[test]
    fn directives_parse() {
        assert!(EnvFilter::try_new(default_directive(true)).is_ok());
        assert!(EnvFilter::try_new(default_directive(false)).is_ok());
    }
}
