//! Configuration for kbook
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > environment > file > defaults. Files use TOML with `[llm]`, `[retry]`,
//! and `[defaults]` sections.

mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use cli_args::CliArgs;
pub use discovery::{
    ENV_HOME, ENV_MODEL_FAST, ENV_MODEL_HIGH_QUALITY, ENV_PROVIDER, ENV_RETRY_ATTEMPTS,
    ENV_RETRY_DELAY_MS, discover_config_file_from,
};
pub use model::{
    Backoff, Config, ConfigSource, DEFAULT_API_KEY_ENV, DEFAULT_FAST_MODEL,
    DEFAULT_HIGH_QUALITY_MODEL, DEFAULT_MAX_ATTEMPTS, DEFAULT_PROVIDER, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_TIMEOUT_SECS, InputDefaults, KNOWN_PROVIDERS, LlmConfig, ModelMap, RetryConfig,
};
