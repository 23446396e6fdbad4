use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use kbook_utils::types::{
    DEFAULT_CHAPTERS, DEFAULT_CONTENT_LENGTH, DEFAULT_LANGUAGE, DEFAULT_READING_LEVEL,
};
use kbook_utils::{GenerationMode, UserInputs};

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_FAST_MODEL: &str = "gemini-2.5-flash-preview-05-20";
pub const DEFAULT_HIGH_QUALITY_MODEL: &str = "gemini-2.5-pro-preview-06-05";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// Providers the backend factory knows how to build
pub const KNOWN_PROVIDERS: &[&str] = &["gemini", "scripted"];

/// Where a configuration value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence)
    Cli,
    /// Value read from an environment variable
    Env,
    /// Value loaded from a configuration file
    Config,
    /// Value set programmatically
    Programmatic,
    /// Built-in default value (lowest precedence)
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cli => write!(f, "cli"),
            Self::Env => write!(f, "env"),
            Self::Config => write!(f, "config"),
            Self::Programmatic => write!(f, "programmatic"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Resolved kbook configuration.
///
/// Precedence: CLI arguments > environment > config file > built-in defaults.
/// Every resolved key records its origin in `source_attribution`.
///
/// # Configuration File Format
///
/// ```toml
/// [llm]
/// provider = "gemini"
/// api_key_env = "GEMINI_API_KEY"
/// timeout_secs = 300
///
/// [llm.models]
/// fast = "gemini-2.5-flash-preview-05-20"
/// high_quality = "gemini-2.5-pro-preview-06-05"
///
/// [retry]
/// max_attempts = 3
/// delay_ms = 2000
/// backoff = "fixed"
///
/// [defaults]
/// language = "en"
/// generation_mode = "fast"
/// content_length = 7000
/// reading_level = 5
/// chapters = 6
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub defaults: InputDefaults,
    /// File the values were loaded from, if any
    pub config_file: Option<PathBuf>,
    #[serde(skip)]
    pub source_attribution: HashMap<String, ConfigSource>,
}

/// Generation service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmConfig {
    pub provider: String,
    /// Override for the provider's API root (proxies, test servers)
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub models: ModelMap,
}

/// Mode to model identifier mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelMap {
    pub fast: String,
    pub high_quality: String,
}

impl ModelMap {
    #[must_use]
    pub fn for_mode(&self, mode: GenerationMode) -> &str {
        match mode {
            GenerationMode::Fast => &self.fast,
            GenerationMode::HighQuality => &self.high_quality,
        }
    }
}

impl Default for ModelMap {
    fn default() -> Self {
        Self {
            fast: DEFAULT_FAST_MODEL.to_string(),
            high_quality: DEFAULT_HIGH_QUALITY_MODEL.to_string(),
        }
    }
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

impl fmt::Display for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Exponential => write!(f, "exponential"),
        }
    }
}

/// Retry budget shared by outline and chapter call sites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay_ms: u64,
    pub backoff: Backoff,
}

/// Defaults for the user inputs the CLI does not set explicitly
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputDefaults {
    pub language: String,
    pub generation_mode: GenerationMode,
    pub content_length: u32,
    pub reading_level: u32,
    pub chapters: u32,
}

impl InputDefaults {
    /// Build inputs for `subject` seeded with these defaults
    #[must_use]
    pub fn inputs_for(&self, subject: impl Into<String>) -> UserInputs {
        UserInputs {
            language: self.language.clone(),
            generation_mode: self.generation_mode,
            content_length: self.content_length,
            reading_level: self.reading_level,
            number_of_chapters: self.chapters,
            ..UserInputs::new(subject)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: DEFAULT_PROVIDER.to_string(),
                base_url: None,
                api_key_env: DEFAULT_API_KEY_ENV.to_string(),
                timeout_secs: DEFAULT_TIMEOUT_SECS,
                models: ModelMap::default(),
            },
            retry: RetryConfig {
                max_attempts: DEFAULT_MAX_ATTEMPTS,
                delay_ms: DEFAULT_RETRY_DELAY_MS,
                backoff: Backoff::Fixed,
            },
            defaults: InputDefaults {
                language: DEFAULT_LANGUAGE.to_string(),
                generation_mode: GenerationMode::Fast,
                content_length: DEFAULT_CONTENT_LENGTH,
                reading_level: DEFAULT_READING_LEVEL,
                chapters: DEFAULT_CHAPTERS,
            },
            config_file: None,
            source_attribution: HashMap::new(),
        }
    }
}

/// On-disk shape of `config.toml`; every key is optional
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct TomlConfig {
    pub llm: Option<TomlLlm>,
    pub retry: Option<TomlRetry>,
    pub defaults: Option<TomlDefaults>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct TomlLlm {
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub timeout_secs: Option<u64>,
    pub models: Option<TomlModels>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct TomlModels {
    pub fast: Option<String>,
    pub high_quality: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct TomlRetry {
    pub max_attempts: Option<u32>,
    pub delay_ms: Option<u64>,
    pub backoff: Option<Backoff>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub(crate) struct TomlDefaults {
    pub language: Option<String>,
    pub generation_mode: Option<GenerationMode>,
    pub content_length: Option<u32>,
    pub reading_level: Option<u32>,
    pub chapters: Option<u32>,
}
