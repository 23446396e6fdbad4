use std::path::PathBuf;

/// Overrides supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit config file; must exist when set
    pub config_path: Option<PathBuf>,
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub model_fast: Option<String>,
    pub model_high_quality: Option<String>,
    pub timeout_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}
