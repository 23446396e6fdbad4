use std::env;
use std::path::{Path, PathBuf};

use kbook_utils::ConfigError;
use tracing::debug;

use crate::cli_args::CliArgs;
use crate::model::{Config, ConfigSource, TomlConfig};

/// Environment variables consulted between the file and the CLI
pub const ENV_HOME: &str = "KBOOK_HOME";
pub const ENV_PROVIDER: &str = "KBOOK_PROVIDER";
pub const ENV_MODEL_FAST: &str = "KBOOK_MODEL_FAST";
pub const ENV_MODEL_HIGH_QUALITY: &str = "KBOOK_MODEL_HIGH_QUALITY";
pub const ENV_RETRY_ATTEMPTS: &str = "KBOOK_RETRY_ATTEMPTS";
pub const ENV_RETRY_DELAY_MS: &str = "KBOOK_RETRY_DELAY_MS";

const CONFIG_DIR: &str = ".kbook";
const CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Discover configuration starting from the current directory.
    ///
    /// # Errors
    ///
    /// Fails when the working directory is unreadable, an explicit config path is
    /// missing, the file does not parse, or the merged result is invalid.
    pub fn discover(cli: &CliArgs) -> Result<Self, ConfigError> {
        let cwd = env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot read working directory: {e}"),
        })?;
        Self::discover_from(&cwd, cli)
    }

    /// Discover configuration starting from `start_dir`.
    ///
    /// # Errors
    ///
    /// See [`Config::discover`].
    pub fn discover_from(start_dir: &Path, cli: &CliArgs) -> Result<Self, ConfigError> {
        let path = match &cli.config_path {
            Some(explicit) if !explicit.is_file() => {
                return Err(ConfigError::NotFound {
                    path: explicit.display().to_string(),
                });
            }
            Some(explicit) => Some(explicit.clone()),
            None => discover_config_file_from(start_dir),
        };

        let mut config = Self::default();
        if let Some(path) = &path {
            debug!(path = %path.display(), "loading config file");
            config.apply_file(load_config_file(path)?);
            config.config_file = Some(path.clone());
        }
        config.apply_env(|key| env::var(key).ok())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    fn attribute(&mut self, key: &str, source: ConfigSource) {
        self.source_attribution.insert(key.to_string(), source);
    }

    pub(crate) fn apply_file(&mut self, file: TomlConfig) {
        let src = ConfigSource::Config;
        if let Some(llm) = file.llm {
            if let Some(v) = llm.provider {
                self.llm.provider = v;
                self.attribute("provider", src.clone());
            }
            if let Some(v) = llm.base_url {
                self.llm.base_url = Some(v);
                self.attribute("base_url", src.clone());
            }
            if let Some(v) = llm.api_key_env {
                self.llm.api_key_env = v;
                self.attribute("api_key_env", src.clone());
            }
            if let Some(v) = llm.timeout_secs {
                self.llm.timeout_secs = v;
                self.attribute("timeout_secs", src.clone());
            }
            if let Some(models) = llm.models {
                if let Some(v) = models.fast {
                    self.llm.models.fast = v;
                    self.attribute("model_fast", src.clone());
                }
                if let Some(v) = models.high_quality {
                    self.llm.models.high_quality = v;
                    self.attribute("model_high_quality", src.clone());
                }
            }
        }
        if let Some(retry) = file.retry {
            if let Some(v) = retry.max_attempts {
                self.retry.max_attempts = v;
                self.attribute("retry_attempts", src.clone());
            }
            if let Some(v) = retry.delay_ms {
                self.retry.delay_ms = v;
                self.attribute("retry_delay_ms", src.clone());
            }
            if let Some(v) = retry.backoff {
                self.retry.backoff = v;
                self.attribute("retry_backoff", src.clone());
            }
        }
        if let Some(defaults) = file.defaults {
            if let Some(v) = defaults.language {
                self.defaults.language = v;
                self.attribute("language", src.clone());
            }
            if let Some(v) = defaults.generation_mode {
                self.defaults.generation_mode = v;
                self.attribute("generation_mode", src.clone());
            }
            if let Some(v) = defaults.content_length {
                self.defaults.content_length = v;
                self.attribute("content_length", src.clone());
            }
            if let Some(v) = defaults.reading_level {
                self.defaults.reading_level = v;
                self.attribute("reading_level", src.clone());
            }
            if let Some(v) = defaults.chapters {
                self.defaults.chapters = v;
                self.attribute("chapters", src);
            }
        }
    }

    /// Layer environment overrides read through `lookup`
    pub(crate) fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup(ENV_PROVIDER) {
            self.llm.provider = v;
            self.attribute("provider", ConfigSource::Env);
        }
        if let Some(v) = lookup(ENV_MODEL_FAST) {
            self.llm.models.fast = v;
            self.attribute("model_fast", ConfigSource::Env);
        }
        if let Some(v) = lookup(ENV_MODEL_HIGH_QUALITY) {
            self.llm.models.high_quality = v;
            self.attribute("model_high_quality", ConfigSource::Env);
        }
        if let Some(v) = lookup(ENV_RETRY_ATTEMPTS) {
            self.retry.max_attempts = parse_env(ENV_RETRY_ATTEMPTS, &v)?;
            self.attribute("retry_attempts", ConfigSource::Env);
        }
        if let Some(v) = lookup(ENV_RETRY_DELAY_MS) {
            self.retry.delay_ms = parse_env(ENV_RETRY_DELAY_MS, &v)?;
            self.attribute("retry_delay_ms", ConfigSource::Env);
        }
        Ok(())
    }

    pub(crate) fn apply_cli(&mut self, cli: &CliArgs) {
        if let Some(v) = &cli.provider {
            self.llm.provider.clone_from(v);
            self.attribute("provider", ConfigSource::Cli);
        }
        if let Some(v) = &cli.base_url {
            self.llm.base_url = Some(v.clone());
            self.attribute("base_url", ConfigSource::Cli);
        }
        if let Some(v) = &cli.model_fast {
            self.llm.models.fast.clone_from(v);
            self.attribute("model_fast", ConfigSource::Cli);
        }
        if let Some(v) = &cli.model_high_quality {
            self.llm.models.high_quality.clone_from(v);
            self.attribute("model_high_quality", ConfigSource::Cli);
        }
        if let Some(v) = cli.timeout_secs {
            self.llm.timeout_secs = v;
            self.attribute("timeout_secs", ConfigSource::Cli);
        }
        if let Some(v) = cli.retry_attempts {
            self.retry.max_attempts = v;
            self.attribute("retry_attempts", ConfigSource::Cli);
        }
        if let Some(v) = cli.retry_delay_ms {
            self.retry.delay_ms = v;
            self.attribute("retry_delay_ms", ConfigSource::Cli);
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// Find a config file for `start_dir`.
///
/// Searches `.kbook/config.toml` upward (stopping at a repository root), then
/// `$KBOOK_HOME/config.toml`, then the platform config directory.
#[must_use]
pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
    let mut current_dir = Some(start_dir);
    while let Some(dir) = current_dir {
        let candidate = dir.join(CONFIG_DIR).join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists() {
            break;
        }
        current_dir = dir.parent();
    }

    if let Some(home) = env::var_os(ENV_HOME) {
        let candidate = PathBuf::from(home).join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("kbook").join(CONFIG_FILE))
        .filter(|candidate| candidate.is_file())
}

fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::InvalidFile(format!("cannot read {}: {e}", path.display()))
    })?;
    toml::from_str(&content)
        .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
}
