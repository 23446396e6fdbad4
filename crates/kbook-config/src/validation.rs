use kbook_utils::ConfigError;
use kbook_utils::UserInputs;

use crate::model::{Config, KNOWN_PROVIDERS};

impl Config {
    /// Check the merged configuration, collecting every problem.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationFailed`] listing all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if !KNOWN_PROVIDERS.contains(&self.llm.provider.as_str()) {
            errors.push(format!(
                "llm.provider '{}' is not one of: {}",
                self.llm.provider,
                KNOWN_PROVIDERS.join(", ")
            ));
        }
        if self.llm.api_key_env.trim().is_empty() {
            errors.push("llm.api_key_env must not be empty".to_string());
        }
        if self.llm.timeout_secs == 0 {
            errors.push("llm.timeout_secs must be greater than 0".to_string());
        }
        if self.llm.models.fast.trim().is_empty() {
            errors.push("llm.models.fast must not be empty".to_string());
        }
        if self.llm.models.high_quality.trim().is_empty() {
            errors.push("llm.models.high_quality must not be empty".to_string());
        }
        if self.retry.max_attempts == 0 {
            errors.push("retry.max_attempts must be at least 1".to_string());
        }

        // Defaults must describe a submittable request on their own.
        if let Err(e) = self.defaults.inputs_for("defaults").validate() {
            errors.push(format!("defaults: {e}"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationFailed {
                error_count: errors.len(),
                errors,
            })
        }
    }

    /// Inputs for `subject` seeded from `[defaults]`
    #[must_use]
    pub fn inputs_for(&self, subject: impl Into<String>) -> UserInputs {
        self.defaults.inputs_for(subject)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn all_violations_are_reported() {
        let mut config = Config::default();
        config.llm.provider = "carrier-pigeon".into();
        config.retry.max_attempts = 0;
        config.llm.timeout_secs = 0;
        config.defaults.chapters = 40;

        match config.validate() {
            Err(ConfigError::ValidationFailed {
                errors,
                error_count,
            }) => {
                assert_eq!(error_count, 4);
                assert!(errors.iter().any(|e| e.contains("carrier-pigeon")));
                assert!(errors.iter().any(|e| e.starts_with("defaults: chapters")));
            }
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn inputs_inherit_defaults() {
        let mut config = Config::default();
        config.defaults.language = "de".into();
        config.defaults.reading_level = 8;
        let inputs = config.inputs_for("Compilers");
        assert_eq!(inputs.subject, "Compilers");
        assert_eq!(inputs.language, "de");
        assert_eq!(inputs.reading_level, 8);
        assert_eq!(inputs.outline_regeneration_prompt, None);
    }
}
