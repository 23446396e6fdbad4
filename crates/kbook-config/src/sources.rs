use crate::model::{Config, ConfigSource};

impl Config {
    /// Origin of a resolved key; unattributed keys are defaults
    #[must_use]
    pub fn source_of(&self, key: &str) -> ConfigSource {
        self.source_attribution
            .get(key)
            .cloned()
            .unwrap_or(ConfigSource::Default)
    }

    /// Effective configuration as `(key, value, source)` rows in display order
    #[must_use]
    pub fn effective_config(&self) -> Vec<(&'static str, String, ConfigSource)> {
        let rows = [
            ("provider", self.llm.provider.clone()),
            (
                "base_url",
                self.llm.base_url.clone().unwrap_or_else(|| "(provider default)".to_string()),
            ),
            ("api_key_env", self.llm.api_key_env.clone()),
            ("timeout_secs", self.llm.timeout_secs.to_string()),
            ("model_fast", self.llm.models.fast.clone()),
            ("model_high_quality", self.llm.models.high_quality.clone()),
            ("retry_attempts", self.retry.max_attempts.to_string()),
            ("retry_delay_ms", self.retry.delay_ms.to_string()),
            ("retry_backoff", self.retry.backoff.to_string()),
            ("language", self.defaults.language.clone()),
            ("generation_mode", self.defaults.generation_mode.to_string()),
            ("content_length", self.defaults.content_length.to_string()),
            ("reading_level", self.defaults.reading_level.to_string()),
            ("chapters", self.defaults.chapters.to_string()),
        ];
        rows.into_iter()
            .map(|(key, value)| (key, value, self.source_of(key)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_row_defaults_to_default_source() {
        let config = Config::default();
        let rows = config.effective_config();
        assert_eq!(rows.len(), 14);
        assert!(rows.iter().all(|(_, _, src)| *src == ConfigSource::Default));
        assert!(rows.iter().any(|(k, v, _)| *k == "generation_mode" && v == "fast"));
    }
}
