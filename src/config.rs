//! Survey configuration
//!
//! Loaded from an optional TOML file; every field has a default matching the
//! deployed study, so an absent file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::types::{default_phases, PhaseDef};
use crate::{
    DEFAULT_FLUSH_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECESS_SECS,
    DEFAULT_WRITER_QUEUE_CAPACITY, PHASE_COUNT,
};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Ordered phase schedule, fixed for the lifetime of a run
    pub phases: Vec<PhaseDef>,
    pub recess_secs: u64,
    pub poll_interval_ms: u64,
    pub flush_timeout_secs: u64,
    pub writer_queue_capacity: usize,
    /// Code appended to the return link on completion
    pub completion_code: String,
    /// Used when the participant arrives without a return URL
    pub default_return_url: String,
    pub gateway: GatewayConfig,
    pub sink: SinkConfig,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            phases: default_phases(),
            recess_secs: DEFAULT_RECESS_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            flush_timeout_secs: DEFAULT_FLUSH_TIMEOUT_SECS,
            writer_queue_capacity: DEFAULT_WRITER_QUEUE_CAPACITY,
            completion_code: "C6KNGZWE".to_string(),
            default_return_url: "https://app.prolific.com/submissions/complete".to_string(),
            gateway: GatewayConfig::default(),
            sink: SinkConfig::default(),
        }
    }
}

/// Categorization gateway settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1-nano".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 20,
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Local CSV file; also the fallback when a remote store is configured
    pub local_path: String,
    /// Tabular-store webhook receiving one JSON row per trial
    pub remote_url: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            local_path: "responses.csv".to_string(),
            remote_url: None,
        }
    }
}

impl SurveyConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) if p.exists() => {
                let contents = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&contents)?
            }
            Some(p) => {
                tracing::warn!(path = %p.display(), "config file not found, using defaults");
                Self::default()
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phases.len() != PHASE_COUNT {
            return Err(ConfigError::PhaseCount {
                expected: PHASE_COUNT,
                found: self.phases.len(),
            });
        }
        if let Some(i) = self.phases.iter().position(|p| p.name.trim().is_empty()) {
            return Err(ConfigError::EmptyPhaseName(i));
        }
        Ok(())
    }

    /// Same config with every phase set to `duration_secs`
    pub fn with_phase_durations(mut self, duration_secs: u64) -> Self {
        for phase in &mut self.phases {
            phase.duration_secs = duration_secs;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SurveyConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.recess_secs, 20);
        assert!(config.sink.remote_url.is_none());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = SurveyConfig::load(Some(Path::new("/nonexistent/aut-flex.toml"))).unwrap();
        assert_eq!(config, SurveyConfig::default());
    }

    #[test]
    fn test_partial_toml_overrides_fields() {
        let config = SurveyConfig::from_toml_str(
            r#"
            recess_secs = 5
            completion_code = "ABC123"

            [sink]
            remote_url = "https://sheets.example.org/hook"
            "#,
        )
        .unwrap();
        assert_eq!(config.recess_secs, 5);
        assert_eq!(config.completion_code, "ABC123");
        assert_eq!(config.sink.local_path, "responses.csv");
        assert_eq!(config.phases.len(), 3);
    }

    #[test]
    fn test_wrong_phase_count_rejected() {
        let config = SurveyConfig::from_toml_str(
            r#"
            [[phases]]
            name = "Only"
            duration_secs = 60
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PhaseCount { expected: 3, found: 1 })
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let err = SurveyConfig::from_toml_str("recess_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
