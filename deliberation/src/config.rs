//! Deliberation configuration.
//!
//! Every field has a default, so an empty TOML file (or none at all) yields
//! a working configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scoring::ScoringConfig;
use crate::validation::ValidationConfig;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Retry policy for collaborator calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first (2 = one retry).
    pub max_attempts: u32,
    /// Backoff before the first retry in milliseconds.
    pub base_backoff_ms: u64,
    /// Upper bound on a single backoff in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Backoff after the given failed attempt (1-indexed), doubling each time.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    /// Default: one retry after 500ms.
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_backoff_ms: 500,
            max_backoff_ms: 5_000,
        }
    }
}

/// Tunables for one orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliberationConfig {
    /// Factor debates allowed in flight at once.
    pub max_concurrent_factors: usize,
    pub retry: RetryPolicy,
    /// Timeout for a single collaborator call.
    pub call_timeout_secs: u64,
    /// Token budget passed to every collaborator call.
    pub max_tokens: u32,
    pub scoring: ScoringConfig,
    pub validation: ValidationConfig,
    /// Default page size for history listings.
    pub history_limit: usize,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            max_concurrent_factors: 4,
            retry: RetryPolicy::default(),
            call_timeout_secs: 120,
            max_tokens: 2000,
            scoring: ScoringConfig::default(),
            validation: ValidationConfig::default(),
            history_limit: 50,
        }
    }
}

impl DeliberationConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_factors == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_factors must be at least 1".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.validation.grounding_ratio) {
            return Err(ConfigError::Invalid(format!(
                "validation.grounding_ratio must be within [0, 1], got {}",
                self.validation.grounding_ratio
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(1), 500);
        assert_eq!(policy.backoff_ms(2), 1_000);
        assert_eq!(policy.backoff_ms(3), 2_000);
        assert_eq!(policy.backoff_ms(10), 5_000);
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = DeliberationConfig::from_toml_str("").unwrap();
        assert_eq!(config, DeliberationConfig::default());
        assert_eq!(config.call_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_partial_toml() {
        let config = DeliberationConfig::from_toml_str(
            r#"
            max_concurrent_factors = 2

            [retry]
            base_backoff_ms = 50

            [scoring]
            substantive_rebuttal_chars = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_factors, 2);
        assert_eq!(config.retry.base_backoff_ms, 50);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.scoring.substantive_rebuttal_chars, 120);
        assert_eq!(config.scoring.contested_debate_chars, 1500);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            DeliberationConfig::from_toml_str("max_concurrent_factors = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DeliberationConfig::from_toml_str("[validation]\ngrounding_ratio = 1.5"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            DeliberationConfig::from_toml_str("max_tokens = \"lots\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deliberation.toml");
        std::fs::write(&path, "call_timeout_secs = 5\n").unwrap();
        let config = DeliberationConfig::from_toml_file(&path).unwrap();
        assert_eq!(config.call_timeout(), Duration::from_secs(5));

        let missing = DeliberationConfig::from_toml_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
