// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration
//!
//! Configuration is loaded hierarchically and validated once at startup;
//! the resulting [`EngineConfig`] is immutable for the lifetime of the
//! engine instance. Tunables cover cache TTLs, decision thresholds, the
//! learning worker pool and the evaluation/classifier timeouts.

use std::{path::PathBuf, time::Duration};

use anyhow::{Result, ensure};
use config::{Config, ConfigError, Environment as ConfigEnv, File};
use serde::{Deserialize, Deserializer, Serialize, de};
use shared_types::{ConfidenceScore, RiskScore};
use tracing::info;

use crate::error::{EngineError, EngineResult};

/// Environment types for configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Production environment
    Production,
    /// Development environment
    Development,
    /// Testing environment
    Testing,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Production => write!(f, "production"),
            Environment::Development => write!(f, "development"),
            Environment::Testing => write!(f, "testing"),
        }
    }
}

/// A validated learning worker pool size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerCount(usize);

impl WorkerCount {
    /// Create a new `WorkerCount`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if the count is 0 or greater than 64.
    pub fn new(count: usize) -> Result<Self> {
        ensure!(count != 0, "worker count must be greater than 0");
        ensure!(count <= 64, "worker count cannot exceed 64");
        Ok(Self(count))
    }

    /// Create the default worker pool size (4 workers)
    pub const fn default_value() -> Self {
        Self(4)
    }

    /// Create a small pool for testing (2 workers)
    pub const fn testing() -> Self {
        Self(2)
    }

    /// Get the worker count
    pub fn value(&self) -> usize {
        self.0
    }
}

impl Default for WorkerCount {
    fn default() -> Self {
        Self::default_value()
    }
}

impl<'de> Deserialize<'de> for WorkerCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let count = usize::deserialize(deserializer)?;
        Self::new(count).map_err(|e| de::Error::custom(e.to_string()))
    }
}

/// A validated learning queue capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueCapacity(usize);

impl QueueCapacity {
    /// Create a new `QueueCapacity`, ensuring the value is within valid bounds
    ///
    /// # Errors
    ///
    /// Returns an error if the capacity is 0 or greater than 100,000.
    pub fn new(capacity: usize) -> Result<Self> {
        ensure!(capacity != 0, "queue capacity must be greater than 0");
        ensure!(capacity <= 100_000, "queue capacity cannot exceed 100000");
        Ok(Self(capacity))
    }

    /// Create the default queue capacity (1000 events)
    pub const fn default_value() -> Self {
        Self(1000)
    }

    /// Create a small capacity for testing (16 events)
    pub const fn testing() -> Self {
        Self(16)
    }

    /// Get the capacity value
    pub fn value(&self) -> usize {
        self.0
    }
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self::default_value()
    }
}

impl<'de> Deserialize<'de> for QueueCapacity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let capacity = usize::deserialize(deserializer)?;
        Self::new(capacity).map_err(|e| de::Error::custom(e.to_string()))
    }
}

/// Cache tier TTLs and capacity limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whitelist tier TTL in seconds
    pub whitelist_ttl_seconds: u64,
    /// Spam profile tier TTL in seconds
    pub spam_profile_ttl_seconds: u64,
    /// User configuration tier TTL in seconds
    pub user_config_ttl_seconds: u64,
    /// Extracted feature tier TTL in seconds
    pub ml_features_ttl_seconds: u64,
    /// Maximum entries per tier before proactive cleanup
    pub max_entries_per_tier: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            whitelist_ttl_seconds: 600,
            spam_profile_ttl_seconds: 7200,
            user_config_ttl_seconds: 1800,
            ml_features_ttl_seconds: 3600,
            max_entries_per_tier: 10_000,
        }
    }
}

impl CacheConfig {
    /// Whitelist tier TTL
    pub fn whitelist_ttl(&self) -> Duration {
        Duration::from_secs(self.whitelist_ttl_seconds)
    }

    /// Spam profile tier TTL
    pub fn spam_profile_ttl(&self) -> Duration {
        Duration::from_secs(self.spam_profile_ttl_seconds)
    }

    /// User configuration tier TTL
    pub fn user_config_ttl(&self) -> Duration {
        Duration::from_secs(self.user_config_ttl_seconds)
    }

    /// Extracted feature tier TTL
    pub fn ml_features_ttl(&self) -> Duration {
        Duration::from_secs(self.ml_features_ttl_seconds)
    }

    /// Validate the cache configuration
    pub fn validate(&self) -> EngineResult<()> {
        let ttls = [
            ("whitelist", self.whitelist_ttl_seconds),
            ("spam_profile", self.spam_profile_ttl_seconds),
            ("user_config", self.user_config_ttl_seconds),
            ("ml_features", self.ml_features_ttl_seconds),
        ];
        for (tier, ttl) in ttls {
            if ttl == 0 {
                return Err(EngineError::config(format!(
                    "cache TTL for tier '{tier}' must be greater than 0"
                )));
            }
        }
        if self.max_entries_per_tier == 0 {
            return Err(EngineError::config(
                "max_entries_per_tier must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Decision thresholds for the evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Risk at or above which a caller is blocked
    pub block_risk: RiskScore,
    /// Minimum classifier confidence to act on a category
    pub act_confidence: ConfidenceScore,
    /// Minimum confidence for automatic whitelist learning
    pub auto_learn_confidence: ConfidenceScore,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            block_risk: RiskScore::saturating(0.75),
            act_confidence: ConfidenceScore::saturating(0.70),
            auto_learn_confidence: ConfidenceScore::saturating(0.85),
        }
    }
}

impl ThresholdConfig {
    /// Validate threshold ordering
    pub fn validate(&self) -> EngineResult<()> {
        if self.auto_learn_confidence.value() < self.act_confidence.value() {
            return Err(EngineError::config(format!(
                "auto_learn_confidence ({}) cannot be below act_confidence ({})",
                self.auto_learn_confidence.value(),
                self.act_confidence.value()
            )));
        }
        Ok(())
    }
}

/// Learning engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Worker pool size
    pub workers: WorkerCount,
    /// Bounded event queue capacity
    pub queue_capacity: QueueCapacity,
    /// Base smoothing factor for risk updates
    pub smoothing_alpha: f64,
    /// Upper clamp on the effective smoothing factor
    pub max_smoothing_alpha: f64,
    /// Damping applied per recorded false positive
    pub false_positive_penalty: f64,
    /// Report count at which confidence steps shrink to half strength
    pub confidence_shrink_reports: f64,
    /// Maximum attempts for a version-conflicted profile upsert
    pub upsert_retry_limit: usize,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            workers: WorkerCount::default_value(),
            queue_capacity: QueueCapacity::default_value(),
            smoothing_alpha: 0.3,
            max_smoothing_alpha: 0.5,
            false_positive_penalty: 0.5,
            confidence_shrink_reports: 50.0,
            upsert_retry_limit: 5,
        }
    }
}

impl LearningConfig {
    /// Validate the learning configuration
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.smoothing_alpha > 0.0 && self.smoothing_alpha <= 1.0) {
            return Err(EngineError::config(format!(
                "smoothing_alpha must be in (0, 1], got {}",
                self.smoothing_alpha
            )));
        }
        if !(self.max_smoothing_alpha >= self.smoothing_alpha
            && self.max_smoothing_alpha <= 1.0)
        {
            return Err(EngineError::config(format!(
                "max_smoothing_alpha must be in [smoothing_alpha, 1], got {}",
                self.max_smoothing_alpha
            )));
        }
        if self.false_positive_penalty < 0.0 || !self.false_positive_penalty.is_finite() {
            return Err(EngineError::config(format!(
                "false_positive_penalty must be non-negative, got {}",
                self.false_positive_penalty
            )));
        }
        if !(self.confidence_shrink_reports > 0.0) {
            return Err(EngineError::config(format!(
                "confidence_shrink_reports must be greater than 0, got {}",
                self.confidence_shrink_reports
            )));
        }
        if self.upsert_retry_limit == 0 || self.upsert_retry_limit > 20 {
            return Err(EngineError::config(format!(
                "upsert_retry_limit must be 1-20, got {}",
                self.upsert_retry_limit
            )));
        }
        Ok(())
    }
}

/// Evaluation and classifier deadlines
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Whole-evaluation deadline in milliseconds
    pub evaluation_ms: u64,
    /// Classifier deadline in milliseconds
    pub classifier_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            evaluation_ms: 10_000,
            classifier_ms: 100,
        }
    }
}

impl TimeoutConfig {
    /// Whole-evaluation deadline
    pub fn evaluation(&self) -> Duration {
        Duration::from_millis(self.evaluation_ms)
    }

    /// Classifier deadline
    pub fn classifier(&self) -> Duration {
        Duration::from_millis(self.classifier_ms)
    }

    /// Validate timeout ordering
    pub fn validate(&self) -> EngineResult<()> {
        if self.evaluation_ms == 0 || self.classifier_ms == 0 {
            return Err(EngineError::config("timeouts must be greater than 0"));
        }
        if self.classifier_ms >= self.evaluation_ms {
            return Err(EngineError::config(format!(
                "classifier_ms ({}) must be below evaluation_ms ({})",
                self.classifier_ms, self.evaluation_ms
            )));
        }
        Ok(())
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Environment type
    pub environment: Environment,
    /// Cache tier TTLs and capacity limits
    pub cache: CacheConfig,
    /// Decision thresholds
    pub thresholds: ThresholdConfig,
    /// Learning engine tunables
    pub learning: LearningConfig,
    /// Evaluation and classifier deadlines
    pub timeouts: TimeoutConfig,
    /// Optional scoring model YAML path; embedded defaults when absent
    pub scoring_model_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            cache: CacheConfig::default(),
            thresholds: ThresholdConfig::default(),
            learning: LearningConfig::default(),
            timeouts: TimeoutConfig::default(),
            scoring_model_path: None,
        }
    }
}

impl EngineConfig {
    /// Create configuration from environment variables and optional files
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` if configuration cannot be loaded
    /// or fails validation.
    pub fn from_env() -> EngineResult<Self> {
        let config = Self::load()
            .map_err(|e| EngineError::config(format!("failed to load configuration: {e}")))?;
        config.validate()?;

        info!(
            environment = %config.environment,
            workers = config.learning.workers.value(),
            queue_capacity = config.learning.queue_capacity.value(),
            evaluation_ms = config.timeouts.evaluation_ms,
            classifier_ms = config.timeouts.classifier_ms,
            "loaded engine configuration"
        );

        Ok(config)
    }

    /// Load configuration using the config crate with hierarchical sources
    ///
    /// Configuration is loaded in the following order (later sources override
    /// earlier ones):
    /// 1. Default values
    /// 2. Configuration file (screening.json)
    /// 3. Environment-specific files (screening.{env}.json)
    /// 4. Environment variables with `SCREENING_` prefix, `__` as the
    ///    nesting separator (e.g. `SCREENING_TIMEOUTS__CLASSIFIER_MS`)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let env_var = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let mut config_builder = Config::builder()
            // Start with default values
            .set_default("environment", "development")?
            .set_default("cache.whitelist_ttl_seconds", 600)?
            .set_default("cache.spam_profile_ttl_seconds", 7200)?
            .set_default("cache.user_config_ttl_seconds", 1800)?
            .set_default("cache.ml_features_ttl_seconds", 3600)?
            .set_default("cache.max_entries_per_tier", 10_000)?
            .set_default("thresholds.block_risk", 0.75)?
            .set_default("thresholds.act_confidence", 0.70)?
            .set_default("thresholds.auto_learn_confidence", 0.85)?
            .set_default("learning.workers", 4)?
            .set_default("learning.queue_capacity", 1000)?
            .set_default("learning.smoothing_alpha", 0.3)?
            .set_default("learning.max_smoothing_alpha", 0.5)?
            .set_default("learning.false_positive_penalty", 0.5)?
            .set_default("learning.confidence_shrink_reports", 50.0)?
            .set_default("learning.upsert_retry_limit", 5)?
            .set_default("timeouts.evaluation_ms", 10_000)?
            .set_default("timeouts.classifier_ms", 100)?
            // Add optional configuration files
            .add_source(File::with_name("screening.json").required(false))
            // Add environment-specific config file
            .add_source(
                File::with_name(&format!("screening.{}.json", env_var.to_lowercase()))
                    .required(false),
            )
            // Add environment variables with SCREENING_ prefix
            .add_source(
                ConfigEnv::with_prefix("SCREENING")
                    .separator("__")
                    .try_parsing(true),
            );

        if std::env::var("APP_ENV").is_ok() {
            config_builder = config_builder.set_override("environment", env_var.to_lowercase())?;
        }

        let config = config_builder.build()?;
        config.try_deserialize()
    }

    /// Create configuration optimized for testing
    ///
    /// Mirrors production defaults with a small worker pool and short
    /// deadlines so stalled-dependency tests finish quickly.
    pub fn for_testing() -> Self {
        Self {
            environment: Environment::Testing,
            cache: CacheConfig::default(),
            thresholds: ThresholdConfig::default(),
            learning: LearningConfig {
                workers: WorkerCount::testing(),
                ..LearningConfig::default()
            },
            timeouts: TimeoutConfig {
                evaluation_ms: 2000,
                classifier_ms: 50,
            },
            scoring_model_path: None,
        }
    }

    /// Validate the complete configuration
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` on the first violated bound.
    pub fn validate(&self) -> EngineResult<()> {
        self.cache.validate()?;
        self.thresholds.validate()?;
        self.learning.validate()?;
        self.timeouts.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_validation() {
        assert!(WorkerCount::new(0).is_err());
        assert!(WorkerCount::new(65).is_err());
        assert!(WorkerCount::new(1).is_ok());
        assert!(WorkerCount::new(64).is_ok());
        assert_eq!(WorkerCount::default().value(), 4);
    }

    #[test]
    fn queue_capacity_validation() {
        assert!(QueueCapacity::new(0).is_err());
        assert!(QueueCapacity::new(100_001).is_err());
        assert!(QueueCapacity::new(1).is_ok());
        assert_eq!(QueueCapacity::default().value(), 1000);
    }

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.whitelist_ttl(), Duration::from_secs(600));
        assert_eq!(config.cache.spam_profile_ttl(), Duration::from_secs(7200));
        assert_eq!(config.cache.user_config_ttl(), Duration::from_secs(1800));
        assert_eq!(config.cache.ml_features_ttl(), Duration::from_secs(3600));
        assert_eq!(config.timeouts.evaluation(), Duration::from_secs(10));
    }

    #[test]
    fn testing_config_is_valid_and_fast() {
        let config = EngineConfig::for_testing();
        assert!(config.validate().is_ok());
        assert_eq!(config.environment, Environment::Testing);
        assert_eq!(config.learning.workers.value(), 2);
        assert!(config.timeouts.evaluation_ms < 10_000);
    }

    #[test]
    fn threshold_ordering_is_enforced() {
        let thresholds = ThresholdConfig {
            block_risk: RiskScore::saturating(0.75),
            act_confidence: ConfidenceScore::saturating(0.9),
            auto_learn_confidence: ConfidenceScore::saturating(0.7),
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let cache = CacheConfig {
            whitelist_ttl_seconds: 0,
            ..CacheConfig::default()
        };
        let err = cache.validate().unwrap_err();
        assert!(err.to_string().contains("whitelist"));
    }

    #[test]
    fn classifier_deadline_must_fit_inside_evaluation() {
        let timeouts = TimeoutConfig {
            evaluation_ms: 100,
            classifier_ms: 100,
        };
        assert!(timeouts.validate().is_err());
    }

    #[test]
    fn learning_alpha_bounds() {
        let learning = LearningConfig {
            smoothing_alpha: 0.0,
            ..LearningConfig::default()
        };
        assert!(learning.validate().is_err());

        let learning = LearningConfig {
            smoothing_alpha: 0.6,
            max_smoothing_alpha: 0.5,
            ..LearningConfig::default()
        };
        assert!(learning.validate().is_err());
    }

    #[test]
    fn environment_display() {
        assert_eq!(Environment::Production.to_string(), "production");
        assert_eq!(Environment::Development.to_string(), "development");
        assert_eq!(Environment::Testing.to_string(), "testing");
    }
}
