//! Pipeline configuration for the controller.
//!
//! Covers generation parameters (domain, task, batch size), execution limits
//! (stage timeout, simulation concurrency), determinism (RNG seed), quality
//! thresholds and the optional export directory.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::stages::GenerationSpec;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Generation settings
    /// Domain to generate experiences for.
    pub domain: String,
    /// Task within the domain.
    pub task: String,
    /// Number of experiences (and therefore conversations) to generate.
    pub num_experiences: usize,

    // Execution settings
    /// Timeout for a single stage worker invocation.
    pub stage_timeout: Duration,
    /// Maximum conversations generated concurrently during simulation.
    pub simulation_concurrency: usize,

    // Determinism
    /// Seed for every seeded generator in the built-in workers.
    pub seed: u64,

    // Quality thresholds
    /// Composite score at or above which a conversation is kept unchanged.
    pub keep_threshold: f64,
    /// Composite score at or above which a conversation is kept with
    /// modifications; below it the conversation is removed.
    pub modify_threshold: f64,

    // Export settings
    /// Directory to export the finalized dataset into, if any.
    pub export_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            domain: "healthcare".to_string(),
            task: "diagnose_fever".to_string(),
            num_experiences: 2,

            stage_timeout: Duration::from_secs(30),
            simulation_concurrency: 1,

            seed: 42,

            keep_threshold: 0.8,
            modify_threshold: 0.6,

            export_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `CONVOFORGE_DOMAIN`: Domain to generate for (default: healthcare)
    /// - `CONVOFORGE_TASK`: Task within the domain (default: diagnose_fever)
    /// - `CONVOFORGE_NUM_EXPERIENCES`: Batch size (default: 2)
    /// - `CONVOFORGE_STAGE_TIMEOUT_SECS`: Stage timeout in seconds (default: 30)
    /// - `CONVOFORGE_SIMULATION_CONCURRENCY`: Concurrent conversations (default: 1)
    /// - `CONVOFORGE_SEED`: RNG seed (default: 42)
    /// - `CONVOFORGE_KEEP_THRESHOLD`: Keep threshold (default: 0.8)
    /// - `CONVOFORGE_MODIFY_THRESHOLD`: Modify threshold (default: 0.6)
    /// - `CONVOFORGE_EXPORT_DIR`: Dataset export directory (unset: no export)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("CONVOFORGE_DOMAIN") {
            config.domain = val;
        }

        if let Ok(val) = std::env::var("CONVOFORGE_TASK") {
            config.task = val;
        }

        if let Ok(val) = std::env::var("CONVOFORGE_NUM_EXPERIENCES") {
            config.num_experiences = parse_env_value(&val, "CONVOFORGE_NUM_EXPERIENCES")?;
        }

        if let Ok(val) = std::env::var("CONVOFORGE_STAGE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "CONVOFORGE_STAGE_TIMEOUT_SECS")?;
            config.stage_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("CONVOFORGE_SIMULATION_CONCURRENCY") {
            config.simulation_concurrency =
                parse_env_value(&val, "CONVOFORGE_SIMULATION_CONCURRENCY")?;
        }

        if let Ok(val) = std::env::var("CONVOFORGE_SEED") {
            config.seed = parse_env_value(&val, "CONVOFORGE_SEED")?;
        }

        if let Ok(val) = std::env::var("CONVOFORGE_KEEP_THRESHOLD") {
            config.keep_threshold = parse_env_value(&val, "CONVOFORGE_KEEP_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("CONVOFORGE_MODIFY_THRESHOLD") {
            config.modify_threshold = parse_env_value(&val, "CONVOFORGE_MODIFY_THRESHOLD")?;
        }

        if let Ok(val) = std::env::var("CONVOFORGE_EXPORT_DIR") {
            config.export_dir = Some(PathBuf::from(val));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` describing the first invalid
    /// setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "domain must not be empty".to_string(),
            ));
        }

        if self.task.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "task must not be empty".to_string(),
            ));
        }

        if self.num_experiences == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_experiences must be at least 1".to_string(),
            ));
        }

        if self.stage_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "stage_timeout must be greater than zero".to_string(),
            ));
        }

        if self.simulation_concurrency == 0 {
            return Err(ConfigError::ValidationFailed(
                "simulation_concurrency must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("keep_threshold", self.keep_threshold),
            ("modify_threshold", self.modify_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationFailed(format!(
                    "{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }

        if self.modify_threshold > self.keep_threshold {
            return Err(ConfigError::ValidationFailed(format!(
                "modify_threshold ({}) must not exceed keep_threshold ({})",
                self.modify_threshold, self.keep_threshold
            )));
        }

        Ok(())
    }

    /// The generation parameters handed to the first stage.
    pub fn generation_spec(&self) -> GenerationSpec {
        GenerationSpec {
            domain: self.domain.clone(),
            task: self.task.clone(),
            num_experiences: self.num_experiences,
        }
    }

    /// Sets the domain.
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Sets the task.
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }

    /// Sets the number of experiences to generate.
    pub fn with_num_experiences(mut self, count: usize) -> Self {
        self.num_experiences = count;
        self
    }

    /// Sets the stage timeout.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Sets the simulation concurrency factor.
    pub fn with_simulation_concurrency(mut self, concurrency: usize) -> Self {
        self.simulation_concurrency = concurrency;
        self
    }

    /// Sets the RNG seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets both quality thresholds.
    pub fn with_quality_thresholds(mut self, keep: f64, modify: f64) -> Self {
        self.keep_threshold = keep;
        self.modify_threshold = modify;
        self
    }

    /// Sets the dataset export directory.
    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = Some(dir.into());
        self
    }
}

/// Parses an environment variable value with context in the error.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.num_experiences, 2);
        assert_eq!(config.simulation_concurrency, 1);
    }

    #[test]
    fn test_builder_chain() {
        let config = PipelineConfig::new()
            .with_domain("education")
            .with_task("math_tutoring")
            .with_num_experiences(5)
            .with_seed(7)
            .with_simulation_concurrency(3);

        assert!(config.validate().is_ok());
        assert_eq!(config.domain, "education");
        assert_eq!(config.generation_spec().num_experiences, 5);
    }

    #[test]
    fn test_zero_experiences_rejected() {
        let config = PipelineConfig::new().with_num_experiences(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = PipelineConfig::new().with_quality_thresholds(0.5, 0.9);
        let err = config.validate().expect_err("should fail validation");
        assert!(err.to_string().contains("modify_threshold"));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let config = PipelineConfig::new().with_quality_thresholds(1.4, 0.6);
        assert!(config.validate().is_err());
    }
}
