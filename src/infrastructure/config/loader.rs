use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Environment variables read without the `COVERGEN_` prefix, and the keys they set
const LEGACY_ENV: &[(&str, &str)] = &[
    ("TARGET_COVERAGE_PERCENTAGE", "coverage.target_percentage"),
    ("MAX_ITERATIONS", "coverage.max_iterations"),
    ("LLM_PROVIDER", "llm.provider"),
];

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid target_percentage: {0}. Must be greater than 0 and at most 100")]
    InvalidTarget(f64),

    #[error("Invalid max_iterations: {0}. Must be between 1 and 100")]
    InvalidMaxIterations(u32),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Tool executable for '{0}' cannot be empty")]
    EmptyTool(&'static str),

    #[error("Coverage output_dir cannot be empty")]
    EmptyOutputDir,

    #[error("Invalid temperature: {0}. Must be between 0 and 2")]
    InvalidTemperature(f64),

    #[error("Invalid max_tokens: {0}. Must be at least 1")]
    InvalidMaxTokens(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .covergen/config.yaml (project config)
    /// 3. .covergen/local.yaml (project local overrides, optional)
    /// 4. TARGET_COVERAGE_PERCENTAGE, MAX_ITERATIONS, LLM_PROVIDER
    /// 5. Environment variables (COVERGEN_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".covergen/config.yaml"))
            .merge(Yaml::file(".covergen/local.yaml"));

        Self::finish(figment, "Failed to extract configuration from figment")
    }

    /// Load configuration from a specific file instead of the project YAML files.
    ///
    /// Environment layers still apply on top.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.is_file() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path));

        Self::finish(figment, &format!("Failed to load config from {}", path.display()))
    }

    fn finish(figment: Figment, context: &str) -> Result<Config> {
        let config: Config = figment
            .merge(Self::legacy_env())
            .merge(Env::prefixed("COVERGEN_").split("__"))
            .extract()
            .with_context(|| context.to_string())?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn legacy_env() -> Env {
        let names: Vec<&str> = LEGACY_ENV.iter().map(|(name, _)| *name).collect();
        Env::raw().only(&names).map(|key| {
            LEGACY_ENV
                .iter()
                .find(|(name, _)| key == *name)
                .map_or_else(|| key.into(), |(_, target)| (*target).into())
        })
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let target = config.coverage.target_percentage;
        if !(target > 0.0 && target <= 100.0) {
            return Err(ConfigError::InvalidTarget(target));
        }

        if config.coverage.max_iterations == 0 || config.coverage.max_iterations > 100 {
            return Err(ConfigError::InvalidMaxIterations(
                config.coverage.max_iterations,
            ));
        }

        if config.coverage.output_dir.trim().is_empty() {
            return Err(ConfigError::EmptyOutputDir);
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        // Validate tools
        for (name, value) in [
            ("git", &config.tools.git),
            ("dotnet", &config.tools.dotnet),
            ("reportgenerator", &config.tools.reportgenerator),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyTool(name));
            }
        }

        // Validate llm config
        if !(0.0..=2.0).contains(&config.llm.temperature) {
            return Err(ConfigError::InvalidTemperature(config.llm.temperature));
        }

        if config.llm.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(config.llm.max_tokens));
        }

        // Validate retry config
        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        Ok(())
    }
}
