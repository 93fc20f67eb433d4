use std::path::PathBuf;

use crate::domain::models::LoggingConfig;

/// Resolved logging settings
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Output format for stderr
    pub format: LogFormat,

    /// Directory for log files (stderr only when None)
    pub log_dir: Option<PathBuf>,

    /// Log rotation policy for file output
    pub rotation: RotationPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

impl From<&LoggingConfig> for LogConfig {
    fn from(config: &LoggingConfig) -> Self {
        let format = match config.format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        };
        let rotation = match config.rotation.to_lowercase().as_str() {
            "hourly" => RotationPolicy::Hourly,
            "never" => RotationPolicy::Never,
            _ => RotationPolicy::Daily,
        };

        Self {
            level: config.level.clone(),
            format,
            log_dir: config.log_dir.as_ref().map(PathBuf::from),
            rotation,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::from(&LoggingConfig::default())
    }
}
