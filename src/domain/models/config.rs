use serde::{Deserialize, Serialize};

/// Main configuration structure for covergen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Coverage goal and loop budget
    #[serde(default)]
    pub coverage: CoverageConfig,

    /// Text-generation provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retry policy for the text-generation provider
    #[serde(default)]
    pub retry: RetryConfig,

    /// External tool executables and invocation limits
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Coverage goal and loop budget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CoverageConfig {
    /// Line coverage percentage (0-100] that ends the loop
    #[serde(default = "default_target_percentage")]
    pub target_percentage: f64,

    /// Maximum number of generate/measure cycles
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Directory (relative to the project root) receiving coverage artifacts
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Render HTML reports after the loop when the renderer is installed
    #[serde(default = "default_true")]
    pub render_html: bool,

    /// Title used for rendered reports
    #[serde(default = "default_report_title")]
    pub report_title: String,
}

const fn default_target_percentage() -> f64 {
    80.0
}

const fn default_max_iterations() -> u32 {
    5
}

fn default_output_dir() -> String {
    "coverage-report".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_report_title() -> String {
    "Coverage Report".to_string()
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            target_percentage: default_target_percentage(),
            max_iterations: default_max_iterations(),
            output_dir: default_output_dir(),
            render_html: true,
            report_title: default_report_title(),
        }
    }
}

/// Supported text-generation providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[serde(alias = "open_ai")]
    OpenAi,
    Anthropic,
    Ollama,
    Groq,
    OpenRouter,
}

impl LlmProvider {
    /// Stable lowercase name, as accepted in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Groq => "groq",
            LlmProvider::OpenRouter => "openrouter",
        }
    }

    /// Default API base URL for the provider
    pub fn default_base_url(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "https://api.openai.com/v1",
            LlmProvider::Anthropic => "https://api.anthropic.com",
            LlmProvider::Ollama => "http://localhost:11434/v1",
            LlmProvider::Groq => "https://api.groq.com/openai/v1",
            LlmProvider::OpenRouter => "https://openrouter.ai/api/v1",
        }
    }

    /// Default model for the provider
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4o-mini",
            LlmProvider::Anthropic => "claude-3-5-sonnet-20241022",
            LlmProvider::Ollama => "llama3.2",
            LlmProvider::Groq => "llama-3.1-70b-versatile",
            LlmProvider::OpenRouter => "openai/gpt-4o-mini",
        }
    }

    /// Environment variable conventionally holding the provider's API key.
    ///
    /// `None` for providers that run without authentication.
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            LlmProvider::OpenAi => Some("OPENAI_API_KEY"),
            LlmProvider::Anthropic => Some("ANTHROPIC_API_KEY"),
            LlmProvider::Ollama => None,
            LlmProvider::Groq => Some("GROQ_API_KEY"),
            LlmProvider::OpenRouter => Some("OPENROUTER_API_KEY"),
        }
    }
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text-generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Provider to call
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,

    /// Model override (provider default when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// API key (falls back to the provider's environment variable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL override (for proxies and tests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Maximum tokens to generate per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

const fn default_provider() -> LlmProvider {
    LlmProvider::OpenAi
}

const fn default_temperature() -> f64 {
    0.7
}

const fn default_max_tokens() -> u32 {
    4000
}

const fn default_llm_timeout() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl LlmConfig {
    /// Model to request, falling back to the provider default
    pub fn resolved_model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    /// Base URL to call, falling back to the provider default
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| self.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string()
    }

    /// API key from config or the provider's environment variable
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.provider
                .api_key_env()
                .and_then(|var| std::env::var(var).ok())
                .filter(|key| !key.trim().is_empty())
        })
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// External tool executables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ToolsConfig {
    /// Version-control executable
    #[serde(default = "default_git")]
    pub git: String,

    /// Build/test executable
    #[serde(default = "default_dotnet")]
    pub dotnet: String,

    /// Report merge/render executable
    #[serde(default = "default_reportgenerator")]
    pub reportgenerator: String,

    /// Per-command timeout in seconds (no timeout when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// Run `git fetch --all` before detecting the base branch
    #[serde(default)]
    pub fetch_before_detect: bool,
}

fn default_git() -> String {
    "git".to_string()
}

fn default_dotnet() -> String {
    "dotnet".to_string()
}

fn default_reportgenerator() -> String {
    "reportgenerator".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: default_git(),
            dotnet: default_dotnet(),
            reportgenerator: default_reportgenerator(),
            command_timeout_secs: None,
            fetch_before_detect: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stderr only when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Rotation for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
