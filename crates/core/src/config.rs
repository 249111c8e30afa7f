use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::params::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE_SLIDER, RequestParameters};

/// Which backend serves completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions endpoint (default)
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Scripted responses for tests and demos
    Mock,
}

impl ProviderKind {
    pub const VALUES: &[ProviderKind] = &[ProviderKind::OpenAi, ProviderKind::Mock];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "mock" => Ok(ProviderKind::Mock),
            _ => Err(Error::Config(ConfigError::InvalidProviderKind(s.to_string()).to_string())),
        }
    }
}

/// Opaque API credential
///
/// `Debug` never prints the value and the type cannot be serialized, so a key
/// read at startup cannot leak into logs or saved files.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// `[provider]` section
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,
    /// Inline API key
    #[serde(default)]
    pub api_key: Option<ApiKey>,
    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// TOML file with scripted responses (mock only)
    #[serde(default)]
    pub responses_file: Option<PathBuf>,
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            api_key: None,
            api_key_env: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            responses_file: None,
        }
    }
}

impl ProviderConfig {
    /// Resolve the credential, preferring the inline key over the environment
    pub fn resolve_api_key(&self) -> Result<ApiKey> {
        if let Some(key) = &self.api_key
            && !key.is_empty()
        {
            return Ok(key.clone());
        }

        if let Some(var) = &self.api_key_env {
            return match std::env::var(var) {
                Ok(value) if !value.trim().is_empty() => Ok(ApiKey::new(value.trim())),
                _ => Err(Error::Config(ConfigError::ApiKeyEnvUnset(var.clone()).to_string())),
            };
        }

        if self.kind == ProviderKind::Mock {
            return Ok(ApiKey::new(""));
        }

        Err(Error::Config(ConfigError::MissingApiKey.to_string()))
    }
}

/// `[retry]` section
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// `[defaults]` section: initial values for every new conversation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionDefaults {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature slider position, 0..=200
    #[serde(default = "default_temperature")]
    pub temperature: u32,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> u32 {
    DEFAULT_TEMPERATURE_SLIDER
}

fn default_font_size() -> u32 {
    15
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self { max_tokens: default_max_tokens(), temperature: default_temperature(), font_size: default_font_size() }
    }
}

impl SessionDefaults {
    pub fn parameters(&self) -> RequestParameters {
        RequestParameters::from_sliders(self.max_tokens as i64, self.temperature as i64)
    }
}

/// `[database]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("chatdesk.db")
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// `[export]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { dir: default_export_dir() }
    }
}

/// `[logging.file]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileLoggingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_file_level")]
    pub level: String,
    /// Directory for rolling log files (default: `~/.chatdesk/logs`)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_file_level() -> String {
    "debug".to_string()
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self { enabled: false, level: default_file_level(), dir: None }
    }
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: FileLoggingConfig,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format(), file: FileLoggingConfig::default() }
    }
}

/// Root configuration structure for chatdesk.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub defaults: SessionDefaults,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML string
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml_str).map_err(|e| Error::Config(ConfigError::from(e).to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::Config(ConfigError::InvalidRetry("max_attempts must be at least 1".into()).to_string()));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config(
                ConfigError::InvalidRetry("backoff_multiplier must be at least 1.0".into()).to_string(),
            ));
        }
        if self.provider.model.trim().is_empty() {
            return Err(Error::Config(ConfigError::MissingModel.to_string()));
        }
        if self.provider.kind == ProviderKind::OpenAi && self.provider.api_key.is_none() && self.provider.api_key_env.is_none() {
            return Err(Error::Config(ConfigError::MissingApiKey.to_string()));
        }
        Ok(())
    }

    /// Get example configuration (as a string)
    pub fn example() -> &'static str {
        r#"# chatdesk configuration

[provider]
# "openai" or "mock"
kind = "openai"
# Read the key from this environment variable...
api_key_env = "OPENAI_API_KEY"
# ...or put it inline (takes precedence):
# api_key = "sk-..."
model = "gpt-3.5-turbo"
base_url = "https://api.openai.com/v1"
timeout_ms = 60000
# Scripted responses for kind = "mock"
# responses_file = "mock_responses.toml"

[retry]
max_attempts = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[defaults]
# Token limit, 10..=4096
max_tokens = 200
# Temperature slider, 0..=200 (value / 100)
temperature = 10
font_size = 15

[database]
path = "chatdesk.db"

[export]
dir = "."

[logging]
level = "warn"
# pretty, json or compact
format = "pretty"

[logging.file]
enabled = false
level = "debug"
"#
    }
}

/// Configuration-specific errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid provider kind: {0}")]
    InvalidProviderKind(String),

    #[error("no API key configured; set provider.api_key or provider.api_key_env")]
    MissingApiKey,

    #[error("environment variable {0} is not set or empty")]
    ApiKeyEnvUnset(String),

    #[error("provider.model must not be empty")]
    MissingModel,

    #[error("invalid retry settings: {0}")]
    InvalidRetry(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::TomlParse(err.to_string())
    }
}
