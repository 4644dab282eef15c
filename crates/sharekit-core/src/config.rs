//! Configuration module for sharekit.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for sharekit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub site: SiteConfig,
    pub auth: AuthConfig,
    pub transport: TransportConfig,
    pub rate_limiting: RateLimitingConfig,
    pub logging: LoggingConfig,
}

/// Target site.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Absolute site URL, e.g. `https://contoso.sharepoint.com/sites/dev`.
    pub url: String,
}

/// Bearer token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Access token stored in the file. Prefer the environment variable.
    pub access_token: Option<String>,
    /// Environment variable read when `access_token` is unset.
    pub token_env: String,
}

/// REST transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Pack JSON requests into OData `$batch` calls.
    pub use_batch_endpoint: bool,
    /// Maximum number of requests per `$batch` call (SharePoint allows 100).
    pub max_batch_size: usize,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Client-side throttling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    /// Token bucket capacity per request category.
    pub capacity: u32,
    /// Tokens refilled per second.
    pub refill_per_second: f64,
    /// Retries after 429/503 before giving up.
    pub max_retries: u32,
    /// Wait used when the service sends no `Retry-After`.
    pub default_retry_after_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `plain` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/sharekit/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("sharekit")
            .join("config.yaml")
    }

    /// Writes the configuration as YAML, creating parent directories.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }
}

impl AuthConfig {
    /// Token from the file, or from the configured environment variable.
    pub fn resolve_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| {
                std::env::var(&self.token_env)
                    .ok()
                    .filter(|t| !t.trim().is_empty())
            })
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            token_env: "SHAREKIT_ACCESS_TOKEN".to_string(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            use_batch_endpoint: true,
            max_batch_size: 100,
            timeout_secs: 100,
            user_agent: format!("sharekit/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            capacity: 600,
            refill_per_second: 10.0,
            max_retries: 5,
            default_retry_after_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"transport.max_batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["plain", "json"];

/// Upper bound the service accepts for one `$batch` call.
pub const MAX_BATCH_SIZE: usize = 100;

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut positive = |field: &str, ok: bool| {
            if !ok {
                errors.push(ValidationError {
                    field: field.into(),
                    message: "must be greater than 0".into(),
                });
            }
        };

        positive("transport.timeout_secs", self.transport.timeout_secs > 0);
        positive("rate_limiting.capacity", self.rate_limiting.capacity > 0);
        positive(
            "rate_limiting.refill_per_second",
            self.rate_limiting.refill_per_second > 0.0,
        );
        positive(
            "rate_limiting.default_retry_after_secs",
            self.rate_limiting.default_retry_after_secs > 0,
        );

        // --- site ---
        let url = self.site.url.trim();
        if url.is_empty() {
            errors.push(ValidationError {
                field: "site.url".into(),
                message: "must be set".into(),
            });
        } else if !(url.starts_with("https://") || url.starts_with("http://")) {
            errors.push(ValidationError {
                field: "site.url".into(),
                message: format!("must be an absolute http(s) URL, got '{url}'"),
            });
        }

        // --- auth ---
        if self.auth.token_env.trim().is_empty() {
            errors.push(ValidationError {
                field: "auth.token_env".into(),
                message: "must not be empty".into(),
            });
        }

        // --- transport ---
        if self.transport.max_batch_size == 0 || self.transport.max_batch_size > MAX_BATCH_SIZE {
            errors.push(ValidationError {
                field: "transport.max_batch_size".into(),
                message: format!("must be in range 1..={MAX_BATCH_SIZE}"),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use sharekit_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .site_url("https://contoso.sharepoint.com/sites/dev")
///     .transport_max_batch_size(50)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.config.site.url = url.into();
        self
    }

    pub fn auth_access_token(mut self, token: impl Into<String>) -> Self {
        self.config.auth.access_token = Some(token.into());
        self
    }

    pub fn auth_token_env(mut self, name: impl Into<String>) -> Self {
        self.config.auth.token_env = name.into();
        self
    }

    pub fn transport_use_batch_endpoint(mut self, enabled: bool) -> Self {
        self.config.transport.use_batch_endpoint = enabled;
        self
    }

    pub fn transport_max_batch_size(mut self, n: usize) -> Self {
        self.config.transport.max_batch_size = n;
        self
    }

    pub fn transport_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.transport.timeout_secs = seconds;
        self
    }

    pub fn rate_limiting_capacity(mut self, n: u32) -> Self {
        self.config.rate_limiting.capacity = n;
        self
    }

    pub fn rate_limiting_refill_per_second(mut self, rate: f64) -> Self {
        self.config.rate_limiting.refill_per_second = rate;
        self
    }

    pub fn rate_limiting_max_retries(mut self, n: u32) -> Self {
        self.config.rate_limiting.max_retries = n;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
