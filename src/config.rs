use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Main parser configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ParserConfig {
    /// Retry loop tuning
    #[serde(default)]
    pub retry: RetryConfig,
    /// Rendering engine tuning
    #[serde(default)]
    pub render: RenderConfig,
    /// AI provider used by the text-mode extractor
    #[serde(default)]
    pub ai: AiConfig,
}

/// Configuration for the retry orchestrator
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    /// Maximum number of render+extract attempts per URL
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in milliseconds; the first retry sleeps this long and
    /// every later retry doubles it
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Upper bound of the uniform random jitter added to each sleep
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            jitter_ms: default_jitter_ms(),
        }
    }
}

/// Configuration for the headless rendering engine
#[derive(Debug, Deserialize, Clone)]
pub struct RenderConfig {
    /// Seconds to wait for navigation + network idle
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    /// Run the browser headless (disable for local debugging)
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Explicit Chrome/Chromium binary path; autodetected when unset
    pub chrome_binary: Option<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout_secs(),
            headless: default_headless(),
            chrome_binary: None,
        }
    }
}

/// Configuration for the AI provider (text-mode extraction only)
#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    /// Model identifier (e.g., "gpt-4o-mini")
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for authentication (can also be set via environment variable)
    pub api_key: Option<String>,
    /// Base URL for API endpoint (for custom or proxy endpoints)
    pub base_url: Option<String>,
    /// Temperature for generation (0.0-1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Request timeout in seconds
    #[serde(default = "default_ai_timeout")]
    pub timeout: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            api_key: None,
            base_url: None,
            temperature: default_temperature(),
            timeout: default_ai_timeout(),
        }
    }
}

// Default value functions
fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_jitter_ms() -> u64 {
    1000
}

fn default_navigation_timeout_secs() -> u64 {
    45
}

fn default_headless() -> bool {
    true
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_ai_timeout() -> u64 {
    30
}

impl ParserConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables with LADLE__ prefix
    /// 2. ladle.toml file in current directory
    /// 3. Default values
    ///
    /// Environment variable format: LADLE__AI__API_KEY
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            // Optional config file (can be missing)
            .add_source(File::with_name("ladle").required(false))
            // Use double underscore for nested: LADLE__RETRY__MAX_ATTEMPTS
            .add_source(
                Environment::with_prefix("LADLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}
