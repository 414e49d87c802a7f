//! Application settings and configuration
//!
//! Configuration management for the relay, loading settings from
//! environment variables with sensible defaults.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::services::key_pool::RotationPolicy;

/// Application environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    #[value(alias = "dev")]
    Development,
    #[value(alias = "prod")]
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!("Invalid environment: {}. Expected: development or production", s),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    // App settings
    pub app_name: String,
    pub app_version: String,
    pub environment: Environment,
    pub log_level: String,

    // Server settings (serve subcommand)
    pub host: String,
    pub port: u16,

    // Upstream API settings
    pub model: String,
    pub base_url: Option<String>,
    pub request_timeout_seconds: u64,

    // Key rotation
    pub policy: RotationPolicy,

    /// Keys adopted into an empty state store on startup
    #[serde(default, skip_serializing)]
    pub api_keys: Vec<String>,

    /// Prepended to every question, separated by a divider line
    pub system_prompt: Option<String>,

    // Persistence
    pub state_file: PathBuf,
}

impl Settings {
    /// Load settings from environment variables with defaults
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignored in production typically)
        dotenvy::dotenv().ok();

        let settings = Self {
            app_name: env_or_default("APP_NAME", "gemini-relay"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: env_or_default("ENVIRONMENT", "development")
                .parse()
                .unwrap_or_default(),
            log_level: env_or_default("LOG_LEVEL", "info"),

            host: env_or_default("HOST", "127.0.0.1"),
            port: env_or_default("PORT", "8787")
                .parse()
                .context("Invalid PORT value")?,

            model: env_or_default("GEMINI_MODEL", "gemini-2.5-flash"),
            base_url: env::var("GEMINI_BASE_URL").ok(),
            request_timeout_seconds: env_or_default("REQUEST_TIMEOUT_SECONDS", "120")
                .parse()
                .context("Invalid REQUEST_TIMEOUT_SECONDS value")?,

            policy: env_or_default("ROTATION_POLICY", "health_gated")
                .parse()
                .unwrap_or_default(),

            api_keys: parse_key_list(&env::var("GEMINI_API_KEYS").unwrap_or_default()),

            system_prompt: env::var("GEMINI_SYSTEM_PROMPT").ok().filter(|s| !s.is_empty()),

            state_file: env::var("STATE_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| default_state_file()),
        };

        settings.validate()?;

        Ok(settings)
    }

    /// Validate settings
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }
        if self.request_timeout_seconds == 0 {
            anyhow::bail!("Request timeout must be > 0");
        }
        if self.model.is_empty() {
            anyhow::bail!("Model name cannot be empty");
        }
        Ok(())
    }

    /// Get the server address string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app_name: "gemini-relay".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: Environment::Development,
            log_level: "info".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8787,
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
            request_timeout_seconds: 120,
            policy: RotationPolicy::default(),
            api_keys: Vec::new(),
            system_prompt: None,
            state_file: default_state_file(),
        }
    }
}

/// Default location of the persisted relay state
fn default_state_file() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gemini-relay")
        .join("state.json")
}

/// Parse a comma-separated key list, dropping empty entries
fn parse_key_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Helper function to get environment variable with default
fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
