//! Application settings.
//!
//! Settings are read once at startup from the process environment and passed
//! explicitly into the components that need them. Empty variables are treated
//! as unset.
//!
//! # Environment Variables
//!
//! - `APP_ENV` - `development` (default), `production` or `testing`
//! - `LOG_LEVEL` - default log level (default: `INFO`)
//! - `APP_PORT` - HTTP port (default: 8000)
//! - `STORE` - storage backend: `memory`, `sqlite` (default) or `postgres`
//! - `SQLITE_PATH` - SQLite database file (default: `lexicon.db`)
//! - `DATABASE_URL` - PostgreSQL connection string; assembled from
//!   `DB_USER`, `DB_PASSWORD`, `DB_HOST`, `DB_PORT`, `DB_NAME` when unset
//! - `TELEGRAM_BOT_TOKEN` - Bot API token (required by the bot binary only)
//! - `LLM_BASE_URL`, `LLM_API_KEY` (required), `LLM_MODEL`, `LLM_TEMPERATURE`,
//!   `LLM_MAX_RETRIES`, `LLM_TIMEOUT` - generative backend settings

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while assembling [`Settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppEnv {
    #[default]
    Development,
    Production,
    Testing,
}

impl AppEnv {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Testing => "testing",
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppEnv {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            "testing" => Ok(Self::Testing),
            _ => Err(()),
        }
    }
}

/// Which storage engine backs the cache, history and user tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

/// Storage connection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    /// Explicit PostgreSQL URL; takes precedence over the individual parts.
    pub url: Option<String>,
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
}

impl DatabaseSettings {
    /// PostgreSQL connection URL.
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            sqlite_path: PathBuf::from("lexicon.db"),
            url: None,
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            host: "db".to_string(),
            port: 5432,
            name: "lexicon".to_string(),
        }
    }
}

/// Generative backend settings.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub timeout: Duration,
}

impl LlmSettings {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: api_key.into(),
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.3,
            max_retries: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub app_env: AppEnv,
    pub log_level: String,
    pub app_port: u16,
    pub database: DatabaseSettings,
    pub telegram_bot_token: Option<String>,
    pub llm: LlmSettings,
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = DatabaseSettings::default();
        let database = DatabaseSettings {
            backend: parse_or(&get, "STORE", defaults.backend)?,
            sqlite_path: get("SQLITE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.sqlite_path),
            url: get("DATABASE_URL"),
            user: get("DB_USER").unwrap_or(defaults.user),
            password: get("DB_PASSWORD").unwrap_or(defaults.password),
            host: get("DB_HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "DB_PORT", defaults.port)?,
            name: get("DB_NAME").unwrap_or(defaults.name),
        };

        let api_key = get("LLM_API_KEY").ok_or(ConfigError::Missing("LLM_API_KEY"))?;
        let llm_defaults = LlmSettings::new(api_key);
        let timeout_secs: f64 = parse_or(&get, "LLM_TIMEOUT", llm_defaults.timeout.as_secs_f64())?;
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .ok()
            .filter(|timeout| !timeout.is_zero())
            .ok_or_else(|| ConfigError::Invalid {
                key: "LLM_TIMEOUT",
                value: timeout_secs.to_string(),
            })?;
        let llm = LlmSettings {
            base_url: get("LLM_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(llm_defaults.base_url),
            model: get("LLM_MODEL").unwrap_or(llm_defaults.model),
            temperature: parse_or(&get, "LLM_TEMPERATURE", llm_defaults.temperature)?,
            max_retries: parse_or(&get, "LLM_MAX_RETRIES", llm_defaults.max_retries)?,
            timeout,
            api_key: llm_defaults.api_key,
        };

        Ok(Self {
            app_env: parse_or(&get, "APP_ENV", AppEnv::default())?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "INFO".to_string()),
            app_port: parse_or(&get, "APP_PORT", 8000)?,
            database,
            telegram_bot_token: get("TELEGRAM_BOT_TOKEN"),
            llm,
        })
    }

    /// Bot token, required only by the bot channel.
    pub fn require_telegram_token(&self) -> Result<&str, ConfigError> {
        self.telegram_bot_token
            .as_deref()
            .ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}
