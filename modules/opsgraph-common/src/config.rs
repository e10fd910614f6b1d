use std::env;

use crate::error::OpsGraphError;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres. `None` runs the server against the in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Text extraction
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub openai_max_tokens: u32,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first
    /// when present.
    pub fn from_env() -> Result<Self, OpsGraphError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OpsGraphError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                non_empty("DATABASE_MAX_CONNECTIONS"),
                10,
            )?,
            openai_api_key: non_empty("OPENAI_API_KEY").ok_or_else(|| {
                OpsGraphError::Config("OPENAI_API_KEY environment variable is required".into())
            })?,
            openai_model: non_empty("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            openai_max_tokens: parse_or("OPENAI_MAX_TOKENS", non_empty("OPENAI_MAX_TOKENS"), 4096)?,
            web_host: non_empty("WEB_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            web_port: parse_or("WEB_PORT", non_empty("WEB_PORT"), 3000)?,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.web_host, self.web_port)
    }
}

fn parse_or<T: std::str::FromStr>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, OpsGraphError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| OpsGraphError::Config(format!("{key} must be a number, got '{value}'"))),
    }
}
