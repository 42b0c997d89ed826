//! Process settings from environment variables (after `.env` is loaded).

use crate::auth::PasswordMode;
use crate::error::ConfigError;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub schema: String,
    pub bind_addr: String,
    /// Mount point of generated routes. Empty mounts them at the root.
    pub api_prefix: String,
    pub max_connections: u32,
    pub workers: usize,
    pub jwt_secret: Option<String>,
    pub master_key: Option<String>,
    pub token_ttl_secs: Option<u64>,
    pub auth: Option<AuthTableSettings>,
}

/// Table-backed credential lookup for `POST /token`.
#[derive(Clone, Debug)]
pub struct AuthTableSettings {
    pub table: String,
    pub username_column: String,
    pub password_column: String,
    pub password_mode: PasswordMode,
}

impl Settings {
    pub fn from_env() -> Result<Settings, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let database_url = get("DATABASE_URL").ok_or_else(|| ConfigError::Settings("DATABASE_URL is required".into()))?;
        let api_prefix = match get("API_PREFIX") {
            None => "/api".to_string(),
            Some(p) => normalize_prefix(&p),
        };
        let available = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let workers: usize = parse(&get, "WORKERS", 1)?;
        let auth = match get("AUTH_TABLE") {
            None => None,
            Some(table) => Some(AuthTableSettings {
                table,
                username_column: get("AUTH_USERNAME_COLUMN").unwrap_or_else(|| "username".into()),
                password_column: get("AUTH_PASSWORD_COLUMN").unwrap_or_else(|| "password".into()),
                password_mode: parse(&get, "AUTH_PASSWORD_MODE", PasswordMode::Plain)?,
            }),
        };
        Ok(Settings {
            database_url,
            schema: get("DB_SCHEMA").unwrap_or_else(|| "public".into()),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            api_prefix,
            max_connections: parse(&get, "DB_MAX_CONNECTIONS", 5)?,
            workers: workers.clamp(1, available.max(1)),
            jwt_secret: get("JWT_SECRET"),
            master_key: get("MASTER_KEY"),
            token_ttl_secs: match get("TOKEN_TTL_SECS") {
                None => None,
                Some(_) => Some(parse(&get, "TOKEN_TTL_SECS", 0u64)?),
            },
            auth,
        })
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Settings(format!("{} has an invalid value '{}'", key, raw))),
    }
}

/// `api/` -> `/api`, `/` -> ``.
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
