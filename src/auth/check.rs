//! Credential checks consulted by `POST /token`.

use crate::sql::{qualified_table, quoted};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;

/// Failure inside a credential check. Serialized as the 500 response body.
#[derive(Clone, Debug, Error, Serialize)]
#[error("{error}")]
pub struct CheckError {
    pub error: String,
}

impl CheckError {
    pub fn new(message: impl Into<String>) -> Self {
        CheckError { error: message.into() }
    }
}

/// Validates a posted credential record. `Ok(Some(payload))` issues a token carrying the
/// payload as claims; `Ok(None)` rejects the credentials.
#[async_trait]
pub trait CredentialCheck: Send + Sync {
    async fn validate(&self, credentials: &Value) -> Result<Option<Value>, CheckError>;
}

/// Rejects everything. Used when no lookup is configured.
pub struct DenyAll;

#[async_trait]
impl CredentialCheck for DenyAll {
    async fn validate(&self, _credentials: &Value) -> Result<Option<Value>, CheckError> {
        Ok(None)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PasswordMode {
    /// Stored password compared as-is.
    Plain,
    /// Stored pgcrypto hash, compared with `crypt(input, stored)`.
    Crypt,
}

impl std::str::FromStr for PasswordMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" => Ok(PasswordMode::Plain),
            "crypt" => Ok(PasswordMode::Crypt),
            other => Err(format!("unknown password mode '{}' (expected plain or crypt)", other)),
        }
    }
}

/// Looks the user up in a table by username and compares the password column.
/// The payload is the matching row without the password column.
pub struct TableCredentialCheck {
    pool: PgPool,
    username_column: String,
    password_column: String,
    sql: String,
}

impl TableCredentialCheck {
    pub fn new(pool: PgPool, schema: &str, table: &str, username_column: &str, password_column: &str, mode: PasswordMode) -> Self {
        let user = format!("u.{}", quoted(username_column));
        let pass = format!("u.{}", quoted(password_column));
        let matches = match mode {
            PasswordMode::Plain => format!("{}::text = $2", pass),
            PasswordMode::Crypt => format!("{} = crypt($2, {})", pass, pass),
        };
        let sql = format!(
            "SELECT row_to_json(u) AS \"row\" FROM {} u WHERE {}::text = $1 AND {} LIMIT 1",
            qualified_table(schema, table),
            user,
            matches
        );
        TableCredentialCheck {
            pool,
            username_column: username_column.to_string(),
            password_column: password_column.to_string(),
            sql,
        }
    }

    fn field<'a>(credentials: &'a Value, name: &str) -> Option<&'a str> {
        credentials.get(name).and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

#[async_trait]
impl CredentialCheck for TableCredentialCheck {
    async fn validate(&self, credentials: &Value) -> Result<Option<Value>, CheckError> {
        let username = Self::field(credentials, "username").or_else(|| Self::field(credentials, &self.username_column));
        let password = Self::field(credentials, "password").or_else(|| Self::field(credentials, &self.password_column));
        let (Some(username), Some(password)) = (username, password) else {
            return Ok(None);
        };
        tracing::debug!(sql = %self.sql, "credential lookup");
        let row: Option<(Value,)> = sqlx::query_as(&self.sql)
            .bind(username)
            .bind(password)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "credential lookup failed");
                CheckError::new("credential lookup failed")
            })?;
        Ok(row.map(|(mut payload,)| {
            if let Value::Object(map) = &mut payload {
                map.remove(&self.password_column);
            }
            payload
        }))
    }
}
