//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Startup errors. Any of these aborts the worker before it listens.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("settings: {0}")]
    Settings(String),
    #[error("database unreachable: {0}")]
    Connect(String),
    #[error("missing privilege: cannot introspect schema '{schema}'")]
    Privilege { schema: String },
    #[error("introspection: {0}")]
    Introspection(String),
    #[error("invalid primary key: table {table} column {column}")]
    InvalidPrimaryKey { table: String, column: String },
    #[error("route collision: {method} {path} generated by both {first} and {second}")]
    RouteCollision {
        method: String,
        path: String,
        first: String,
        second: String,
    },
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("internal: {0}")]
    Internal(String),
}

/// Coarse category of a driver error. Only the category reaches the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbFailure {
    /// Unique or foreign key violation.
    Conflict,
    /// Not-null, check, or value-format violation raised by the database.
    Invalid,
    NotFound,
    /// Connection, pool, or serialization failure; the request may succeed later.
    Transient,
    Other,
}

impl DbFailure {
    pub fn classify(e: &sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => DbFailure::NotFound,
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => DbFailure::Transient,
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // integrity_constraint_violation class
                Some("23505") | Some("23503") | Some("23P01") => DbFailure::Conflict,
                Some("23502") | Some("23514") => DbFailure::Invalid,
                // explicit value for a GENERATED ALWAYS column
                Some("428C9") => DbFailure::Invalid,
                // data_exception class (bad text representation, out of range, ...)
                Some(code) if code.starts_with("22") => DbFailure::Invalid,
                Some("40001") | Some("40P01") | Some("57P01") | Some("53300") => DbFailure::Transient,
                Some(code) if code.starts_with("08") => DbFailure::Transient,
                _ => DbFailure::Other,
            },
            _ => DbFailure::Other,
        }
    }

    fn status_and_code(self) -> (StatusCode, &'static str, &'static str) {
        match self {
            DbFailure::Conflict => (StatusCode::CONFLICT, "constraint_violation", "constraint violation"),
            DbFailure::Invalid => (StatusCode::BAD_REQUEST, "constraint_violation", "value rejected by database constraint"),
            DbFailure::NotFound => (StatusCode::NOT_FOUND, "not_found", "row not found"),
            DbFailure::Transient => (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable", "database temporarily unavailable"),
            DbFailure::Other => (StatusCode::INTERNAL_SERVER_ERROR, "database_error", "database error"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        self.parts().0
    }

    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", self.to_string()),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error", self.to_string()),
            AppError::Db(e) => {
                let (status, code, message) = DbFailure::classify(e).status_and_code();
                (status, code, message.to_string())
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict", self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", self.to_string()),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", self.to_string()),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error".to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::Db(e) => tracing::error!(error = %e, failure = ?DbFailure::classify(e), "database failure"),
            AppError::Internal(msg) => tracing::error!(error = %msg, "internal failure"),
            _ => {}
        }
        let (status, code, message) = self.parts();
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
