//! Request gate: Open (no secret) or Guarded (bearer token or master key required).

use super::check::{CheckError, CredentialCheck};
use super::token;
use crate::error::AppError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;

pub const MASTER_KEY_HEADER: &str = "x-master-key";
pub const TOKEN_PATH: &str = "/token";

#[derive(Clone, Debug)]
enum GateState {
    Open,
    Guarded { secret: String, master_key: Option<String> },
}

/// How a request got through the gate.
#[derive(Clone, Debug, PartialEq)]
pub enum Access {
    Open,
    MasterKey,
    /// Verified token claims.
    Token(Value),
}

impl Access {
    pub fn kind(&self) -> &'static str {
        match self {
            Access::Open => "open",
            Access::MasterKey => "master_key",
            Access::Token(_) => "token",
        }
    }
}

/// Result of a `POST /token` attempt.
#[derive(Debug)]
pub enum TokenOutcome {
    Issued(String),
    MissingFields,
    Rejected,
    Failed(CheckError),
}

pub struct AuthGate {
    state: GateState,
    check: Arc<dyn CredentialCheck>,
    token_ttl: Option<u64>,
}

impl AuthGate {
    pub fn open() -> Self {
        AuthGate {
            state: GateState::Open,
            check: Arc::new(super::check::DenyAll),
            token_ttl: None,
        }
    }

    pub fn guarded(secret: impl Into<String>, master_key: Option<String>, check: Arc<dyn CredentialCheck>) -> Self {
        AuthGate {
            state: GateState::Guarded {
                secret: secret.into(),
                master_key: master_key.filter(|k| !k.is_empty()),
            },
            check,
            token_ttl: None,
        }
    }

    pub fn with_token_ttl(mut self, ttl_secs: Option<u64>) -> Self {
        self.token_ttl = ttl_secs;
        self
    }

    pub fn is_guarded(&self) -> bool {
        matches!(self.state, GateState::Guarded { .. })
    }

    /// Master key first, then bearer token.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<Access, AppError> {
        let GateState::Guarded { secret, master_key } = &self.state else {
            return Ok(Access::Open);
        };
        if let Some(expected) = master_key {
            let given = headers.get(MASTER_KEY_HEADER).and_then(|v| v.to_str().ok());
            if given == Some(expected.as_str()) {
                return Ok(Access::MasterKey);
            }
        }
        let bearer = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("missing bearer token".into()))?;
        token::verify(secret, bearer)
            .map(Access::Token)
            .map_err(|e| AppError::Unauthorized(format!("invalid token: {}", e)))
    }

    /// Validate posted credentials and sign a token for the returned payload.
    pub async fn issue_token(&self, body: Option<&Value>) -> Result<TokenOutcome, AppError> {
        let GateState::Guarded { secret, .. } = &self.state else {
            return Err(AppError::NotFound("token issuance is disabled".into()));
        };
        let credentials = match body {
            None | Some(Value::Null) => return Ok(TokenOutcome::MissingFields),
            Some(Value::Object(m)) if m.is_empty() => return Ok(TokenOutcome::MissingFields),
            Some(v) => v,
        };
        let payload = match self.check.validate(credentials).await {
            Ok(Some(Value::Null | Value::Bool(false))) | Ok(None) => return Ok(TokenOutcome::Rejected),
            Ok(Some(payload)) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "credential check failed");
                return Ok(TokenOutcome::Failed(e));
            }
        };
        let jwt = token::sign(secret, payload, self.token_ttl)
            .map_err(|e| AppError::Internal(format!("token signing: {}", e)))?;
        Ok(TokenOutcome::Issued(jwt))
    }
}

/// Gate middleware. Everything except `POST /token` passes through `authorize`.
pub async fn require_auth(State(gate): State<Arc<AuthGate>>, request: Request, next: Next) -> Response {
    if request.method() == Method::POST && request.uri().path() == TOKEN_PATH {
        return next.run(request).await;
    }
    match gate.authorize(request.headers()) {
        Ok(access) => {
            tracing::debug!(access = access.kind(), path = %request.uri().path(), "authorized");
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}
