//! `POST /token`.

use crate::auth::{AuthGate, TokenOutcome};
use crate::error::AppError;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

const MISSING_FIELDS: &str = "Required username and password fields.";

pub async fn issue_token(State(gate): State<Arc<AuthGate>>, body: Bytes) -> Result<Response, AppError> {
    let body: Option<Value> = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => Some(v),
            Err(_) => return Ok((StatusCode::BAD_REQUEST, MISSING_FIELDS).into_response()),
        }
    };
    Ok(match gate.issue_token(body.as_ref()).await? {
        TokenOutcome::Issued(jwt) => Json(json!({ "jwt": jwt })).into_response(),
        TokenOutcome::MissingFields => (StatusCode::BAD_REQUEST, MISSING_FIELDS).into_response(),
        TokenOutcome::Rejected => {
            (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid credentials." }))).into_response()
        }
        TokenOutcome::Failed(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(e)).into_response(),
    })
}
