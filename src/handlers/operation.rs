//! Generic handler behind every generated route.

use crate::compile::{OperationDescriptor, OperationKind};
use crate::error::AppError;
use crate::response::{one, shaped};
use crate::service::{translate, ApiRequest, CrudService};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn parse_body(op: &OperationDescriptor, body: &Bytes) -> Result<Option<Value>, AppError> {
    if !op.kind.is_write() || body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

pub async fn handle(
    op: Arc<OperationDescriptor>,
    State(state): State<AppState>,
    path: Option<Path<HashMap<String, String>>>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Response, AppError> {
    if op.kind == OperationKind::Describe {
        if let Some((name, _)) = query.first() {
            return Err(AppError::Validation(format!("{} is not accepted on describe routes", name)));
        }
        let table = state
            .catalog
            .table(&op.table)
            .ok_or_else(|| AppError::NotFound(op.table.clone()))?;
        return Ok(one(StatusCode::OK, table).into_response());
    }

    let request = ApiRequest {
        path_params: path.map(|Path(p)| p).unwrap_or_default(),
        query,
        body: parse_body(&op, &body)?,
    };
    let stmt = translate(&op, &state.catalog, &request)?;
    let output = CrudService::execute(&state.pool, &stmt).await?;

    Ok(shaped(stmt.shape, output))
}
