//! `GET {prefix}/tables`: what was introspected and which routes it produced.

use crate::catalog::TableKind;
use crate::response::many;
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
struct TableSummary<'a> {
    name: &'a str,
    kind: TableKind,
    primary_key: &'a [String],
    routes: Vec<String>,
}

pub async fn list_tables(State(state): State<AppState>) -> impl IntoResponse {
    let tables: Vec<TableSummary> = state
        .catalog
        .tables
        .iter()
        .map(|t| TableSummary {
            name: &t.name,
            kind: t.kind,
            primary_key: &t.primary_key,
            routes: state
                .routes
                .for_table(&t.name)
                .map(|op| format!("{} {}", op.method, op.path))
                .collect(),
        })
        .collect();
    many(StatusCode::OK, tables).into_response()
}
