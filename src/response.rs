//! Success envelopes: `{data}` for single results, `{data, meta: {count}}` for collections.

use crate::service::{QueryOutput, ResultShape};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Serialize)]
pub struct One<T> {
    pub data: T,
}

#[derive(Serialize)]
pub struct Many<T> {
    pub data: Vec<T>,
    pub meta: MetaCount,
}

#[derive(Serialize)]
pub struct MetaCount {
    pub count: u64,
}

pub fn one<T: Serialize>(status: StatusCode, data: T) -> (StatusCode, Json<One<T>>) {
    (status, Json(One { data }))
}

pub fn many<T: Serialize>(status: StatusCode, data: Vec<T>) -> (StatusCode, Json<Many<T>>) {
    let count = data.len() as u64;
    (
        status,
        Json(Many {
            data,
            meta: MetaCount { count },
        }),
    )
}

/// 201 for inserts, 200 for everything else.
pub fn shaped(shape: ResultShape, output: QueryOutput) -> Response {
    let status = match shape {
        ResultShape::Created | ResultShape::CreatedMany => StatusCode::CREATED,
        ResultShape::Many | ResultShape::One | ResultShape::Single => StatusCode::OK,
    };
    match output {
        QueryOutput::Rows(rows) => many(status, rows).into_response(),
        QueryOutput::Row(row) => one(status, row).into_response(),
    }
}
