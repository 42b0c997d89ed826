//! Statement execution against PostgreSQL and row decoding.

use super::translate::{BoundStatement, ResultShape};
use crate::error::AppError;
use crate::sql::BindValue;
use serde_json::Value;
use sqlx::PgPool;

/// Rows produced by one statement, already decoded to JSON.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryOutput {
    Rows(Vec<Value>),
    Row(Value),
}

pub struct CrudService;

impl CrudService {
    /// Run a translated statement. `One` without a row is a 404.
    pub async fn execute(pool: &PgPool, stmt: &BoundStatement) -> Result<QueryOutput, AppError> {
        match stmt.shape {
            ResultShape::Many | ResultShape::CreatedMany => {
                Ok(QueryOutput::Rows(Self::query_many(pool, &stmt.sql, &stmt.params).await?))
            }
            ResultShape::One | ResultShape::Created | ResultShape::Single => {
                let row = Self::query_one(pool, &stmt.sql, &stmt.params)
                    .await?
                    .ok_or_else(|| AppError::NotFound("no matching row".into()))?;
                Ok(QueryOutput::Row(row))
            }
        }
    }

    pub async fn query_one(pool: &PgPool, sql: &str, params: &[BindValue]) -> Result<Option<Value>, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(p.clone());
        }
        let row = query.fetch_optional(pool).await?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    pub async fn query_many(pool: &PgPool, sql: &str, params: &[BindValue]) -> Result<Vec<Value>, AppError> {
        tracing::debug!(sql = %sql, params = ?params, "query");
        let mut query = sqlx::query(sql);
        for p in params {
            query = query.bind(p.clone());
        }
        let rows = query.fetch_all(pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

pub fn row_to_json(row: &sqlx::postgres::PgRow) -> Value {
    use sqlx::Column;
    use sqlx::Row;
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        let v = cell_to_value(row, name);
        map.insert(name.to_string(), v);
    }
    Value::Object(map)
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n as f64) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        if let Some(n) = serde_json::Number::from_f64(n) {
            return Value::Number(n);
        }
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    Value::Null
}
