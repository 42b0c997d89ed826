//! Write-body validation against catalog column metadata.

use crate::catalog::Table;
use crate::error::AppError;
use serde_json::{Map, Value};

pub struct RequestValidator;

impl RequestValidator {
    /// Body of a create: known, writable columns; every required column present and non-null.
    pub fn validate_create(table: &Table, body: &Map<String, Value>) -> Result<(), AppError> {
        Self::check_known(table, body)?;
        for column in table.columns.iter().filter(|c| c.is_required()) {
            if body.get(&column.name).map_or(true, Value::is_null) {
                return Err(AppError::Validation(format!("{} is required", column.name)));
            }
        }
        Ok(())
    }

    /// Body of a PATCH: non-empty, only known non-key columns, no null into NOT NULL.
    pub fn validate_update(table: &Table, body: &Map<String, Value>) -> Result<(), AppError> {
        if body.is_empty() {
            return Err(AppError::Validation("update body is empty".into()));
        }
        Self::check_known(table, body)?;
        for (name, value) in body {
            if table.primary_key.iter().any(|k| k == name) {
                return Err(AppError::Validation(format!("{} is part of the primary key", name)));
            }
            if value.is_null() && table.find_column(name).is_some_and(|c| !c.nullable) {
                return Err(AppError::Validation(format!("{} cannot be null", name)));
            }
        }
        Ok(())
    }

    fn check_known(table: &Table, body: &Map<String, Value>) -> Result<(), AppError> {
        for name in body.keys() {
            match table.find_column(name) {
                None => return Err(AppError::Validation(format!("unknown column '{}'", name))),
                Some(c) if c.is_generated => {
                    return Err(AppError::Validation(format!("{} is generated and cannot be written", name)))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{fixtures, Column};
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn create_requires_not_null_columns_without_default() {
        let catalog = fixtures::shop();
        let users = catalog.table("users").unwrap();
        assert!(RequestValidator::validate_create(users, &obj(json!({"name": "ann"}))).is_ok());
        let err = RequestValidator::validate_create(users, &obj(json!({}))).unwrap_err();
        assert!(err.to_string().contains("name is required"));
        assert!(RequestValidator::validate_create(users, &obj(json!({"name": null}))).is_err());
    }

    #[test]
    fn unknown_and_generated_columns_are_rejected() {
        let catalog = fixtures::shop();
        let users = catalog.table("users").unwrap();
        assert!(RequestValidator::validate_create(users, &obj(json!({"name": "a", "age": 3}))).is_err());

        let t = Table::new("public", "t")
            .column(Column::new("a", "int4"))
            .column(Column::new("b", "int4").generated());
        assert!(RequestValidator::validate_create(&t, &obj(json!({"b": 1}))).is_err());
        assert!(RequestValidator::validate_update(&t, &obj(json!({"b": 1}))).is_err());
    }

    #[test]
    fn update_rules() {
        let catalog = fixtures::shop();
        let orders = catalog.table("orders").unwrap();
        assert!(RequestValidator::validate_update(orders, &obj(json!({}))).is_err());
        assert!(RequestValidator::validate_update(orders, &obj(json!({"id": 2}))).is_err());
        assert!(RequestValidator::validate_update(orders, &obj(json!({"paid": null}))).is_err());
        assert!(RequestValidator::validate_update(orders, &obj(json!({"total": null, "paid": true}))).is_ok());
    }
}
