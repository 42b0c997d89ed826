//! Request value coercion by column type. Everything that reaches a statement passes through here.

use crate::catalog::{Column, TypeCategory};
use crate::error::AppError;
use crate::sql::BindValue;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn decimal() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").expect("static regex"))
}

fn money() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[+-]?\$?(\d{1,3}(,\d{3})+|\d+)(\.\d+)?$").expect("static regex"))
}

/// PostgreSQL verbose interval input: `1 day 2 hours`, `-3 mons`, `04:05:06`, `@ 1 year ago`.
fn interval_verbose() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let unit = r"(microseconds?|milliseconds?|us|ms|seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|w|months?|mons?|years?|yrs?|y|decades?|centurys?|centuries|millenniums?|millennia)";
        let quantity = format!(r"[+-]?\d+(\.\d+)?\s*{}", unit);
        let clock = r"[+-]?\d+:\d{1,2}(:\d{1,2}(\.\d+)?)?";
        Regex::new(&format!(r"(?i)^\s*(@\s*)?(({}|{})\s*)+(ago)?\s*$", quantity, clock)).expect("static regex")
    })
}

/// ISO 8601 duration: `P1Y2M3DT4H5M6S`, `P2W`.
fn interval_iso() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^P(\d+(\.\d+)?Y)?(\d+(\.\d+)?M)?(\d+(\.\d+)?W)?(\d+(\.\d+)?D)?(T(\d+(\.\d+)?H)?(\d+(\.\d+)?M)?(\d+(\.\d+)?S)?)?$")
            .expect("static regex")
    })
}

/// Exponent bounds of `numeric` input (131072 digits before the point, 16383 after).
const NUMERIC_EXPONENT: (i64, i64) = (-16383, 131071);

/// Largest `money` amount in whole units (int8 cents).
const MONEY_MAX_UNITS: u64 = 92_233_720_368_547_758;

fn hex_bytes() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\\x([0-9a-fA-F]{2})*$").expect("static regex"))
}

fn invalid(column: &Column, expected: &str) -> AppError {
    AppError::Validation(format!("{}: expected {}", column.name, expected))
}

fn out_of_range(column: &Column, raw: &str) -> AppError {
    AppError::Validation(format!("{}: {} out of range for {}", column.name, raw, column.pg_type))
}

fn int_range(pg_type: &str) -> (i64, i64) {
    match pg_type {
        "int2" => (i16::MIN as i64, i16::MAX as i64),
        "int4" => (i32::MIN as i64, i32::MAX as i64),
        "oid" => (0, u32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}

fn coerce_integer(column: &Column, n: i64) -> Result<BindValue, AppError> {
    let (min, max) = int_range(&column.pg_type);
    if n < min || n > max {
        return Err(out_of_range(column, &n.to_string()));
    }
    Ok(BindValue::I64(n))
}

/// `float4` is bound as f64, so its narrower range is checked here. Overflow to infinity
/// is an error; the spelled-out infinities are accepted.
fn coerce_float(column: &Column, raw: &str, n: f64) -> Result<BindValue, AppError> {
    if n.is_infinite() {
        let word = raw.trim().trim_start_matches(|c: char| c == '+' || c == '-').to_ascii_lowercase();
        if word != "inf" && word != "infinity" {
            return Err(out_of_range(column, raw));
        }
    } else if column.pg_type == "float4" && n.abs() > f32::MAX as f64 {
        return Err(out_of_range(column, raw));
    }
    Ok(BindValue::F64(n))
}

fn coerce_decimal(column: &Column, raw: &str) -> Result<BindValue, AppError> {
    let raw = raw.trim();
    if column.pg_type == "money" {
        if !money().is_match(raw) {
            return Err(invalid(column, "amount like 1234.56"));
        }
        let digits = raw.trim_start_matches(|c: char| c == '+' || c == '-').trim_start_matches('$').replace(',', "");
        let whole = digits.split('.').next().unwrap_or_default();
        match whole.parse::<u64>() {
            Ok(units) if units <= MONEY_MAX_UNITS => {}
            _ => return Err(out_of_range(column, raw)),
        }
        return Ok(BindValue::Text(raw.to_string()));
    }
    let caps = decimal().captures(raw).ok_or_else(|| invalid(column, "decimal number"))?;
    if let Some(exp) = caps.get(2) {
        match exp.as_str()[1..].parse::<i64>() {
            Ok(e) if e >= NUMERIC_EXPONENT.0 && e <= NUMERIC_EXPONENT.1 => {}
            _ => return Err(out_of_range(column, raw)),
        }
    }
    Ok(BindValue::Text(raw.to_string()))
}

fn valid_interval(raw: &str) -> bool {
    let raw = raw.trim();
    if raw.starts_with('P') {
        return raw.len() > 1 && !raw.ends_with('T') && interval_iso().is_match(raw);
    }
    interval_verbose().is_match(raw)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

fn valid_timestamp(raw: &str) -> bool {
    if chrono::DateTime::parse_from_rfc3339(raw).is_ok() {
        return true;
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
        .iter()
        .any(|f| chrono::NaiveDateTime::parse_from_str(raw, f).is_ok())
        || chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
}

fn valid_time(raw: &str) -> bool {
    // timetz values carry an offset suffix; validate the clock part
    let clock = raw
        .find(|c| c == '+' || c == 'Z' || c == 'z')
        .or_else(|| raw.rfind('-').filter(|&i| i > 0))
        .map(|i| &raw[..i])
        .unwrap_or(raw);
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .any(|f| chrono::NaiveTime::parse_from_str(clock, f).is_ok())
}

/// Coerce a value taken from the path or query string.
pub fn coerce_text(column: &Column, raw: &str) -> Result<BindValue, AppError> {
    if column.is_json() {
        // Bare words are JSON strings.
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        return Ok(BindValue::Json(value));
    }
    if column.is_array() {
        if !(raw.starts_with('{') && raw.ends_with('}')) {
            return Err(invalid(column, "array literal like {a,b}"));
        }
        return Ok(BindValue::Text(raw.to_string()));
    }
    match column.category {
        TypeCategory::Numeric if column.is_integer() => {
            let n: i64 = raw.trim().parse().map_err(|_| invalid(column, "integer"))?;
            coerce_integer(column, n)
        }
        TypeCategory::Numeric if matches!(column.pg_type.as_str(), "float4" | "float8") => {
            let n: f64 = raw.trim().parse().map_err(|_| invalid(column, "number"))?;
            coerce_float(column, raw, n)
        }
        TypeCategory::Numeric => coerce_decimal(column, raw),
        TypeCategory::Boolean => parse_bool(raw).map(BindValue::Bool).ok_or_else(|| invalid(column, "boolean")),
        TypeCategory::Date => {
            let ok = match column.pg_type.as_str() {
                "date" => chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok(),
                "timestamp" | "timestamptz" => valid_timestamp(raw),
                "time" | "timetz" => valid_time(raw),
                "interval" => valid_interval(raw),
                _ => false,
            };
            if !ok {
                return Err(invalid(column, &column.pg_type));
            }
            Ok(BindValue::Text(raw.to_string()))
        }
        TypeCategory::Binary => {
            if !hex_bytes().is_match(raw) {
                return Err(invalid(column, "hex bytes like \\x0a1b"));
            }
            Ok(BindValue::Text(raw.to_string()))
        }
        TypeCategory::Text => {
            if column.pg_type == "uuid" && uuid::Uuid::parse_str(raw).is_err() {
                return Err(invalid(column, "uuid"));
            }
            if let Some(labels) = &column.enum_labels {
                if !labels.iter().any(|l| l == raw) {
                    return Err(invalid(column, &format!("one of {}", labels.join(", "))));
                }
            }
            Ok(BindValue::Text(raw.to_string()))
        }
    }
}

/// Coerce a value taken from a JSON body. `null` passes through; nullability is checked by the caller.
pub fn coerce_json(column: &Column, value: &Value) -> Result<BindValue, AppError> {
    if value.is_null() {
        return Ok(BindValue::Null);
    }
    if column.is_json() {
        return Ok(BindValue::Json(value.clone()));
    }
    if column.is_array() {
        return match value {
            Value::Array(_) => Ok(BindValue::Text(array_literal(value))),
            Value::String(s) => coerce_text(column, s),
            _ => Err(invalid(column, "array")),
        };
    }
    match (column.category, value) {
        (TypeCategory::Numeric, Value::Number(n)) if column.is_integer() => match n.as_i64() {
            Some(i) => coerce_integer(column, i),
            None => Err(invalid(column, "integer")),
        },
        (TypeCategory::Numeric, Value::Number(n)) => {
            if matches!(column.pg_type.as_str(), "float4" | "float8") {
                let f = n.as_f64().ok_or_else(|| invalid(column, "number"))?;
                coerce_float(column, &n.to_string(), f)
            } else {
                coerce_decimal(column, &n.to_string())
            }
        }
        (TypeCategory::Boolean, Value::Bool(b)) => Ok(BindValue::Bool(*b)),
        (TypeCategory::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(BindValue::Bool(false)),
            Some(1) => Ok(BindValue::Bool(true)),
            _ => Err(invalid(column, "boolean")),
        },
        (TypeCategory::Text, Value::Number(_) | Value::Bool(_)) => coerce_text(column, &value.to_string()),
        (_, Value::String(s)) => coerce_text(column, s),
        (_, Value::Array(_) | Value::Object(_)) => Err(invalid(column, "scalar value")),
        _ => Err(invalid(column, &column.pg_type)),
    }
}

/// PostgreSQL array literal for a JSON array, e.g. `{"a","b c",NULL}`.
fn array_literal(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(array_literal).collect();
            format!("{{{}}}", inner.join(","))
        }
        Value::Null => "NULL".to_string(),
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Object(_) => format!("\"{}\"", value.to_string().replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}
