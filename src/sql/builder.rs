//! SQL fragment helpers: identifiers come from the catalog only, values are placeholders.

use crate::catalog::{Column, Table};
use regex::Regex;
use std::sync::OnceLock;

/// Alias of the target table in every generated SELECT.
pub const MAIN_ALIAS: &str = "main";

/// Alias of the related table inside include subqueries.
pub const REL_ALIAS: &str = "rel";

/// Quote identifier for PostgreSQL.
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

fn bare_type_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("static regex"))
}

/// Type to cast a bound value to, e.g. `int4` or `"shop"."order_status"`.
pub fn cast_type(column: &Column) -> String {
    if bare_type_name().is_match(&column.pg_type) {
        return column.pg_type.clone();
    }
    match column.pg_type.split_once('.') {
        Some((schema, name)) => format!("{}.{}", quoted(schema), quoted(name)),
        None => quoted(&column.pg_type),
    }
}

/// `:name::type` placeholder for a value bound to `column`.
pub fn placeholder(name: &str, column: &Column) -> String {
    format!(":{}::{}", name, cast_type(column))
}

/// `alias."col"` or `"col"`.
pub fn column_ref(qualifier: Option<&str>, column: &str) -> String {
    match qualifier {
        Some(q) => format!("{}.{}", q, quoted(column)),
        None => quoted(column),
    }
}

/// Select expression for one column. Types the row decoder does not read natively are
/// selected as text; arrays are selected as JSON.
pub fn select_expr(qualifier: Option<&str>, column: &Column) -> String {
    let r = column_ref(qualifier, &column.name);
    let q = quoted(&column.name);
    if column.is_native() {
        if qualifier.is_some() {
            format!("{} AS {}", r, q)
        } else {
            r
        }
    } else if column.is_array() {
        format!("to_json({}) AS {}", r, q)
    } else {
        format!("{}::text AS {}", r, q)
    }
}

/// SELECT list for the given columns.
pub fn select_column_list(qualifier: Option<&str>, columns: &[&Column]) -> String {
    columns
        .iter()
        .map(|c| select_expr(qualifier, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every column of the table, in ordinal order.
pub fn all_columns(table: &Table) -> Vec<&Column> {
    table.columns.iter().collect()
}

/// `a = b AND c = d` joining columns of two aliases pairwise.
pub fn join_condition(left: &str, left_cols: &[String], right: &str, right_cols: &[String]) -> String {
    left_cols
        .iter()
        .zip(right_cols)
        .map(|(l, r)| format!("{} = {}", column_ref(Some(left), l), column_ref(Some(right), r)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Correlated subquery embedding the single related row as a JSON object.
pub fn to_one_subquery(related: &Table, join: &str) -> String {
    format!(
        "(SELECT row_to_json(sub) FROM (SELECT {} FROM {} {} WHERE {} LIMIT 1) sub)",
        select_column_list(None, &all_columns(related)),
        qualified_table(&related.schema, &related.name),
        REL_ALIAS,
        join
    )
}

/// Correlated subquery embedding all related rows as a JSON array.
pub fn to_many_subquery(related: &Table, join: &str) -> String {
    format!(
        "(SELECT COALESCE(json_agg(row_to_json(sub)), '[]'::json) FROM (SELECT {} FROM {} {} WHERE {}) sub)",
        select_column_list(None, &all_columns(related)),
        qualified_table(&related.schema, &related.name),
        REL_ALIAS,
        join
    )
}
