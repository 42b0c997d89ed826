//! Query translation: (descriptor, request) -> parameterized statement.
//! Identifiers come from the catalog; request values are only ever bound.

use super::coerce::{coerce_json, coerce_text};
use super::filter::{Condition, Conjunction, FilterOp, QueryOptions, SortKey, RESERVED_PARAMS};
use super::validation::RequestValidator;
use crate::catalog::{Catalog, Column, Table, TypeCategory};
use crate::compile::{IncludeDirection, OperationDescriptor, OperationKind, COMPOSITE_KEY_SEPARATOR};
use crate::error::AppError;
use crate::sql::{
    column_ref, join_condition, placeholder, quoted, select_expr, to_many_subquery, to_one_subquery, BindValue,
    MAIN_ALIAS, REL_ALIAS,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Most rows accepted by one bulk create.
pub const BULK_LIMIT: usize = 100;

/// Path parameter carrying the row identifier.
pub const ID_PARAM: &str = "id";

/// The parts of an HTTP request the translator reads.
#[derive(Clone, Debug, Default)]
pub struct ApiRequest {
    pub path_params: HashMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// How the rows of a statement become a response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultShape {
    /// Collection envelope with count.
    Many,
    /// Exactly one row or 404.
    One,
    /// Statements that always return one row (count, exists, aggregate).
    Single,
    /// One inserted row, 201.
    Created,
    /// Inserted rows, 201.
    CreatedMany,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoundStatement {
    pub sql: String,
    pub params: Vec<BindValue>,
    pub shape: ResultShape,
}

#[derive(Default)]
struct Binder {
    params: HashMap<String, BindValue>,
    counters: HashMap<&'static str, usize>,
}

impl Binder {
    /// Store a value under the next `{prefix}{n}` name; returns `:name::type`.
    fn bind(&mut self, prefix: &'static str, column: &Column, value: BindValue) -> String {
        let n = self.counters.entry(prefix).or_default();
        let name = format!("{}{}", prefix, n);
        *n += 1;
        let ph = placeholder(&name, column);
        self.params.insert(name, value);
        ph
    }
}

pub fn translate(op: &OperationDescriptor, catalog: &Catalog, req: &ApiRequest) -> Result<BoundStatement, AppError> {
    let table = catalog
        .table(&op.table)
        .ok_or_else(|| AppError::Internal(format!("table {} missing from catalog", op.table)))?;
    let template = op
        .sql
        .as_ref()
        .ok_or_else(|| AppError::Internal(format!("{} has no statement", op.kind.as_str())))?;
    let opts = QueryOptions::parse(&req.query)?;
    check_params(op.kind, &opts)?;
    let mut binder = Binder::default();
    let mut slots: HashMap<&str, String> = HashMap::new();

    if !op.key_columns.is_empty() {
        bind_key(op, table, req, &mut binder)?;
    }

    let shape = match op.kind {
        OperationKind::List | OperationKind::FindOne | OperationKind::RelationList => {
            slots.insert("projection", row_projection(catalog, table, op, &opts)?);
            let filter = where_expr(table, &opts, &mut binder)?;
            if op.kind == OperationKind::RelationList {
                slots.insert("and_where", filter.map(|w| format!(" AND ({})", w)).unwrap_or_default());
            } else {
                slots.insert("where", filter.map(|w| format!(" WHERE {}", w)).unwrap_or_default());
            }
            slots.insert("order", row_order(table, &opts.sort)?);
            if op.kind == OperationKind::FindOne {
                ResultShape::One
            } else {
                slots.insert("page", page(&opts, &mut binder));
                ResultShape::Many
            }
        }
        OperationKind::Count => {
            slots.insert("where", where_slot(table, &opts, &mut binder)?);
            ResultShape::Single
        }
        OperationKind::Distinct => {
            let fields = required_fields(table, &opts)?;
            slots.insert("projection", plain_projection(&fields));
            slots.insert("where", where_slot(table, &opts, &mut binder)?);
            slots.insert("order", output_order(&fields, &opts.sort, None)?);
            slots.insert("page", page(&opts, &mut binder));
            ResultShape::Many
        }
        OperationKind::GroupBy => {
            let fields = required_fields(table, &opts)?;
            slots.insert("projection", plain_projection(&fields));
            slots.insert(
                "group",
                fields
                    .iter()
                    .map(|c| column_ref(Some(MAIN_ALIAS), &c.name))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
            let count = count_alias(&fields);
            slots.insert("count", quoted(&count));
            slots.insert("where", where_slot(table, &opts, &mut binder)?);
            slots.insert("order", output_order(&fields, &opts.sort, Some(&count))?);
            slots.insert("page", page(&opts, &mut binder));
            ResultShape::Many
        }
        OperationKind::Aggregate => {
            let fields = required_fields(table, &opts)?;
            slots.insert("projection", aggregate_projection(&fields)?);
            slots.insert("where", where_slot(table, &opts, &mut binder)?);
            ResultShape::Single
        }
        OperationKind::Get => {
            slots.insert("projection", row_projection(catalog, table, op, &opts)?);
            ResultShape::One
        }
        OperationKind::Exists | OperationKind::Delete => {
            if op.kind == OperationKind::Exists {
                ResultShape::Single
            } else {
                ResultShape::One
            }
        }
        OperationKind::Create => {
            let row = body_object(req.body.as_ref())?;
            RequestValidator::validate_create(table, row)?;
            slots.insert("values", insert_values(table, &[row], &mut binder)?);
            ResultShape::Created
        }
        OperationKind::BulkCreate => {
            let rows = body_rows(req.body.as_ref())?;
            for row in &rows {
                RequestValidator::validate_create(table, row)?;
            }
            slots.insert("values", insert_values(table, &rows, &mut binder)?);
            ResultShape::CreatedMany
        }
        OperationKind::Update => {
            let row = body_object(req.body.as_ref())?;
            RequestValidator::validate_update(table, row)?;
            slots.insert("assignments", assignments(table, row, &mut binder)?);
            ResultShape::One
        }
        OperationKind::Describe => {
            return Err(AppError::Internal("describe has no statement".into()));
        }
    };

    let (sql, params) = template.fill(&slots)?.bind(&binder.params)?;
    tracing::debug!(kind = op.kind.as_str(), table = %op.table, sql = %sql, "translated");
    Ok(BoundStatement { sql, params, shape })
}

fn find_column<'a>(table: &'a Table, name: &str) -> Result<&'a Column, AppError> {
    table
        .find_column(name)
        .ok_or_else(|| AppError::Validation(format!("unknown column '{}' on {}", name, table.name)))
}

/// Split `:id` into one value per key column (composite keys joined by `___`).
fn bind_key(op: &OperationDescriptor, table: &Table, req: &ApiRequest, binder: &mut Binder) -> Result<(), AppError> {
    let raw = req
        .path_params
        .get(ID_PARAM)
        .ok_or_else(|| AppError::BadRequest("missing row identifier".into()))?;
    let parts: Vec<&str> = if op.key_columns.len() > 1 {
        raw.split(COMPOSITE_KEY_SEPARATOR).collect()
    } else {
        vec![raw.as_str()]
    };
    if parts.len() != op.key_columns.len() {
        return Err(AppError::Validation(format!(
            "identifier needs {} values joined by '{}'",
            op.key_columns.len(),
            COMPOSITE_KEY_SEPARATOR
        )));
    }
    for (i, (name, part)) in op.key_columns.iter().zip(parts).enumerate() {
        let value = match table.find_column(name) {
            Some(column) => coerce_text(column, part)?,
            None => BindValue::Text(part.to_string()),
        };
        binder.params.insert(format!("k{}", i), value);
    }
    Ok(())
}

/// Whether `col=value` filters apply, and which reserved parameters a kind reads.
fn accepted_params(kind: OperationKind) -> (bool, &'static [&'static str]) {
    match kind {
        OperationKind::List | OperationKind::RelationList => (true, RESERVED_PARAMS),
        OperationKind::FindOne => (true, &["_where", "_sort", "_fields", "_include"]),
        OperationKind::Count => (true, &["_where"]),
        OperationKind::Distinct | OperationKind::GroupBy => {
            (true, &["_where", "_sort", "_fields", "_limit", "_offset", "_p"])
        }
        OperationKind::Aggregate => (true, &["_where", "_fields"]),
        OperationKind::Get => (false, &["_fields", "_include"]),
        OperationKind::Exists
        | OperationKind::Delete
        | OperationKind::Create
        | OperationKind::BulkCreate
        | OperationKind::Update
        | OperationKind::Describe => (false, &[]),
    }
}

/// Parameters a route does not read are rejected rather than ignored.
fn check_params(kind: OperationKind, opts: &QueryOptions) -> Result<(), AppError> {
    let (filters, accepted) = accepted_params(kind);
    if let Some(name) = opts.reserved.iter().find(|p| !accepted.contains(p)) {
        return Err(AppError::Validation(format!("{} is not accepted on {} routes", name, kind.as_str())));
    }
    if !filters {
        if let Some((name, _)) = opts.equals.first() {
            return Err(AppError::Validation(format!(
                "filter '{}' is not accepted on {} routes",
                name,
                kind.as_str()
            )));
        }
    }
    Ok(())
}

fn accepts(column: &Column, op: FilterOp) -> bool {
    let category = column.category;
    match op {
        FilterOp::IsNull | FilterOp::IsNotNull => true,
        FilterOp::Eq | FilterOp::Ne => column.pg_type != "json",
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            !column.is_json() && matches!(category, TypeCategory::Numeric | TypeCategory::Date | TypeCategory::Text)
        }
        FilterOp::Like | FilterOp::NotLike => category == TypeCategory::Text && !column.is_json() && !column.is_array(),
        FilterOp::In => !column.is_json() && category != TypeCategory::Binary,
        FilterOp::Between => matches!(category, TypeCategory::Numeric | TypeCategory::Date),
    }
}

fn condition_sql(table: &Table, cond: &Condition, binder: &mut Binder) -> Result<String, AppError> {
    let column = find_column(table, &cond.column)?;
    if !accepts(column, cond.op) {
        return Err(AppError::Validation(format!(
            "operator {} not accepted for {} ({})",
            cond.op.name(),
            column.name,
            column.pg_type
        )));
    }
    let col = column_ref(Some(MAIN_ALIAS), &column.name);
    let first = cond.values.first().map(String::as_str).unwrap_or_default();
    Ok(match cond.op {
        FilterOp::Eq | FilterOp::Ne | FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let symbol = match cond.op {
                FilterOp::Eq => "=",
                FilterOp::Ne => "<>",
                FilterOp::Gt => ">",
                FilterOp::Gte => ">=",
                FilterOp::Lt => "<",
                _ => "<=",
            };
            format!("{} {} {}", col, symbol, bind_text(binder, column, first)?)
        }
        FilterOp::Like | FilterOp::NotLike => {
            let not = if cond.op == FilterOp::NotLike { "NOT " } else { "" };
            let pattern = binder.bind("w", &Column::new(&column.name, "text"), BindValue::Text(first.to_string()));
            format!("{}::text {}LIKE {}", col, not, pattern)
        }
        FilterOp::In => {
            let mut list = Vec::with_capacity(cond.values.len());
            for v in &cond.values {
                list.push(bind_text(binder, column, v)?);
            }
            format!("{} IN ({})", col, list.join(", "))
        }
        FilterOp::Between => {
            let low = bind_text(binder, column, &cond.values[0])?;
            let high = bind_text(binder, column, &cond.values[1])?;
            format!("{} BETWEEN {} AND {}", col, low, high)
        }
        FilterOp::IsNull => format!("{} IS NULL", col),
        FilterOp::IsNotNull => format!("{} IS NOT NULL", col),
    })
}

fn bind_text(binder: &mut Binder, column: &Column, raw: &str) -> Result<String, AppError> {
    let value = coerce_text(column, raw)?;
    Ok(binder.bind("w", column, value))
}

/// Equality params AND-ed together with the `_where` group, which folds left to right.
fn where_expr(table: &Table, opts: &QueryOptions, binder: &mut Binder) -> Result<Option<String>, AppError> {
    let mut parts = Vec::new();
    for (name, raw) in &opts.equals {
        let cond = Condition {
            conjunction: Conjunction::And,
            column: name.clone(),
            op: FilterOp::Eq,
            values: vec![raw.clone()],
        };
        parts.push(condition_sql(table, &cond, binder)?);
    }
    let mut group: Option<String> = None;
    for cond in &opts.conditions {
        let sql = condition_sql(table, cond, binder)?;
        group = Some(match group {
            None => sql,
            Some(acc) => format!("({} {} {})", acc, cond.conjunction.sql(), sql),
        });
    }
    parts.extend(group);
    Ok(if parts.is_empty() { None } else { Some(parts.join(" AND ")) })
}

fn where_slot(table: &Table, opts: &QueryOptions, binder: &mut Binder) -> Result<String, AppError> {
    Ok(where_expr(table, opts, binder)?
        .map(|w| format!(" WHERE {}", w))
        .unwrap_or_default())
}

fn page(opts: &QueryOptions, binder: &mut Binder) -> String {
    let (limit, offset) = opts.window();
    binder.params.insert("limit".into(), BindValue::I64(limit));
    binder.params.insert("offset".into(), BindValue::I64(offset));
    " LIMIT :limit OFFSET :offset".to_string()
}

fn sortable(column: &Column) -> Result<(), AppError> {
    if column.pg_type == "json" {
        return Err(AppError::Validation(format!("cannot sort by json column {}", column.name)));
    }
    Ok(())
}

/// ORDER BY on table columns; defaults to the primary key.
fn row_order(table: &Table, sort: &[SortKey]) -> Result<String, AppError> {
    let mut terms = Vec::new();
    for key in sort {
        let column = find_column(table, &key.column)?;
        sortable(column)?;
        let dir = if key.descending { " DESC" } else { "" };
        terms.push(format!("{}{}", column_ref(Some(MAIN_ALIAS), &column.name), dir));
    }
    if terms.is_empty() {
        terms = table
            .primary_key
            .iter()
            .map(|k| column_ref(Some(MAIN_ALIAS), k))
            .collect();
    }
    Ok(if terms.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", terms.join(", "))
    })
}

/// ORDER BY on output columns, for DISTINCT and GROUP BY. `extra` is an additional
/// output column (the group count) that is also the default, descending.
fn output_order(fields: &[&Column], sort: &[SortKey], extra: Option<&str>) -> Result<String, AppError> {
    let mut terms = Vec::new();
    for key in sort {
        let known = extra == Some(key.column.as_str()) || fields.iter().any(|c| c.name == key.column);
        if !known {
            return Err(AppError::Validation(format!("_sort column {} must be one of _fields", key.column)));
        }
        if let Some(c) = fields.iter().find(|c| c.name == key.column) {
            sortable(c)?;
        }
        let dir = if key.descending { " DESC" } else { "" };
        terms.push(format!("{}{}", quoted(&key.column), dir));
    }
    if terms.is_empty() {
        match extra {
            Some(e) => terms.push(format!("{} DESC", quoted(e))),
            None => terms.extend(fields.iter().filter(|c| c.pg_type != "json").map(|c| quoted(&c.name))),
        }
    }
    Ok(if terms.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", terms.join(", "))
    })
}

/// Output name of the group size: `count`, suffixed until it differs from every grouped column.
fn count_alias(fields: &[&Column]) -> String {
    let mut alias = "count".to_string();
    while fields.iter().any(|c| c.name == alias) {
        alias.push('_');
    }
    alias
}

fn required_fields<'a>(table: &'a Table, opts: &QueryOptions) -> Result<Vec<&'a Column>, AppError> {
    let names = opts
        .fields
        .as_ref()
        .ok_or_else(|| AppError::Validation("_fields is required on this route".into()))?;
    names.iter().map(|n| find_column(table, n)).collect()
}

fn plain_projection(fields: &[&Column]) -> String {
    fields
        .iter()
        .map(|c| select_expr(Some(MAIN_ALIAS), c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Columns (all, or `_fields`) plus one correlated subquery per `_include`.
fn row_projection(
    catalog: &Catalog,
    table: &Table,
    op: &OperationDescriptor,
    opts: &QueryOptions,
) -> Result<String, AppError> {
    let columns: Vec<&Column> = match &opts.fields {
        Some(names) => names.iter().map(|n| find_column(table, n)).collect::<Result<_, _>>()?,
        None => table.columns.iter().collect(),
    };
    let mut parts: Vec<String> = columns.iter().map(|c| select_expr(Some(MAIN_ALIAS), c)).collect();
    let mut seen: Vec<&str> = Vec::new();
    for name in &opts.includes {
        if seen.contains(&name.as_str()) {
            continue;
        }
        seen.push(name);
        let include = op
            .include(name)
            .ok_or_else(|| AppError::Validation(format!("unknown include '{}'", name)))?;
        let related = catalog
            .table(&include.related_table)
            .ok_or_else(|| AppError::Internal(format!("include target {} missing", include.related_table)))?;
        let join = join_condition(REL_ALIAS, &include.their_key_columns, MAIN_ALIAS, &include.our_key_columns);
        let sub = match include.direction {
            IncludeDirection::ToOne => to_one_subquery(related, &join),
            IncludeDirection::ToMany => to_many_subquery(related, &join),
        };
        parts.push(format!("{} AS {}", sub, quoted(&include.name)));
    }
    Ok(parts.join(", "))
}

fn aggregate_projection(fields: &[&Column]) -> Result<String, AppError> {
    let mut parts = Vec::new();
    for c in fields {
        if c.category != TypeCategory::Numeric {
            return Err(AppError::Validation(format!("{} is not numeric", c.name)));
        }
        let r = column_ref(Some(MAIN_ALIAS), &c.name);
        let alias = |f: &str| quoted(&format!("{}_of_{}", f, c.name));
        for f in ["min", "max"] {
            if c.is_native() {
                parts.push(format!("{}({}) AS {}", f, r, alias(f)));
            } else {
                parts.push(format!("{}({})::text AS {}", f, r, alias(f)));
            }
        }
        // Sums keep full precision: bigint for small integers, text for wide or exact types.
        let sum = match c.pg_type.as_str() {
            "float4" | "float8" => format!("sum({})::float8", r),
            "int2" | "int4" => format!("sum({})", r),
            _ => format!("sum({}::numeric)::text", r),
        };
        parts.push(format!("{} AS {}", sum, alias("sum")));
        for f in ["avg", "stddev", "variance"] {
            parts.push(format!("{}({}::numeric)::float8 AS {}", f, r, alias(f)));
        }
    }
    Ok(parts.join(", "))
}

fn body_object(body: Option<&Value>) -> Result<&Map<String, Value>, AppError> {
    match body {
        Some(Value::Object(m)) => Ok(m),
        Some(_) => Err(AppError::Validation("body must be a JSON object".into())),
        None => Err(AppError::Validation("JSON body required".into())),
    }
}

fn body_rows(body: Option<&Value>) -> Result<Vec<&Map<String, Value>>, AppError> {
    let items = match body {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(AppError::Validation("body must be a JSON array of objects".into())),
        None => return Err(AppError::Validation("JSON body required".into())),
    };
    if items.is_empty() {
        return Err(AppError::Validation("bulk body is empty".into()));
    }
    if items.len() > BULK_LIMIT {
        return Err(AppError::Validation(format!("bulk create limited to {} items", BULK_LIMIT)));
    }
    items
        .iter()
        .map(|item| match item {
            Value::Object(m) => Ok(m),
            _ => Err(AppError::Validation("each item must be a JSON object".into())),
        })
        .collect()
}

/// `("a", "b") VALUES (:v0::t, DEFAULT), ...` over the union of supplied columns, or `DEFAULT VALUES`.
fn insert_values(table: &Table, rows: &[&Map<String, Value>], binder: &mut Binder) -> Result<String, AppError> {
    let columns: Vec<&Column> = table
        .columns
        .iter()
        .filter(|c| rows.iter().any(|r| r.contains_key(&c.name)))
        .collect();
    if columns.is_empty() {
        if rows.len() == 1 {
            return Ok("DEFAULT VALUES".to_string());
        }
        let first = table
            .columns
            .first()
            .ok_or_else(|| AppError::Internal(format!("{} has no columns", table.name)))?;
        let tuples = vec!["(DEFAULT)"; rows.len()].join(", ");
        return Ok(format!("({}) VALUES {}", quoted(&first.name), tuples));
    }
    let mut tuples = Vec::with_capacity(rows.len());
    for row in rows {
        let mut values = Vec::with_capacity(columns.len());
        for c in &columns {
            match row.get(&c.name) {
                Some(v) => {
                    let value = coerce_json(c, v)?;
                    values.push(binder.bind("v", c, value));
                }
                None => values.push("DEFAULT".to_string()),
            }
        }
        tuples.push(format!("({})", values.join(", ")));
    }
    let names = columns.iter().map(|c| quoted(&c.name)).collect::<Vec<_>>().join(", ");
    Ok(format!("({}) VALUES {}", names, tuples.join(", ")))
}

fn assignments(table: &Table, row: &Map<String, Value>, binder: &mut Binder) -> Result<String, AppError> {
    let mut out = Vec::with_capacity(row.len());
    for (name, v) in row {
        let column = find_column(table, name)?;
        let value = coerce_json(column, v)?;
        out.push(format!("{} = {}", quoted(name), binder.bind("v", column, value)));
    }
    Ok(out.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures;
    use crate::compile::{compile, RouteTable};
    use axum::http::Method;
    use serde_json::json;

    fn routes() -> (Catalog, RouteTable) {
        let catalog = fixtures::shop();
        let routes = compile(&catalog).unwrap();
        (catalog, routes)
    }

    fn request(id: Option<&str>, query: &[(&str, &str)], body: Option<Value>) -> ApiRequest {
        ApiRequest {
            path_params: id.map(|i| HashMap::from([(ID_PARAM.to_string(), i.to_string())])).unwrap_or_default(),
            query: query.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            body,
        }
    }

    fn run(method: Method, path: &str, req: ApiRequest) -> Result<BoundStatement, AppError> {
        let (catalog, routes) = routes();
        let op = routes.find(&method, path).unwrap().clone();
        translate(&op, &catalog, &req)
    }

    #[test]
    fn list_defaults() {
        let stmt = run(Method::GET, "/users", request(None, &[], None)).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT main.\"id\" AS \"id\", main.\"name\" AS \"name\", main.\"email\" AS \"email\" \
             FROM \"public\".\"users\" main ORDER BY main.\"id\" LIMIT $1 OFFSET $2"
        );
        assert_eq!(stmt.params, vec![BindValue::I64(100), BindValue::I64(0)]);
        assert_eq!(stmt.shape, ResultShape::Many);
    }

    #[test]
    fn filters_sort_and_paging_are_bound() {
        let stmt = run(
            Method::GET,
            "/users",
            request(
                None,
                &[
                    ("name", "ann"),
                    ("_where", "(id,gt,3)~or(email,like,~@x.io)"),
                    ("_sort", "-name"),
                    ("_fields", "id,name"),
                    ("_limit", "10"),
                    ("_p", "2"),
                ],
                None,
            ),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT main.\"id\" AS \"id\", main.\"name\" AS \"name\" FROM \"public\".\"users\" main \
             WHERE main.\"name\" = $1::text AND (main.\"id\" > $2::int4 OR main.\"email\"::text LIKE $3::text) \
             ORDER BY main.\"name\" DESC LIMIT $4 OFFSET $5"
        );
        assert_eq!(
            stmt.params,
            vec![
                BindValue::Text("ann".into()),
                BindValue::I64(3),
                BindValue::Text("%@x.io".into()),
                BindValue::I64(10),
                BindValue::I64(10),
            ]
        );
    }

    #[test]
    fn injection_attempts_stay_in_parameters() {
        let stmt = run(Method::GET, "/users", request(None, &[("name", "x'; DROP TABLE users; --")], None)).unwrap();
        assert!(!stmt.sql.contains("DROP"));
        assert_eq!(stmt.params[0], BindValue::Text("x'; DROP TABLE users; --".into()));
    }

    #[test]
    fn unknown_columns_and_bad_values_are_validation_errors() {
        for q in [
            vec![("nope", "1")],
            vec![("id", "abc")],
            vec![("_where", "(paid,like,x)")],
            vec![("_sort", "missing")],
            vec![("_fields", "id,zzz")],
            vec![("_include", "nothing")],
        ] {
            let err = run(Method::GET, "/orders", request(None, &q, None)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{:?} -> {:?}", q, err);
        }
    }

    #[test]
    fn in_between_and_null_checks() {
        let stmt = run(
            Method::GET,
            "/orders/count",
            request(None, &[("_where", "(user_id,in,1,2)~and(total,btw,1.5,9)~and(meta,is,notnull)")], None),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) AS \"count\" FROM \"public\".\"orders\" main WHERE \
             ((main.\"user_id\" IN ($1::int4, $2::int4) AND main.\"total\" BETWEEN $3::numeric AND $4::numeric) \
             AND main.\"meta\" IS NOT NULL)"
        );
        assert_eq!(stmt.shape, ResultShape::Single);
    }

    #[test]
    fn get_by_composite_key() {
        let stmt = run(Method::GET, "/order_items/:id", request(Some("7___2"), &[], None)).unwrap();
        assert!(stmt.sql.ends_with("WHERE main.\"order_id\" = $1::int8 AND main.\"line\" = $2::int2"));
        assert_eq!(stmt.params, vec![BindValue::I64(7), BindValue::I64(2)]);
        assert_eq!(stmt.shape, ResultShape::One);

        let err = run(Method::GET, "/order_items/:id", request(Some("7"), &[], None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = run(Method::GET, "/users/:id", request(Some("abc"), &[], None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn includes_become_subqueries() {
        let stmt = run(Method::GET, "/orders/:id", request(Some("1"), &[("_include", "users,order_items")], None)).unwrap();
        assert!(stmt.sql.contains(
            "(SELECT row_to_json(sub) FROM (SELECT \"id\", \"name\", \"email\" FROM \"public\".\"users\" rel \
             WHERE rel.\"id\" = main.\"user_id\" LIMIT 1) sub) AS \"users\""
        ));
        assert!(stmt.sql.contains("COALESCE(json_agg(row_to_json(sub)), '[]'::json)"));
        assert!(stmt.sql.contains("WHERE rel.\"order_id\" = main.\"id\") sub) AS \"order_items\""));
    }

    #[test]
    fn relation_list_filters_by_parent() {
        let stmt = run(Method::GET, "/users/:id/orders", request(Some("4"), &[("paid", "true")], None)).unwrap();
        assert!(stmt.sql.contains("WHERE main.\"user_id\" = $1::int4 AND (main.\"paid\" = $2::bool)"));
        assert_eq!(stmt.params[..2], [BindValue::I64(4), BindValue::Bool(true)]);
    }

    #[test]
    fn create_inserts_supplied_columns() {
        let stmt = run(Method::POST, "/users", request(None, &[], Some(json!({"name": "ann", "email": null})))).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"public\".\"users\" (\"name\", \"email\") VALUES ($1::text, $2::text) \
             RETURNING \"id\", \"name\", \"email\""
        );
        assert_eq!(stmt.params, vec![BindValue::Text("ann".into()), BindValue::Null]);
        assert_eq!(stmt.shape, ResultShape::Created);

        let err = run(Method::POST, "/users", request(None, &[], Some(json!({})))).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = run(Method::POST, "/users", request(None, &[], None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn bulk_create_is_one_statement() {
        let body = json!([{"name": "a", "email": "a@x"}, {"name": "b"}]);
        let stmt = run(Method::POST, "/users/bulk", request(None, &[], Some(body))).unwrap();
        assert!(stmt
            .sql
            .starts_with("INSERT INTO \"public\".\"users\" (\"name\", \"email\") VALUES ($1::text, $2::text), ($3::text, DEFAULT)"));
        assert_eq!(stmt.shape, ResultShape::CreatedMany);

        let too_many = Value::Array(vec![json!({"name": "x"}); BULK_LIMIT + 1]);
        assert!(run(Method::POST, "/users/bulk", request(None, &[], Some(too_many))).is_err());
        assert!(run(Method::POST, "/users/bulk", request(None, &[], Some(json!([])))).is_err());
    }

    #[test]
    fn update_and_delete() {
        let stmt = run(Method::PATCH, "/orders/:id", request(Some("9"), &[], Some(json!({"paid": true, "total": 12.5})))).unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"public\".\"orders\" SET \"paid\" = $1::bool, \"total\" = $2::numeric WHERE \"id\" = $3::int8 \
             RETURNING \"id\", \"user_id\", \"total\"::text AS \"total\", \"placed_at\", \"paid\", \"meta\""
        );
        assert_eq!(
            stmt.params,
            vec![BindValue::Bool(true), BindValue::Text("12.5".into()), BindValue::I64(9)]
        );
        assert!(run(Method::PATCH, "/orders/:id", request(Some("9"), &[], Some(json!({})))).is_err());

        let stmt = run(Method::DELETE, "/orders/:id", request(Some("9"), &[], None)).unwrap();
        assert!(stmt.sql.starts_with("DELETE FROM \"public\".\"orders\" WHERE \"id\" = $1::int8"));
        assert!(run(Method::DELETE, "/orders/:id", request(Some("9"), &[("paid", "true")], None)).is_err());
    }

    #[test]
    fn group_by_distinct_and_aggregate() {
        let stmt = run(Method::GET, "/orders/groupby", request(None, &[("_fields", "user_id")], None)).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT main.\"user_id\" AS \"user_id\", COUNT(*) AS \"count\" FROM \"public\".\"orders\" main \
             GROUP BY main.\"user_id\" ORDER BY \"count\" DESC LIMIT $1 OFFSET $2"
        );
        assert!(run(Method::GET, "/orders/groupby", request(None, &[], None)).is_err());

        let stmt = run(Method::GET, "/orders/distinct", request(None, &[("_fields", "user_id"), ("_sort", "-user_id")], None)).unwrap();
        assert!(stmt.sql.starts_with("SELECT DISTINCT main.\"user_id\" AS \"user_id\" FROM"));
        assert!(stmt.sql.contains("ORDER BY \"user_id\" DESC"));
        assert!(run(Method::GET, "/orders/distinct", request(None, &[("_fields", "user_id"), ("_sort", "paid")], None)).is_err());

        let stmt = run(Method::GET, "/orders/aggregate", request(None, &[("_fields", "total")], None)).unwrap();
        assert!(stmt.sql.contains("min(main.\"total\")::text AS \"min_of_total\""));
        assert!(stmt.sql.contains("avg(main.\"total\"::numeric)::float8 AS \"avg_of_total\""));
        assert_eq!(stmt.shape, ResultShape::Single);
        assert!(run(Method::GET, "/orders/aggregate", request(None, &[("_fields", "placed_at")], None)).is_err());
    }

    #[test]
    fn reserved_params_outside_a_route_kind_are_rejected() {
        let cases: Vec<(Method, &str, Option<&str>, Vec<(&str, &str)>, Option<Value>)> = vec![
            (Method::GET, "/users/count", None, vec![("_sort", "name")], None),
            (Method::GET, "/users/count", None, vec![("_fields", "id")], None),
            (Method::GET, "/users/count", None, vec![("_include", "orders")], None),
            (Method::GET, "/users/:id", Some("1"), vec![("_sort", "name")], None),
            (Method::GET, "/users/:id", Some("1"), vec![("_limit", "5")], None),
            (Method::GET, "/users/:id/exists", Some("1"), vec![("_limit", "5")], None),
            (Method::DELETE, "/users/:id", Some("1"), vec![("_sort", "name")], None),
            (Method::POST, "/users", None, vec![("_limit", "5")], Some(json!({"name": "ann"}))),
            (Method::POST, "/users/bulk", None, vec![("_limit", "5")], Some(json!([{"name": "ann"}]))),
            (Method::PATCH, "/users/:id", Some("1"), vec![("_limit", "5")], Some(json!({"name": "ann"}))),
            (Method::GET, "/users/findOne", None, vec![("_p", "2")], None),
            (Method::GET, "/orders/aggregate", None, vec![("_fields", "total"), ("_sort", "total")], None),
            (Method::GET, "/orders/distinct", None, vec![("_fields", "user_id"), ("_include", "users")], None),
            (Method::GET, "/orders/groupby", None, vec![("_fields", "user_id"), ("_include", "users")], None),
        ];
        for (method, path, id, query, body) in cases {
            let err = run(method.clone(), path, request(id, &query, body)).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{} {} {:?} -> {:?}", method, path, query, err);
        }

        let stmt = run(Method::GET, "/users/:id", request(Some("1"), &[("_fields", "id"), ("_include", "orders")], None)).unwrap();
        assert!(stmt.sql.contains("AS \"orders\""));
        let stmt = run(Method::GET, "/users/findOne", request(None, &[("_sort", "-id")], None)).unwrap();
        assert!(!stmt.sql.contains("OFFSET"));
    }

    #[test]
    fn group_count_alias_avoids_grouped_column() {
        let tallies = Table::new("public", "tallies")
            .column(Column::new("id", "int4").not_null())
            .column(Column::new("count", "int4"))
            .primary_key(&["id"]);
        let catalog = Catalog::new("public", vec![tallies]);
        let routes = compile(&catalog).unwrap();
        let op = routes.find(&Method::GET, "/tallies/groupby").unwrap().clone();
        let stmt = translate(&op, &catalog, &request(None, &[("_fields", "count")], None)).unwrap();
        assert!(stmt.sql.contains("main.\"count\" AS \"count\", COUNT(*) AS \"count_\""));
        assert!(stmt.sql.contains("ORDER BY \"count_\" DESC"));
    }

    #[test]
    fn sums_keep_precision() {
        let stmt = run(Method::GET, "/orders/aggregate", request(None, &[("_fields", "total")], None)).unwrap();
        assert!(stmt.sql.contains("sum(main.\"total\"::numeric)::text AS \"sum_of_total\""));
        let stmt = run(Method::GET, "/users/aggregate", request(None, &[("_fields", "id")], None)).unwrap();
        assert!(stmt.sql.contains("sum(main.\"id\") AS \"sum_of_id\""));
    }

    #[test]
    fn out_of_range_values_never_reach_the_database() {
        let readings = Table::new("public", "readings")
            .column(Column::new("id", "int4").not_null())
            .column(Column::new("f", "float4"))
            .column(Column::new("iv", "interval"))
            .column(Column::new("state", "public.level").labels(&["low", "high"]))
            .primary_key(&["id"]);
        let catalog = Catalog::new("public", vec![readings]);
        let routes = compile(&catalog).unwrap();
        let create = routes.find(&Method::POST, "/readings").unwrap().clone();
        let list = routes.find(&Method::GET, "/readings").unwrap().clone();

        for body in [
            json!({"id": 1, "f": 1e300}),
            json!({"id": 1, "iv": "not an interval"}),
            json!({"id": 1, "state": "medium"}),
        ] {
            let err = translate(&create, &catalog, &request(None, &[], Some(body.clone()))).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "{} -> {:?}", body, err);
        }
        let err = translate(&list, &catalog, &request(None, &[("iv", "soon")], None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let ok = json!({"id": 1, "f": 1.5, "iv": "1 day 02:00:00", "state": "high"});
        assert!(translate(&create, &catalog, &request(None, &[], Some(ok))).is_ok());
    }

    #[test]
    fn exists_binds_key_only() {
        let stmt = run(Method::GET, "/users/:id/exists", request(Some("3"), &[], None)).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT EXISTS(SELECT 1 FROM \"public\".\"users\" main WHERE main.\"id\" = $1::int4) AS \"exists\""
        );
        assert_eq!(stmt.params, vec![BindValue::I64(3)]);
    }
}
