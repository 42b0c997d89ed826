//! Load the catalog from pg_catalog / information_schema.
//! information_schema columns are domain types, so every selected column is cast for sqlx.

use crate::catalog::{Catalog, Column, ForeignKey, Table, TableKind, TypeCategory};
use crate::error::ConfigError;
use sqlx::PgPool;
use std::collections::HashMap;

const TABLES_SQL: &str = r#"
SELECT table_name::text, table_type::text, (is_insertable_into = 'YES') AS insertable
FROM information_schema.tables
WHERE table_schema = $1 AND table_type IN ('BASE TABLE', 'VIEW')
ORDER BY table_name
"#;

const COLUMNS_SQL: &str = r#"
SELECT table_name::text,
       column_name::text,
       ordinal_position::int4,
       data_type::text,
       udt_schema::text,
       udt_name::text,
       (is_nullable = 'YES') AS nullable,
       (column_default IS NOT NULL) AS has_default,
       (is_identity = 'YES') AS is_identity,
       (is_generated = 'ALWAYS') AS is_generated
FROM information_schema.columns
WHERE table_schema = $1
ORDER BY table_name, ordinal_position
"#;

/// Primary and foreign keys with columns in constraint order.
const CONSTRAINTS_SQL: &str = r#"
SELECT c.contype::text AS kind,
       c.conname::text AS name,
       cl.relname::text AS table_name,
       a.attname::text AS column_name,
       fns.nspname::text AS ref_schema,
       fcl.relname::text AS ref_table,
       fa.attname::text AS ref_column
FROM pg_catalog.pg_constraint c
JOIN pg_catalog.pg_class cl ON cl.oid = c.conrelid
JOIN pg_catalog.pg_namespace ns ON ns.oid = cl.relnamespace
CROSS JOIN LATERAL unnest(c.conkey, COALESCE(c.confkey, c.conkey)) WITH ORDINALITY AS k(attnum, fattnum, ord)
JOIN pg_catalog.pg_attribute a ON a.attrelid = c.conrelid AND a.attnum = k.attnum
LEFT JOIN pg_catalog.pg_class fcl ON fcl.oid = c.confrelid
LEFT JOIN pg_catalog.pg_namespace fns ON fns.oid = fcl.relnamespace
LEFT JOIN pg_catalog.pg_attribute fa ON fa.attrelid = c.confrelid AND fa.attnum = k.fattnum
WHERE c.contype IN ('p', 'f') AND ns.nspname = $1
ORDER BY cl.relname, c.contype, c.conname, k.ord
"#;

/// Enum labels of every user-defined enum type, in sort order.
const ENUMS_SQL: &str = r#"
SELECT n.nspname::text AS type_schema, t.typname::text AS type_name, e.enumlabel::text AS label
FROM pg_catalog.pg_enum e
JOIN pg_catalog.pg_type t ON t.oid = e.enumtypid
JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
ORDER BY n.nspname, t.typname, e.enumsortorder
"#;

#[derive(sqlx::FromRow)]
struct TableRow {
    table_name: String,
    table_type: String,
    insertable: bool,
}

#[derive(sqlx::FromRow)]
struct ColumnRow {
    table_name: String,
    column_name: String,
    ordinal_position: i32,
    data_type: String,
    udt_schema: String,
    udt_name: String,
    nullable: bool,
    has_default: bool,
    is_identity: bool,
    is_generated: bool,
}

#[derive(sqlx::FromRow)]
struct EnumRow {
    type_schema: String,
    type_name: String,
    label: String,
}

#[derive(sqlx::FromRow)]
struct ConstraintRow {
    kind: String,
    name: String,
    table_name: String,
    column_name: String,
    ref_schema: Option<String>,
    ref_table: Option<String>,
    ref_column: Option<String>,
}

impl Catalog {
    /// Introspect every table and view visible in `schema`. Fails if the schema cannot be read.
    pub async fn load(pool: &PgPool, schema: &str) -> Result<Catalog, ConfigError> {
        let usage: Option<bool> = sqlx::query_scalar(
            "SELECT has_schema_privilege(n.oid, 'USAGE') FROM pg_catalog.pg_namespace n WHERE n.nspname = $1",
        )
        .bind(schema)
        .fetch_optional(pool)
        .await
        .map_err(introspection_error)?;
        if usage != Some(true) {
            return Err(ConfigError::Privilege {
                schema: schema.to_string(),
            });
        }

        tracing::debug!(sql = %TABLES_SQL, schema, "query");
        let table_rows: Vec<TableRow> = sqlx::query_as(TABLES_SQL)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(introspection_error)?;
        tracing::debug!(sql = %COLUMNS_SQL, schema, "query");
        let column_rows: Vec<ColumnRow> = sqlx::query_as(COLUMNS_SQL)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(introspection_error)?;
        tracing::debug!(sql = %CONSTRAINTS_SQL, schema, "query");
        let constraint_rows: Vec<ConstraintRow> = sqlx::query_as(CONSTRAINTS_SQL)
            .bind(schema)
            .fetch_all(pool)
            .await
            .map_err(introspection_error)?;

        tracing::debug!(sql = %ENUMS_SQL, "query");
        let enum_rows: Vec<EnumRow> = sqlx::query_as(ENUMS_SQL)
            .fetch_all(pool)
            .await
            .map_err(introspection_error)?;

        let catalog = assemble(schema, table_rows, column_rows, constraint_rows, enum_rows)?;
        if catalog.tables.is_empty() {
            tracing::warn!(schema, "no tables or views visible; no entity routes will be generated");
        }
        Ok(catalog)
    }
}

fn introspection_error(e: sqlx::Error) -> ConfigError {
    match &e {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            ConfigError::Connect(e.to_string())
        }
        _ => ConfigError::Introspection(e.to_string()),
    }
}

fn assemble(
    schema: &str,
    table_rows: Vec<TableRow>,
    column_rows: Vec<ColumnRow>,
    constraint_rows: Vec<ConstraintRow>,
    enum_rows: Vec<EnumRow>,
) -> Result<Catalog, ConfigError> {
    let mut enums: HashMap<String, Vec<String>> = HashMap::new();
    for r in enum_rows {
        enums
            .entry(format!("{}.{}", r.type_schema, r.type_name))
            .or_default()
            .push(r.label);
    }

    let mut tables: HashMap<String, Table> = table_rows
        .into_iter()
        .map(|r| {
            let mut t = if r.table_type == "VIEW" {
                Table::view(schema, &r.table_name)
            } else {
                Table::new(schema, &r.table_name)
            };
            t.insertable = r.insertable && t.kind == TableKind::Table;
            (r.table_name, t)
        })
        .collect();

    for r in column_rows {
        let Some(table) = tables.get_mut(&r.table_name) else { continue };
        let pg_type = if r.data_type == "USER-DEFINED" && r.udt_schema != "pg_catalog" {
            format!("{}.{}", r.udt_schema, r.udt_name)
        } else {
            r.udt_name
        };
        let enum_labels = enums.get(&pg_type).cloned();
        table.columns.push(Column {
            name: r.column_name,
            ordinal: r.ordinal_position,
            category: TypeCategory::from_pg_type(&pg_type),
            pg_type,
            nullable: r.nullable,
            has_default: r.has_default,
            is_identity: r.is_identity,
            is_generated: r.is_generated,
            enum_labels,
        });
    }

    let mut foreign_keys: HashMap<(String, String), ForeignKey> = HashMap::new();
    for r in constraint_rows {
        let Some(table) = tables.get_mut(&r.table_name) else { continue };
        match r.kind.as_str() {
            "p" => table.primary_key.push(r.column_name),
            "f" => {
                let fk = foreign_keys
                    .entry((r.table_name.clone(), r.name.clone()))
                    .or_insert_with(|| ForeignKey {
                        name: r.name.clone(),
                        columns: Vec::new(),
                        ref_schema: r.ref_schema.clone().unwrap_or_default(),
                        ref_table: r.ref_table.clone().unwrap_or_default(),
                        ref_columns: Vec::new(),
                    });
                fk.columns.push(r.column_name);
                if let Some(c) = r.ref_column {
                    fk.ref_columns.push(c);
                }
            }
            _ => {}
        }
    }
    for ((table_name, _), fk) in foreign_keys {
        if let Some(table) = tables.get_mut(&table_name) {
            table.foreign_keys.push(fk);
        }
    }
    for table in tables.values_mut() {
        table.foreign_keys.sort_by(|a, b| a.name.cmp(&b.name));
    }

    for table in tables.values() {
        for pk in &table.primary_key {
            if table.find_column(pk).is_none() {
                return Err(ConfigError::InvalidPrimaryKey {
                    table: table.name.clone(),
                    column: pk.clone(),
                });
            }
        }
        if !table.has_primary_key() {
            tracing::warn!(table = %table.name, kind = ?table.kind, "no primary key; single-row operations disabled");
        }
    }

    Ok(Catalog::new(schema, tables.into_values().collect()))
}
