//! Catalog -> RouteTable. Pure and deterministic: same catalog, same descriptors, same order.

use super::descriptor::{IncludeDirection, IncludeSpec, OperationDescriptor, OperationKind, RouteTable};
use crate::catalog::{path_segment_for, Catalog, Relationship, Table};
use crate::error::ConfigError;
use crate::sql::{all_columns, column_ref, placeholder, qualified_table, select_column_list, SqlTemplate, MAIN_ALIAS};
use std::collections::HashMap;

/// Separator between key values of a composite row identifier in a path.
pub const COMPOSITE_KEY_SEPARATOR: &str = "___";

/// Paths served outside the generated set.
pub const RESERVED_PATHS: &[&str] = &["/token", "/tables", "/health", "/ready", "/version"];

const TABLE_KINDS: &[OperationKind] = &[
    OperationKind::List,
    OperationKind::Count,
    OperationKind::FindOne,
    OperationKind::Distinct,
    OperationKind::GroupBy,
    OperationKind::Aggregate,
    OperationKind::Describe,
    OperationKind::Create,
    OperationKind::BulkCreate,
    OperationKind::Get,
    OperationKind::Exists,
    OperationKind::Update,
    OperationKind::Delete,
];

pub fn compile(catalog: &Catalog) -> Result<RouteTable, ConfigError> {
    let relationships = catalog.relationships();
    let mut ops = Vec::new();

    for table in &catalog.tables {
        if !table.has_primary_key() {
            tracing::warn!(table = %table.name, "no primary key: single-row routes not generated");
        }
        let includes = includes_for(catalog, table, &relationships);
        for &kind in TABLE_KINDS {
            if kind.is_keyed() && !table.has_primary_key() {
                continue;
            }
            if matches!(kind, OperationKind::Create | OperationKind::BulkCreate) && !table.insertable {
                continue;
            }
            ops.push(table_operation(table, kind, &includes));
        }
    }

    for rel in &relationships {
        if let Some(reason) = &rel.degenerate {
            tracing::warn!(relationship = %rel.name, child = %rel.child, parent = %rel.parent, ?reason, "degenerate relationship");
        }
        let Some(child) = catalog.table(&rel.child) else {
            continue;
        };
        let path = format!(
            "/{}/:id/{}",
            parent_segment(catalog, rel),
            child_segment(rel, &relationships)
        );
        ops.push(OperationDescriptor {
            method: OperationKind::RelationList.method(),
            path,
            table: child.name.clone(),
            kind: OperationKind::RelationList,
            sql: Some(relation_sql(child, rel)),
            key_columns: rel.child_columns.clone(),
            includes: includes_for(catalog, child, &relationships),
            relationship: Some(rel.clone()),
        });
    }

    check_collisions(&ops)?;
    tracing::info!(
        tables = catalog.tables.len(),
        relationships = relationships.len(),
        operations = ops.len(),
        "routes compiled"
    );
    Ok(RouteTable::new(ops))
}

fn table_operation(table: &Table, kind: OperationKind, includes: &[IncludeSpec]) -> OperationDescriptor {
    let key_columns = if kind.is_keyed() {
        table.primary_key.clone()
    } else {
        Vec::new()
    };
    let includes = match kind {
        OperationKind::List | OperationKind::FindOne | OperationKind::Get => includes.to_vec(),
        _ => Vec::new(),
    };
    OperationDescriptor {
        method: kind.method(),
        path: format!("/{}{}", table.path_segment(), kind.path_suffix()),
        table: table.name.clone(),
        kind,
        sql: table_sql(table, kind),
        key_columns,
        includes,
        relationship: None,
    }
}

fn table_sql(table: &Table, kind: OperationKind) -> Option<SqlTemplate> {
    let t = qualified_table(&table.schema, &table.name);
    let m = MAIN_ALIAS;
    let returning = select_column_list(None, &all_columns(table));
    let text = match kind {
        OperationKind::List | OperationKind::RelationList => {
            format!("SELECT {{projection}} FROM {t} {m}{{where}}{{order}}{{page}}")
        }
        OperationKind::Count => format!("SELECT COUNT(*) AS \"count\" FROM {t} {m}{{where}}"),
        OperationKind::FindOne => format!("SELECT {{projection}} FROM {t} {m}{{where}}{{order}} LIMIT 1"),
        OperationKind::Distinct => {
            format!("SELECT DISTINCT {{projection}} FROM {t} {m}{{where}}{{order}}{{page}}")
        }
        OperationKind::GroupBy => format!(
            "SELECT {{projection}}, COUNT(*) AS {{count}} FROM {t} {m}{{where}} GROUP BY {{group}}{{order}}{{page}}"
        ),
        OperationKind::Aggregate => format!("SELECT {{projection}} FROM {t} {m}{{where}}"),
        OperationKind::Describe => return None,
        OperationKind::Create | OperationKind::BulkCreate => {
            format!("INSERT INTO {t} {{values}} RETURNING {returning}")
        }
        OperationKind::Get => format!(
            "SELECT {{projection}} FROM {t} {m} WHERE {}",
            key_match(Some(m), table, &table.primary_key)
        ),
        OperationKind::Exists => format!(
            "SELECT EXISTS(SELECT 1 FROM {t} {m} WHERE {}) AS \"exists\"",
            key_match(Some(m), table, &table.primary_key)
        ),
        OperationKind::Update => format!(
            "UPDATE {t} SET {{assignments}} WHERE {} RETURNING {returning}",
            key_match(None, table, &table.primary_key)
        ),
        OperationKind::Delete => format!(
            "DELETE FROM {t} WHERE {} RETURNING {returning}",
            key_match(None, table, &table.primary_key)
        ),
    };
    Some(SqlTemplate::new(text))
}

fn relation_sql(child: &Table, rel: &Relationship) -> SqlTemplate {
    let t = qualified_table(&child.schema, &child.name);
    let m = MAIN_ALIAS;
    SqlTemplate::new(format!(
        "SELECT {{projection}} FROM {t} {m} WHERE {}{{and_where}}{{order}}{{page}}",
        key_match(Some(m), child, &rel.child_columns)
    ))
}

/// `main."a" = :k0::int4 AND main."b" = :k1::text`, one placeholder per key column.
fn key_match(qualifier: Option<&str>, table: &Table, key_columns: &[String]) -> String {
    key_columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let key = format!("k{}", i);
            let value = match table.find_column(name) {
                Some(column) => placeholder(&key, column),
                None => format!(":{}", key),
            };
            format!("{} = {}", column_ref(qualifier, name), value)
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn parent_segment(catalog: &Catalog, rel: &Relationship) -> String {
    if catalog.parent_of(rel).is_some() {
        path_segment_for(&rel.parent)
    } else {
        path_segment_for(&format!("{}.{}", rel.parent_schema, rel.parent))
    }
}

/// Child segment, suffixed with the FK columns when the child references the same parent twice.
fn child_segment(rel: &Relationship, all: &[Relationship]) -> String {
    let siblings = all
        .iter()
        .filter(|r| r.child == rel.child && r.parent == rel.parent && r.parent_schema == rel.parent_schema)
        .count();
    let base = path_segment_for(&rel.child);
    if siblings > 1 {
        format!("{}_by_{}", base, path_segment_for(&rel.child_columns.join("_")))
    } else {
        base
    }
}

struct IncludeCandidate {
    base: String,
    connector: &'static str,
    columns: String,
    include: IncludeSpec,
}

/// Includes reachable from `table` through resolved relationships. Ambiguous names get
/// the FK columns appended: `{parent}_via_{cols}` for to-one, `{child}_by_{cols}` for to-many.
fn includes_for(catalog: &Catalog, table: &Table, relationships: &[Relationship]) -> Vec<IncludeSpec> {
    let mut candidates = Vec::new();
    for rel in relationships.iter().filter(|r| r.degenerate.is_none()) {
        if rel.child == table.name {
            candidates.push(IncludeCandidate {
                base: path_segment_for(&rel.parent),
                connector: "_via_",
                columns: path_segment_for(&rel.child_columns.join("_")),
                include: IncludeSpec {
                    name: String::new(),
                    direction: IncludeDirection::ToOne,
                    related_table: rel.parent.clone(),
                    our_key_columns: rel.child_columns.clone(),
                    their_key_columns: rel.parent_columns.clone(),
                },
            });
        }
        if rel.parent == table.name && rel.parent_schema == catalog.schema {
            candidates.push(IncludeCandidate {
                base: path_segment_for(&rel.child),
                connector: "_by_",
                columns: path_segment_for(&rel.child_columns.join("_")),
                include: IncludeSpec {
                    name: String::new(),
                    direction: IncludeDirection::ToMany,
                    related_table: rel.child.clone(),
                    our_key_columns: rel.parent_columns.clone(),
                    their_key_columns: rel.child_columns.clone(),
                },
            });
        }
    }

    let mut base_counts: HashMap<&str, usize> = HashMap::new();
    for c in &candidates {
        *base_counts.entry(c.base.as_str()).or_default() += 1;
    }
    let ambiguous: Vec<bool> = candidates
        .iter()
        .map(|c| base_counts[c.base.as_str()] > 1 || table.find_column(&c.base).is_some())
        .collect();

    let mut out: Vec<IncludeSpec> = Vec::with_capacity(candidates.len());
    for (candidate, ambiguous) in candidates.into_iter().zip(ambiguous) {
        let name = if ambiguous {
            format!("{}{}{}", candidate.base, candidate.connector, candidate.columns)
        } else {
            candidate.base
        };
        if out.iter().any(|i| i.name == name) {
            tracing::warn!(table = %table.name, include = %name, "duplicate include name skipped");
            continue;
        }
        out.push(IncludeSpec { name, ..candidate.include });
    }
    out
}

fn check_collisions(ops: &[OperationDescriptor]) -> Result<(), ConfigError> {
    let mut seen: HashMap<(String, String), String> = HashMap::new();
    for reserved in RESERVED_PATHS {
        for method in ["GET", "POST", "PATCH", "DELETE"] {
            seen.insert((method.to_string(), reserved.to_string()), "reserved route".to_string());
        }
    }
    for op in ops {
        let key = (op.method.as_str().to_string(), op.path.clone());
        let owner = format!("{} on {}", op.kind.as_str(), op.table);
        if let Some(first) = seen.get(&key) {
            return Err(ConfigError::RouteCollision {
                method: key.0,
                path: key.1,
                first: first.clone(),
                second: owner,
            });
        }
        seen.insert(key, owner);
    }
    Ok(())
}
