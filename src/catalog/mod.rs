//! Schema catalog: snapshot of table/column/key metadata loaded once at startup.

mod loader;
mod types;

pub use loader::*;
pub use types::*;

use serde::Serialize;
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize)]
pub struct Catalog {
    pub schema: String,
    /// Sorted by name so everything derived from the catalog is deterministic.
    pub tables: Vec<Table>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl Catalog {
    pub fn new(schema: &str, mut tables: Vec<Table>) -> Self {
        tables.sort_by(|a, b| a.name.cmp(&b.name));
        let by_name = tables.iter().enumerate().map(|(i, t)| (t.name.clone(), i)).collect();
        Catalog {
            schema: schema.to_string(),
            tables,
            by_name,
        }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.by_name.get(name).map(|&i| &self.tables[i])
    }

    /// Parent table of a relationship, if it lives in this catalog.
    pub fn parent_of(&self, rel: &Relationship) -> Option<&Table> {
        if rel.parent_schema != self.schema {
            return None;
        }
        self.table(&rel.parent)
    }

    /// One relationship per foreign key, ordered by child table then constraint name.
    /// Keys that cannot be resolved are kept and flagged degenerate.
    pub fn relationships(&self) -> Vec<Relationship> {
        let mut out = Vec::new();
        for child in &self.tables {
            let mut fks: Vec<_> = child.foreign_keys.iter().collect();
            fks.sort_by(|a, b| a.name.cmp(&b.name));
            for fk in fks {
                out.push(Relationship {
                    name: fk.name.clone(),
                    child: child.name.clone(),
                    child_columns: fk.columns.clone(),
                    parent_schema: fk.ref_schema.clone(),
                    parent: fk.ref_table.clone(),
                    parent_columns: fk.ref_columns.clone(),
                    degenerate: self.check_foreign_key(child, fk),
                });
            }
        }
        out
    }

    fn check_foreign_key(&self, child: &Table, fk: &ForeignKey) -> Option<Degenerate> {
        if let Some(extra) = fk.ref_columns.get(fk.columns.len()) {
            return Some(Degenerate::MissingColumn { column: extra.clone() });
        }
        for col in &fk.columns {
            if child.find_column(col).is_none() {
                return Some(Degenerate::MissingColumn { column: col.clone() });
            }
        }
        let parent = if fk.ref_schema == self.schema {
            self.table(&fk.ref_table)
        } else {
            None
        };
        let Some(parent) = parent else {
            return Some(Degenerate::ParentOutsideCatalog);
        };
        for (child_col, parent_col) in fk.columns.iter().zip(&fk.ref_columns) {
            let Some(pc) = parent.find_column(parent_col) else {
                return Some(Degenerate::MissingColumn { column: parent_col.clone() });
            };
            let cc = child.find_column(child_col)?;
            if cc.category != pc.category {
                return Some(Degenerate::TypeMismatch {
                    child_column: child_col.clone(),
                    parent_column: parent_col.clone(),
                });
            }
        }
        None
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// users(id PK int, name text not null, email text unique) plus related tables.
    pub fn shop() -> Catalog {
        let users = Table::new("public", "users")
            .column(Column::new("id", "int4").not_null().with_default())
            .column(Column::new("name", "text").not_null())
            .column(Column::new("email", "text"))
            .primary_key(&["id"]);
        let orders = Table::new("public", "orders")
            .column(Column::new("id", "int8").not_null().identity())
            .column(Column::new("user_id", "int4").not_null())
            .column(Column::new("total", "numeric"))
            .column(Column::new("placed_at", "timestamptz").not_null().with_default())
            .column(Column::new("paid", "bool").not_null().with_default())
            .column(Column::new("meta", "jsonb"))
            .primary_key(&["id"])
            .foreign_key("orders_user_id_fkey", &["user_id"], "users", &["id"]);
        let order_items = Table::new("public", "order_items")
            .column(Column::new("order_id", "int8").not_null())
            .column(Column::new("line", "int2").not_null())
            .column(Column::new("sku", "varchar").not_null())
            .column(Column::new("qty", "int4").not_null())
            .primary_key(&["order_id", "line"])
            .foreign_key("order_items_order_id_fkey", &["order_id"], "orders", &["id"]);
        let order_totals = Table::view("public", "order_totals")
            .column(Column::new("user_id", "int4"))
            .column(Column::new("total", "numeric"));
        Catalog::new("public", vec![users, orders, order_items, order_totals])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_pg_types() {
        assert_eq!(TypeCategory::from_pg_type("int8"), TypeCategory::Numeric);
        assert_eq!(TypeCategory::from_pg_type("numeric"), TypeCategory::Numeric);
        assert_eq!(TypeCategory::from_pg_type("timestamptz"), TypeCategory::Date);
        assert_eq!(TypeCategory::from_pg_type("bool"), TypeCategory::Boolean);
        assert_eq!(TypeCategory::from_pg_type("bytea"), TypeCategory::Binary);
        assert_eq!(TypeCategory::from_pg_type("uuid"), TypeCategory::Text);
        assert_eq!(TypeCategory::from_pg_type("shop.order_status"), TypeCategory::Text);
    }

    #[test]
    fn tables_are_sorted_and_indexed() {
        let catalog = fixtures::shop();
        let names: Vec<_> = catalog.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["order_items", "order_totals", "orders", "users"]);
        assert_eq!(catalog.table("users").map(|t| t.columns.len()), Some(3));
        assert!(catalog.table("missing").is_none());
    }

    #[test]
    fn required_columns_exclude_defaults_and_identity() {
        let catalog = fixtures::shop();
        let orders = catalog.table("orders").unwrap();
        let required: Vec<_> = orders.columns.iter().filter(|c| c.is_required()).map(|c| c.name.as_str()).collect();
        assert_eq!(required, vec!["user_id"]);
    }

    #[test]
    fn resolved_relationships() {
        let catalog = fixtures::shop();
        let rels = catalog.relationships();
        assert_eq!(rels.len(), 2);
        assert_eq!(rels[0].child, "order_items");
        assert_eq!(rels[0].parent, "orders");
        assert!(rels[0].degenerate.is_none());
        assert_eq!(rels[1].child, "orders");
        assert_eq!(rels[1].parent, "users");
    }

    #[test]
    fn dangling_and_mismatched_keys_are_kept() {
        let tags = Table::new("public", "tags")
            .column(Column::new("id", "int4").not_null())
            .column(Column::new("owner", "uuid"))
            .column(Column::new("account_id", "text"))
            .primary_key(&["id"])
            .foreign_key("tags_owner_fkey", &["owner"], "accounts", &["id"])
            .foreign_key("tags_account_fkey", &["account_id"], "tags", &["id"]);
        let mut external = tags.clone();
        external.name = "notes".into();
        external.foreign_keys = vec![ForeignKey {
            name: "notes_owner_fkey".into(),
            columns: vec!["owner".into()],
            ref_schema: "auth".into(),
            ref_table: "users".into(),
            ref_columns: vec!["id".into()],
        }];
        let catalog = Catalog::new("public", vec![tags, external]);
        let rels = catalog.relationships();
        assert_eq!(rels.len(), 3);
        let by_name: HashMap<_, _> = rels.iter().map(|r| (r.name.as_str(), r)).collect();
        assert_eq!(by_name["notes_owner_fkey"].degenerate, Some(Degenerate::ParentOutsideCatalog));
        assert_eq!(by_name["tags_owner_fkey"].degenerate, Some(Degenerate::ParentOutsideCatalog));
        assert_eq!(
            by_name["tags_account_fkey"].degenerate,
            Some(Degenerate::TypeMismatch {
                child_column: "account_id".into(),
                parent_column: "id".into()
            })
        );
    }

    #[test]
    fn self_reference_is_not_degenerate() {
        let employees = Table::new("public", "employees")
            .column(Column::new("id", "int4").not_null())
            .column(Column::new("manager_id", "int4"))
            .primary_key(&["id"])
            .foreign_key("employees_manager_id_fkey", &["manager_id"], "employees", &["id"]);
        let catalog = Catalog::new("public", vec![employees]);
        let rels = catalog.relationships();
        assert_eq!(rels.len(), 1);
        assert!(rels[0].is_self_referential());
    }

    #[test]
    fn path_segments_are_sanitized() {
        assert_eq!(path_segment_for("order items"), "order_items");
        assert_eq!(path_segment_for("a:b*c"), "a_b_c");
        assert_eq!(path_segment_for("v2.report-x"), "v2.report-x");
    }
}
