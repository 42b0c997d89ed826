//! Introspected schema model: tables, columns, keys. Plain data, immutable after load.

use serde::Serialize;

/// Coarse SQL type category used to validate and coerce request values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Numeric,
    Text,
    Date,
    Binary,
    Boolean,
}

impl TypeCategory {
    /// Category for a PostgreSQL type name (`udt_name`, e.g. "int4", "timestamptz").
    pub fn from_pg_type(pg_type: &str) -> Self {
        match pg_type.to_lowercase().as_str() {
            "int2" | "int4" | "int8" | "smallint" | "integer" | "bigint" | "serial" | "bigserial"
            | "smallserial" | "float4" | "float8" | "real" | "double precision" | "numeric"
            | "decimal" | "money" | "oid" => TypeCategory::Numeric,
            "bool" | "boolean" => TypeCategory::Boolean,
            "date" | "time" | "timetz" | "timestamp" | "timestamptz" | "interval" => TypeCategory::Date,
            "bytea" => TypeCategory::Binary,
            _ => TypeCategory::Text,
        }
    }
}

/// Types the row decoder reads natively; everything else is selected as text.
const NATIVE_TYPES: &[&str] = &[
    "int2", "int4", "int8", "float4", "float8", "bool", "text", "varchar", "bpchar", "name", "uuid",
    "json", "jsonb", "timestamptz", "timestamp", "date",
];

#[derive(Clone, Debug, Serialize)]
pub struct Column {
    pub name: String,
    pub ordinal: i32,
    pub category: TypeCategory,
    /// PostgreSQL type name. Built-in types are bare ("int4"); user-defined types are
    /// schema-qualified ("shop.order_status"); arrays carry the leading underscore ("_int4").
    pub pg_type: String,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. nextval(), NOW()).
    pub has_default: bool,
    pub is_identity: bool,
    pub is_generated: bool,
    /// Labels of an enum type, in sort order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_labels: Option<Vec<String>>,
}

impl Column {
    pub fn new(name: &str, pg_type: &str) -> Self {
        Column {
            name: name.to_string(),
            ordinal: 0,
            category: TypeCategory::from_pg_type(pg_type),
            pg_type: pg_type.to_string(),
            nullable: true,
            has_default: false,
            is_identity: false,
            is_generated: false,
            enum_labels: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn identity(mut self) -> Self {
        self.is_identity = true;
        self
    }

    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.enum_labels = Some(labels.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn generated(mut self) -> Self {
        self.is_generated = true;
        self
    }

    /// A create request must supply this column.
    pub fn is_required(&self) -> bool {
        !self.nullable && !self.has_default && !self.is_identity && !self.is_generated
    }

    pub fn is_array(&self) -> bool {
        self.pg_type.starts_with('_')
    }

    pub fn is_json(&self) -> bool {
        matches!(self.pg_type.as_str(), "json" | "jsonb")
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.pg_type.as_str(), "int2" | "int4" | "int8" | "oid")
    }

    /// Whether the row decoder can read the column without a text cast.
    pub fn is_native(&self) -> bool {
        NATIVE_TYPES.contains(&self.pg_type.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    View,
}

#[derive(Clone, Debug, Serialize)]
pub struct ForeignKey {
    pub name: String,
    pub columns: Vec<String>,
    pub ref_schema: String,
    pub ref_table: String,
    pub ref_columns: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    pub insertable: bool,
    pub columns: Vec<Column>,
    /// Primary key column names in declared order. Empty for views and keyless tables.
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    pub fn new(schema: &str, name: &str) -> Self {
        Table {
            schema: schema.to_string(),
            name: name.to_string(),
            kind: TableKind::Table,
            insertable: true,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn view(schema: &str, name: &str) -> Self {
        Table {
            kind: TableKind::View,
            insertable: false,
            ..Table::new(schema, name)
        }
    }

    pub fn column(mut self, mut column: Column) -> Self {
        column.ordinal = self.columns.len() as i32 + 1;
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn foreign_key(mut self, name: &str, columns: &[&str], ref_table: &str, ref_columns: &[&str]) -> Self {
        let schema = self.schema.clone();
        self.foreign_keys.push(ForeignKey {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            ref_schema: schema,
            ref_table: ref_table.to_string(),
            ref_columns: ref_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// URL path segment for this table.
    pub fn path_segment(&self) -> String {
        path_segment_for(&self.name)
    }
}

/// Map a SQL identifier onto a path-safe segment: characters outside `[A-Za-z0-9_.-]` become `_`.
pub fn path_segment_for(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') { c } else { '_' })
        .collect()
}

/// Why a relationship could not be fully resolved against the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Degenerate {
    ParentOutsideCatalog,
    MissingColumn { column: String },
    TypeMismatch { child_column: String, parent_column: String },
}

/// Directed edge child -> parent through one foreign key.
#[derive(Clone, Debug, Serialize)]
pub struct Relationship {
    /// Foreign key constraint name.
    pub name: String,
    pub child: String,
    pub child_columns: Vec<String>,
    pub parent_schema: String,
    pub parent: String,
    pub parent_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degenerate: Option<Degenerate>,
}

impl Relationship {
    pub fn is_self_referential(&self) -> bool {
        self.degenerate.is_none() && self.child == self.parent
    }
}
