//! Compiled operations: one descriptor per generated (method, path) pair.

use crate::catalog::Relationship;
use crate::sql::SqlTemplate;
use axum::http::Method;
use serde::{Serialize, Serializer};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    List,
    Count,
    FindOne,
    Distinct,
    GroupBy,
    Aggregate,
    Describe,
    Create,
    BulkCreate,
    Get,
    Exists,
    Update,
    Delete,
    RelationList,
}

impl OperationKind {
    pub fn method(self) -> Method {
        match self {
            OperationKind::Create | OperationKind::BulkCreate => Method::POST,
            OperationKind::Update => Method::PATCH,
            OperationKind::Delete => Method::DELETE,
            _ => Method::GET,
        }
    }

    /// Path after the table segment.
    pub fn path_suffix(self) -> &'static str {
        match self {
            OperationKind::List | OperationKind::Create | OperationKind::RelationList => "",
            OperationKind::Count => "/count",
            OperationKind::FindOne => "/findOne",
            OperationKind::Distinct => "/distinct",
            OperationKind::GroupBy => "/groupby",
            OperationKind::Aggregate => "/aggregate",
            OperationKind::Describe => "/describe",
            OperationKind::BulkCreate => "/bulk",
            OperationKind::Get | OperationKind::Update | OperationKind::Delete => "/:id",
            OperationKind::Exists => "/:id/exists",
        }
    }

    /// Kinds that need a row identifier and so a primary key.
    pub fn is_keyed(self) -> bool {
        matches!(
            self,
            OperationKind::Get | OperationKind::Exists | OperationKind::Update | OperationKind::Delete
        )
    }

    pub fn is_write(self) -> bool {
        matches!(self, OperationKind::Create | OperationKind::BulkCreate | OperationKind::Update)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Count => "count",
            OperationKind::FindOne => "find_one",
            OperationKind::Distinct => "distinct",
            OperationKind::GroupBy => "group_by",
            OperationKind::Aggregate => "aggregate",
            OperationKind::Describe => "describe",
            OperationKind::Create => "create",
            OperationKind::BulkCreate => "bulk_create",
            OperationKind::Get => "get",
            OperationKind::Exists => "exists",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::RelationList => "relation_list",
        }
    }
}

/// Direction of a related-include: to_one (we have FK to them) or to_many (they have FK to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// Related rows that can be embedded with `?_include=name`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IncludeSpec {
    pub name: String,
    pub direction: IncludeDirection,
    pub related_table: String,
    /// Our columns used in the join (our FK for to_one; their referenced key for to_many).
    pub our_key_columns: Vec<String>,
    /// Their columns used in the join, paired with `our_key_columns`.
    pub their_key_columns: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct OperationDescriptor {
    #[serde(serialize_with = "method_name")]
    pub method: Method,
    /// axum path pattern; the row identifier is always `:id`.
    pub path: String,
    pub table: String,
    pub kind: OperationKind,
    /// None for operations answered from the catalog (describe).
    pub sql: Option<SqlTemplate>,
    /// Columns bound from `:id`, in order. Primary key, or the child's FK columns for relation lists.
    pub key_columns: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<IncludeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
}

fn method_name<S: Serializer>(method: &Method, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(method.as_str())
}

impl OperationDescriptor {
    pub fn include(&self, name: &str) -> Option<&IncludeSpec> {
        self.includes.iter().find(|i| i.name == name)
    }
}

/// Every compiled operation, immutable after startup.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    operations: Vec<Arc<OperationDescriptor>>,
}

impl RouteTable {
    pub fn new(operations: Vec<OperationDescriptor>) -> Self {
        RouteTable {
            operations: operations.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn operations(&self) -> &[Arc<OperationDescriptor>] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Look up by method and path pattern (e.g. `GET /users/:id`).
    pub fn find(&self, method: &Method, path: &str) -> Option<&Arc<OperationDescriptor>> {
        self.operations.iter().find(|op| op.method == *method && op.path == path)
    }

    pub fn for_table<'a>(&'a self, table: &'a str) -> impl Iterator<Item = &'a Arc<OperationDescriptor>> + 'a {
        self.operations.iter().filter(move |op| op.table == table)
    }
}
