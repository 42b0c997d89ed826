//! autoapi: introspect a PostgreSQL schema and serve a REST API over it.

pub mod auth;
pub mod bootstrap;
pub mod catalog;
pub mod compile;
pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod sql;
pub mod state;

pub use auth::{AuthGate, CheckError, CredentialCheck, PasswordMode, TableCredentialCheck};
pub use bootstrap::{app_router, auth_gate, build_app, connect, load, run};
pub use catalog::{Catalog, Column, Table};
pub use compile::{compile, OperationDescriptor, OperationKind, RouteTable};
pub use error::{AppError, ConfigError};
pub use routes::{common_routes, generated_routes};
pub use service::{translate, ApiRequest, BoundStatement, CrudService};
pub use settings::Settings;
pub use state::AppState;
