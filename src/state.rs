//! Shared application state for all routes. Built once per worker, read-only afterwards.

use crate::catalog::Catalog;
use crate::compile::RouteTable;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub catalog: Arc<Catalog>,
    pub routes: Arc<RouteTable>,
}

impl AppState {
    pub fn new(pool: PgPool, catalog: Catalog, routes: RouteTable) -> Self {
        AppState {
            pool,
            catalog: Arc::new(catalog),
            routes: Arc::new(routes),
        }
    }
}
