//! Routes built from the compiled route table: one axum route per distinct path,
//! one method handler per descriptor.

use crate::handlers::{handle, list_tables};
use crate::state::AppState;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::Method,
    routing::{get, on, MethodFilter, MethodRouter},
    Router,
};
use std::collections::HashMap;

fn method_filter(method: &Method) -> MethodFilter {
    match *method {
        Method::POST => MethodFilter::POST,
        Method::PATCH => MethodFilter::PATCH,
        Method::DELETE => MethodFilter::DELETE,
        _ => MethodFilter::GET,
    }
}

/// Every descriptor in `state.routes`, plus `GET /tables`.
pub fn generated_routes(state: AppState) -> Router {
    let mut by_path: HashMap<String, MethodRouter<AppState>> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for op in state.routes.operations() {
        let descriptor = op.clone();
        let handler = move |state: State<AppState>,
                            path: Option<Path<HashMap<String, String>>>,
                            query: Query<Vec<(String, String)>>,
                            body: Bytes| {
            let descriptor = descriptor.clone();
            async move { handle(descriptor, state, path, query, body).await }
        };
        let filter = method_filter(&op.method);
        let method_router = match by_path.remove(&op.path) {
            Some(existing) => existing.on(filter, handler),
            None => {
                order.push(op.path.clone());
                on(filter, handler)
            }
        };
        by_path.insert(op.path.clone(), method_router);
    }

    let mut router = Router::new().route("/tables", get(list_tables));
    for path in order {
        if let Some(method_router) = by_path.remove(&path) {
            router = router.route(&path, method_router);
        }
    }
    router.with_state(state)
}
