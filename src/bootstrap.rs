//! Startup: connect, introspect, compile, assemble the router, run workers.

use crate::auth::{require_auth, AuthGate, CredentialCheck, DenyAll, TableCredentialCheck, TOKEN_PATH};
use crate::catalog::Catalog;
use crate::compile::{compile, RouteTable};
use crate::error::ConfigError;
use crate::handlers::issue_token;
use crate::routes::{common_routes, generated_routes};
use crate::settings::Settings;
use crate::state::AppState;
use axum::{middleware, routing::post, Router};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::panic::AssertUnwindSafe;
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
pub const BODY_LIMIT_BYTES: usize = 4 * 1024 * 1024;

const RESTART_BACKOFF: Duration = Duration::from_secs(1);

pub async fn connect(settings: &Settings) -> Result<PgPool, ConfigError> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await
        .map_err(|e| ConfigError::Connect(e.to_string()))
}

/// Introspect the schema and compile its routes.
pub async fn load(pool: &PgPool, schema: &str) -> Result<(Catalog, RouteTable), ConfigError> {
    let catalog = Catalog::load(pool, schema).await?;
    let routes = compile(&catalog)?;
    Ok((catalog, routes))
}

/// Guarded when a JWT secret is configured, otherwise Open.
pub fn auth_gate(settings: &Settings, pool: &PgPool) -> AuthGate {
    let Some(secret) = &settings.jwt_secret else {
        if settings.master_key.is_some() {
            tracing::warn!("MASTER_KEY is set but JWT_SECRET is not; the API is open");
        } else {
            tracing::warn!("JWT_SECRET not set; the API is open");
        }
        return AuthGate::open();
    };
    let check: Arc<dyn CredentialCheck> = match &settings.auth {
        Some(a) => Arc::new(TableCredentialCheck::new(
            pool.clone(),
            &settings.schema,
            &a.table,
            &a.username_column,
            &a.password_column,
            a.password_mode,
        )),
        None => Arc::new(DenyAll),
    };
    AuthGate::guarded(secret.clone(), settings.master_key.clone(), check).with_token_ttl(settings.token_ttl_secs)
}

/// Generated routes under `api_prefix`, common routes and `/token` at the root,
/// all behind the gate.
pub fn app_router(state: AppState, gate: Arc<AuthGate>, api_prefix: &str) -> Router {
    let api = generated_routes(state.clone());
    let mut router = if api_prefix.is_empty() {
        Router::new().merge(api)
    } else {
        Router::new().nest(api_prefix, api)
    };
    router = router.merge(common_routes(state));
    if gate.is_guarded() {
        router = router.route(TOKEN_PATH, post(issue_token).with_state(gate.clone()));
    }
    router
        .layer(middleware::from_fn_with_state(gate, require_auth))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
}

pub async fn build_app(settings: &Settings) -> Result<Router, ConfigError> {
    let pool = connect(settings).await?;
    let (catalog, routes) = load(&pool, &settings.schema).await?;
    let gate = Arc::new(auth_gate(settings, &pool));
    let state = AppState::new(pool, catalog, routes);
    Ok(app_router(state, gate, &settings.api_prefix))
}

/// One worker: own pool, catalog and routes, serving the shared listener.
pub async fn serve_worker(settings: Settings, listener: std::net::TcpListener, worker: usize) -> Result<(), ConfigError> {
    let app = build_app(&settings).await?;
    listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(listener)?;
    tracing::info!(worker, "worker accepting connections");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Preflight load + compile, bind, then run `settings.workers` workers and restart any that die.
pub fn run(settings: Settings) -> Result<(), ConfigError> {
    let preflight = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    preflight.block_on(async {
        let pool = connect(&settings).await?;
        let (catalog, routes) = load(&pool, &settings.schema).await?;
        tracing::info!(
            schema = %catalog.schema,
            tables = catalog.tables.len(),
            operations = routes.len(),
            "preflight ok"
        );
        pool.close().await;
        Ok::<_, ConfigError>(())
    })?;
    drop(preflight);

    let listener = std::net::TcpListener::bind(&settings.bind_addr)?;
    tracing::info!(addr = %settings.bind_addr, prefix = %settings.api_prefix, workers = settings.workers, "listening");

    let (tx, rx) = mpsc::channel::<(usize, String)>();
    for id in 0..settings.workers {
        spawn_worker(id, &settings, &listener, tx.clone())?;
    }
    while let Ok((id, reason)) = rx.recv() {
        tracing::error!(worker = id, %reason, "worker exited; restarting");
        std::thread::sleep(RESTART_BACKOFF);
        spawn_worker(id, &settings, &listener, tx.clone())?;
    }
    Ok(())
}

fn spawn_worker(
    id: usize,
    settings: &Settings,
    listener: &std::net::TcpListener,
    tx: mpsc::Sender<(usize, String)>,
) -> Result<(), ConfigError> {
    let listener = listener.try_clone()?;
    let settings = settings.clone();
    std::thread::Builder::new()
        .name(format!("worker-{}", id))
        .spawn(move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), ConfigError> {
                let rt = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
                rt.block_on(serve_worker(settings, listener, id))
            }));
            let reason = match outcome {
                Ok(Ok(())) => "server stopped".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(_) => "panicked".to_string(),
            };
            let _ = tx.send((id, reason));
        })?;
    Ok(())
}
