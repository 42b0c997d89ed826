//! Example consumer: serves a schema with autoapi and issues tokens from a fixed
//! credential list instead of a database table.
//!
//! Run from repo root: `cargo run -p example-consumer`

use async_trait::async_trait;
use autoapi::{app_router, connect, load, AppState, AuthGate, CheckError, CredentialCheck, Settings};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Accepts `demo` / `demo` and nothing else.
struct DemoCheck;

#[async_trait]
impl CredentialCheck for DemoCheck {
    async fn validate(&self, credentials: &Value) -> Result<Option<Value>, CheckError> {
        let user = credentials.get("username").and_then(Value::as_str);
        let pass = credentials.get("password").and_then(Value::as_str);
        match (user, pass) {
            (Some("demo"), Some("demo")) => Ok(Some(json!({ "sub": "demo", "role": "reader" }))),
            (Some(_), Some(_)) => Ok(None),
            _ => Err(CheckError::new("username and password must be strings")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("autoapi=info,example_consumer=info")),
        )
        .init();

    let settings = Settings::from_env()?;
    let pool = connect(&settings).await?;
    let (catalog, routes) = load(&pool, &settings.schema).await?;
    let secret = settings.jwt_secret.clone().unwrap_or_else(|| "example-consumer-secret".into());
    let gate = AuthGate::guarded(secret, settings.master_key.clone(), Arc::new(DemoCheck));

    let app = app_router(AppState::new(pool, catalog, routes), Arc::new(gate), &settings.api_prefix);
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
