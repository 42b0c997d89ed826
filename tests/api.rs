use async_trait::async_trait;
use autoapi::auth::{token, CheckError, CredentialCheck, MASTER_KEY_HEADER};
use autoapi::{app_router, compile, load, AppState, AuthGate, Catalog, Column, Table};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower::ServiceExt;

const SECRET: &str = "integration-secret";

fn catalog() -> Catalog {
    let users = Table::new("public", "users")
        .column(Column::new("id", "int4").not_null().with_default())
        .column(Column::new("name", "text").not_null())
        .column(Column::new("email", "text"))
        .primary_key(&["id"]);
    let posts = Table::new("public", "posts")
        .column(Column::new("id", "int4").not_null().with_default())
        .column(Column::new("user_id", "int4").not_null())
        .column(Column::new("title", "text"))
        .primary_key(&["id"])
        .foreign_key("posts_user_id_fkey", &["user_id"], "users", &["id"]);
    Catalog::new("public", vec![users, posts])
}

/// Router over a fixed catalog and a pool that never connects.
fn app(gate: AuthGate) -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/unused")
        .unwrap();
    let catalog = catalog();
    let routes = compile(&catalog).unwrap();
    app_router(AppState::new(pool, catalog, routes), Arc::new(gate), "/api")
}

struct Stub(Result<Option<Value>, CheckError>);

#[async_trait]
impl CredentialCheck for Stub {
    async fn validate(&self, _credentials: &Value) -> Result<Option<Value>, CheckError> {
        self.0.clone()
    }
}

fn guarded(check: Stub) -> AuthGate {
    AuthGate::guarded(SECRET, Some("letmein".into()), Arc::new(check))
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, req).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn missing_required_field_is_400() {
    let (status, body) = send_json(app(AuthGate::open()), request(Method::POST, "/api/users", Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn unknown_column_and_param_are_400() {
    let (status, _) = send_json(
        app(AuthGate::open()),
        request(Method::POST, "/api/users", Some(json!({"name": "Ada", "nickname": "a"}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(app(AuthGate::open()), request(Method::GET, "/api/users?_bogus=1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(app(AuthGate::open()), request(Method::GET, "/api/users?_where=(nope,eq,1)", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_json_body_is_400() {
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send_json(app(AuthGate::open()), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn describe_and_tables_need_no_database() {
    let (status, body) = send_json(app(AuthGate::open()), request(Method::GET, "/api/users/describe", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "users");
    assert_eq!(body["data"]["primary_key"], json!(["id"]));

    let (status, body) = send_json(app(AuthGate::open()), request(Method::GET, "/api/tables", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 2);
    let posts = body["data"].as_array().unwrap().iter().find(|t| t["name"] == "posts").unwrap();
    let routes: Vec<&str> = posts["routes"].as_array().unwrap().iter().filter_map(Value::as_str).collect();
    assert!(routes.contains(&"GET /users/:id/posts"));
}

#[tokio::test]
async fn describe_rejects_query_parameters() {
    let (status, body) = send_json(app(AuthGate::open()), request(Method::GET, "/api/users/describe?_limit=1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
}

#[tokio::test]
async fn unsupported_paging_on_keyed_routes_is_400() {
    let (status, _) = send_json(app(AuthGate::open()), request(Method::GET, "/api/users/1?_sort=name", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send_json(app(AuthGate::open()), request(Method::DELETE, "/api/users/1?_limit=1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let (status, _) = send(app(AuthGate::open()), request(Method::GET, "/api/missing", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(app(AuthGate::open()), request(Method::GET, "/users", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn open_gate_serves_health_without_token_route() {
    let (status, _) = send(app(AuthGate::open()), request(Method::GET, "/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(app(AuthGate::open()), request(Method::POST, "/token", Some(json!({"username": "a"})))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn guarded_gate_requires_credentials() {
    let gate = || guarded(Stub(Ok(None)));

    let (status, _) = send(app(gate()), request(Method::GET, "/health", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/users")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(app(gate()), req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Master key wins over a bad token; the request then fails validation.
    let req = Request::builder()
        .method(Method::POST)
        .uri("/api/users")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .header(MASTER_KEY_HEADER, "letmein")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _) = send(app(gate()), req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let jwt = token::sign(SECRET, json!({"sub": "ada"}), None).unwrap();
    let req = Request::builder()
        .method(Method::GET)
        .uri("/api/users/describe")
        .header(header::AUTHORIZATION, format!("Bearer {}", jwt))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(gate()), req).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn token_issued_for_valid_credentials() {
    let gate = guarded(Stub(Ok(Some(json!({"id": 7, "role": "admin"})))));
    let (status, body) = send_json(
        app(gate),
        request(Method::POST, "/token", Some(json!({"username": "ada", "password": "pw"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let claims = token::verify(SECRET, body["jwt"].as_str().unwrap()).unwrap();
    assert_eq!(claims["id"], 7);
    assert_eq!(claims["role"], "admin");
}

#[tokio::test]
async fn token_rejections() {
    let (status, body) = send_json(
        app(guarded(Stub(Ok(None)))),
        request(Method::POST, "/token", Some(json!({"username": "ada", "password": "bad"}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Invalid credentials."}));

    let (status, body) = send(app(guarded(Stub(Ok(None)))), request(Method::POST, "/token", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(String::from_utf8(body).unwrap(), "Required username and password fields.");

    let (status, body) = send_json(
        app(guarded(Stub(Err(CheckError::new("directory offline"))))),
        request(Method::POST, "/token", Some(json!({"username": "ada", "password": "pw"}))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({"error": "directory offline"}));
}

/// Full round trip against a live database; skipped unless TEST_DATABASE_URL is set.
#[tokio::test]
async fn crud_round_trip_against_postgres() {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await.unwrap();
    let schema = format!("autoapi_it_{}", uuid::Uuid::new_v4().simple());
    sqlx::query(&format!("CREATE SCHEMA {}", schema)).execute(&pool).await.unwrap();
    sqlx::query(&format!(
        "CREATE TABLE {}.users (id serial PRIMARY KEY, name text NOT NULL, email text UNIQUE)",
        schema
    ))
    .execute(&pool)
    .await
    .unwrap();

    let (catalog, routes) = load(&pool, &schema).await.unwrap();
    let app = app_router(AppState::new(pool.clone(), catalog, routes), Arc::new(AuthGate::open()), "/api");

    let (status, body) = send_json(app.clone(), request(Method::POST, "/api/users", Some(json!({"name": "Ada"})))).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_i64().unwrap();

    let (status, body) = send_json(app.clone(), request(Method::GET, &format!("/api/users/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);
    assert_eq!(body["data"]["name"], "Ada");
    assert_eq!(body["data"]["email"], Value::Null);

    let (status, _) = send_json(app.clone(), request(Method::POST, "/api/users", Some(json!({})))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send_json(
        app.clone(),
        request(Method::POST, "/api/users", Some(json!({"name": "Bob", "email": "bob@example.com"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send_json(
        app.clone(),
        request(Method::POST, "/api/users", Some(json!({"name": "Cy", "email": "bob@example.com"}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send_json(app.clone(), request(Method::GET, "/api/users?name=Ada", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["count"], 1);
    assert_eq!(body["data"][0]["id"], id);

    let (status, body) = send_json(
        app.clone(),
        request(Method::PATCH, &format!("/api/users/{}", id), Some(json!({"email": "ada@example.com"}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["email"], "ada@example.com");
    assert_eq!(body["data"]["name"], "Ada");

    let (status, _) = send_json(app.clone(), request(Method::DELETE, &format!("/api/users/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(app.clone(), request(Method::DELETE, &format!("/api/users/{}", id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send_json(app.clone(), request(Method::GET, &format!("/api/users/{}", id), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    sqlx::query(&format!("DROP SCHEMA {} CASCADE", schema)).execute(&pool).await.unwrap();
}
