//! HTTP-level auth-path tests driven in-process with `tower::oneshot`.
//!
//! These exercise routing, middleware layering, and status-code mapping
//! without a live database: the pool is lazy and every asserted path
//! rejects before touching it.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tower::util::ServiceExt;
use uuid::Uuid;

use surgemart::admission::AdmissionService;
use surgemart::auth::{AuthService, Claims};
use surgemart::cache::{SaleStatusCache, StatusCache};
use surgemart::config::AppConfig;
use surgemart::gateway::{build_router, state::AppState};
use surgemart::projection::{SaleAdmin, SaleProjection};
use surgemart::queue::{RetryPolicy, memory::MemoryQueue};
use surgemart::stats::StatsService;
use surgemart::store;

const JWT_SECRET: &str = "test-secret-key-for-gateway-tests";

fn test_config() -> AppConfig {
    let get = |key: &str| -> Option<String> {
        match key {
            "DATABASE_URL" => Some("postgres://127.0.0.1:1/unreachable".to_string()),
            "JWT_SECRET" => Some(JWT_SECRET.to_string()),
            "QUEUE_BACKEND" => Some("memory".to_string()),
            _ => None,
        }
    };
    AppConfig::from_lookup(&get).unwrap()
}

fn build_app() -> Router {
    let config = test_config();
    let pool = store::connect_lazy(&config.database).unwrap();

    let status_cache = Arc::new(StatusCache::new(Duration::from_secs(60)));
    let sale_cache = Arc::new(SaleStatusCache::new(10));
    let queue = Arc::new(MemoryQueue::new(RetryPolicy::from_config(&config.queue)));
    let projection = Arc::new(SaleProjection::new(pool.clone(), Arc::clone(&sale_cache)));
    let sale_admin = Arc::new(SaleAdmin::new(pool.clone(), Arc::clone(&sale_cache)));
    let stats = Arc::new(StatsService::new(pool.clone()));
    let admission = Arc::new(AdmissionService::new(
        queue.clone(),
        Arc::clone(&status_cache),
        Arc::clone(&projection),
        &config.admission,
    ));
    let auth = Arc::new(AuthService::new(pool.clone(), &config.auth));

    build_router(Arc::new(AppState::new(
        pool,
        queue,
        status_cache,
        sale_cache,
        projection,
        sale_admin,
        stats,
        admission,
        auth,
    )))
}

fn mint_token(role: &str) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: Uuid::new_v4().to_string(),
        email: format!("{role}@example.com"),
        role: role.to_string(),
        exp: (now + 3600) as usize,
        iat: now as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

fn get(path: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_json(path: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn liveness_is_open() {
    let app = build_app();
    let response = app.oneshot(get("/health/live", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn purchase_requires_a_token() {
    let app = build_app();
    let response = app
        .oneshot(post_json("/purchase", None, serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_bearer_token_is_unauthorized() {
    let app = build_app();
    let response = app
        .oneshot(get("/purchase/status", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_refuse_regular_users() {
    let app = build_app();
    let token = mint_token("user");
    let response = app
        .oneshot(get(
            &format!("/admin/flash-sale/{}", Uuid::new_v4()),
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_bad_sale_id_is_a_400() {
    let app = build_app();
    let token = mint_token("admin");
    let response = app
        .oneshot(get("/admin/flash-sale/not-a-uuid", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_without_token_are_unauthorized() {
    let app = build_app();
    let response = app
        .oneshot(post_json("/admin/flash-sale", None, serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn job_lookup_with_bad_id_is_a_404() {
    let app = build_app();
    let token = mint_token("user");
    let response = app
        .oneshot(get("/purchase/job/not-a-uuid", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn verify_round_trips_a_minted_token() {
    let app = build_app();
    let token = mint_token("user");
    let response = app
        .oneshot(post_json(
            "/auth/verify",
            None,
            serde_json::json!({ "token": token }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["valid"], true);
    assert_eq!(body["userType"], "user");
}

#[tokio::test]
async fn verify_rejects_garbage_tokens() {
    let app = build_app();
    let response = app
        .oneshot(post_json(
            "/auth/verify",
            None,
            serde_json::json!({ "token": "garbage" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_with_invalid_email_is_a_400() {
    let app = build_app();
    let response = app
        .oneshot(post_json(
            "/auth/login",
            None,
            serde_json::json!({ "email": "not-an-email" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_login_with_wrong_email_is_forbidden() {
    let app = build_app();
    // Email validation passes, the admin check fails before any DB access.
    let response = app
        .oneshot(post_json(
            "/auth/login",
            None,
            serde_json::json!({ "email": "shopper@example.com", "userType": "admin" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
