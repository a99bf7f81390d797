use super::middleware::{auth_middleware, AuthInfo};
use super::{app_router, AppState};
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use chrono::Duration;
use elewa_core::{AuthConfig, ManualClock, TokenClaims, UserManager};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

fn test_state(dir: &TempDir) -> (AppState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let config = AuthConfig::new("api-test-signing-secret")
        .with_ttl(3600, 24 * 3600)
        .with_bcrypt_cost(4);
    let users = UserManager::new(dir.path(), config).with_clock(clock.clone());
    users.ensure_dirs().unwrap();
    (
        AppState {
            users: Arc::new(users),
        },
        clock,
    )
}

fn app(state: AppState) -> Router {
    app_router(state, Vec::new())
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn authed(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn signup_body(email: &str, phone: &str) -> Value {
    json!({
        "first_name": "Ada",
        "last_name": "Lovelace",
        "email": email,
        "phone": phone,
        "password": "analytical-engine",
    })
}

async fn signup(app: &Router, email: &str, phone: &str) -> Value {
    let response = app
        .clone()
        .oneshot(json_request("POST", "/users/signup", signup_body(email, phone)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

/// 受保护的计数路由：记录调用次数与看到的 claims
fn guarded_router(state: AppState) -> (Router, Arc<AtomicUsize>, Arc<Mutex<Option<TokenClaims>>>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(None));
    let handler = {
        let calls = calls.clone();
        let seen = seen.clone();
        move |auth: AuthInfo| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            *seen.lock().unwrap() = Some(auth.claims);
            "ok"
        }
    };
    let router = Router::new()
        .route("/guarded", get(handler))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state);
    (router, calls, seen)
}

#[tokio::test]
async fn health_ok_without_auth() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let response = app(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn signup_then_login_returns_tokens_without_password() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = app(state);

    let registered = signup(&app, "ada@example.com", "+254700000001").await;
    assert!(registered["user_id"].is_string());
    assert!(registered["access_token"].is_string());
    assert!(registered["refresh_token"].is_string());
    assert!(registered.get("password").is_none());
    assert!(registered.get("password_hash").is_none());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users/login",
            json!({ "email": "ada@example.com", "password": "analytical-engine" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["user"]["user_id"], registered["user_id"]);
    assert_eq!(session["user"]["email"], "ada@example.com");
    assert!(session["user"].get("password_hash").is_none());
    assert_eq!(session["token_type"], "Bearer");

    let token = session["access_token"].as_str().unwrap();
    let response = app.clone().oneshot(authed("/users/me", token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let me = body_json(response).await;
    assert_eq!(me["user_id"], registered["user_id"]);
}

#[tokio::test]
async fn signup_validation_lists_offending_fields() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let response = app(state)
        .oneshot(json_request(
            "POST",
            "/users/signup",
            json!({
                "first_name": "",
                "last_name": "Lovelace",
                "email": "nope",
                "phone": "+254700000001",
                "password": "analytical-engine",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "ValidationError");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["first_name", "email"]);
}

#[tokio::test]
async fn malformed_json_is_a_structured_bad_request() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let response = app(state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/users/login")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "ValidationError");
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = app(state);
    signup(&app, "ada@example.com", "+254700000001").await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users/signup",
            signup_body("ada@example.com", "+254700000002"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "DuplicateCredential");
}

#[tokio::test]
async fn login_failures_are_indistinguishable() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = app(state);
    signup(&app, "ada@example.com", "+254700000001").await;

    let mut bodies = Vec::new();
    for (email, password) in [
        ("ada@example.com", "wrong-password"),
        ("nobody@example.com", "analytical-engine"),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/users/login",
                json!({ "email": email, "password": password }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        bodies.push(body_json(response).await);
    }
    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(bodies[0]["code"], "InvalidCredentials");
}

#[tokio::test]
async fn missing_token_never_reaches_handler() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let (router, calls, _) = guarded_router(state);

    let response = router
        .oneshot(Request::builder().uri("/guarded").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "MissingToken");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (state, clock) = test_state(&dir);
    let registered = signup(&app(state.clone()), "ada@example.com", "+254700000001").await;
    let token = registered["access_token"].as_str().unwrap().to_string();
    let (router, calls, _) = guarded_router(state);

    clock.advance(Duration::seconds(3601));
    let response = router.oneshot(authed("/guarded", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "ExpiredToken");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn forged_and_refresh_tokens_are_rejected() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let registered = signup(&app(state.clone()), "ada@example.com", "+254700000001").await;
    let (router, calls, _) = guarded_router(state);

    let access = registered["access_token"].as_str().unwrap();
    let (head, sig) = access.rsplit_once('.').unwrap();
    let first = if sig.starts_with('A') { 'B' } else { 'A' };
    let forged = format!("{}.{}{}", head, first, &sig[1..]);

    let response = router.clone().oneshot(authed("/guarded", &forged)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "InvalidSignature");

    let response = router
        .clone()
        .oneshot(authed("/guarded", "garbage"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["code"], "MalformedToken");

    let refresh = registered["refresh_token"].as_str().unwrap();
    let response = router.oneshot(authed("/guarded", refresh)).await.unwrap();
    assert_eq!(body_json(response).await["code"], "WrongTokenType");

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn valid_token_is_admitted_with_claims() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let registered = signup(&app(state.clone()), "ada@example.com", "+254700000001").await;
    let (router, calls, seen) = guarded_router(state);

    let token = registered["access_token"].as_str().unwrap();
    let request = Request::builder()
        .uri("/guarded")
        .header("token", token)
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let claims = seen.lock().unwrap().clone().unwrap();
    assert_eq!(claims.sub, registered["user_id"].as_str().unwrap());
    assert_eq!(claims.email.as_deref(), Some("ada@example.com"));
    assert_eq!(claims.first_name.as_deref(), Some("Ada"));
    assert_eq!(claims.last_name.as_deref(), Some("Lovelace"));
}

#[tokio::test]
async fn refresh_endpoint_rotates_pair() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = app(state);
    let registered = signup(&app, "ada@example.com", "+254700000001").await;
    let refresh_token = registered["refresh_token"].clone();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users/refresh",
            json!({ "refresh_token": refresh_token.clone() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_ne!(session["refresh_token"], refresh_token);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/users/refresh",
            json!({ "refresh_token": refresh_token.clone() }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "SupersededToken");
}

#[tokio::test]
async fn update_profile_and_missing_user() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = app(state);
    let registered = signup(&app, "ada@example.com", "+254700000001").await;
    let token = registered["access_token"].as_str().unwrap();
    let user_id = registered["user_id"].as_str().unwrap();

    let patch = |uri: String, body: Value| {
        Request::builder()
            .method("PATCH")
            .uri(uri)
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(patch(
            format!("/users/{}", user_id),
            json!({ "first_name": "Augusta" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["first_name"], "Augusta");

    // 只允许白名单字段
    let response = app
        .clone()
        .oneshot(patch(
            format!("/users/{}", user_id),
            json!({ "email": "other@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(patch(
            "/users/no-such-user".to_string(),
            json!({ "first_name": "Grace" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "UserNotFound");
}

#[tokio::test]
async fn list_users_requires_token() {
    let dir = TempDir::new().unwrap();
    let (state, _) = test_state(&dir);
    let app = app(state);
    let registered = signup(&app, "ada@example.com", "+254700000001").await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/users").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = registered["access_token"].as_str().unwrap();
    let response = app.oneshot(authed("/users", token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let users = body_json(response).await;
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert!(users[0].get("password_hash").is_none());
    assert!(users[0].get("refresh_token").is_none());
}
