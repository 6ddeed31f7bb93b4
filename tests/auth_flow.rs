// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! End-to-end authentication through the HTTP router.

use std::collections::HashMap;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    routing::get,
    Router,
};
use digidex_app_service::{
    api::router,
    config::AppConfig,
    server::build_state,
    state::AppState,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;

const PRIVATE_PEM: &str = include_str!("fixtures/id_service_private.pem");
const PUBLIC_PEM: &str = include_str!("fixtures/id_service_public.pem");
const OTHER_PRIVATE_PEM: &str = include_str!("fixtures/other_private.pem");
const JWKS: &str = include_str!("fixtures/jwks.json");

const ISSUER: &str = "https://id.digidex.example";
const FRONTEND: &str = "https://app.digidex.example";

fn config(extra: &[(&str, String)]) -> AppConfig {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("ID_SERVICE_ISSUER".to_string(), ISSUER.to_string()),
        ("CORS_ALLOWED_ORIGINS".to_string(), FRONTEND.to_string()),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.clone());
    }
    AppConfig::from_lookup(|name| vars.get(name).cloned()).expect("valid config")
}

fn static_key_config() -> AppConfig {
    config(&[("ID_SERVICE_PUBLIC_KEY", PUBLIC_PEM.to_string())])
}

fn app_for(config: &AppConfig) -> (Router, AppState) {
    let state = build_state(config).expect("state");
    (router(state.clone(), &config.cors), state)
}

fn token_with(pem: &str, kid: Option<&str>, claims: Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();
    encode(&header, &claims, &key).unwrap()
}

fn claims(sub: &str) -> Value {
    json!({
        "sub": sub,
        "iss": ISSUER,
        "exp": chrono::Utc::now().timestamp() + 300,
        "username": format!("user-{sub}"),
        "email": format!("{sub}@example.com"),
    })
}

fn token(sub: &str) -> String {
    token_with(PRIVATE_PEM, None, claims(sub))
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn me_creates_user_on_first_request() {
    let (app, state) = app_for(&static_key_config());

    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token("42")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["external_id"], "42");
    assert_eq!(body["user"]["username"], "user-42");
    assert_eq!(body["user"]["email"], "42@example.com");
    assert_eq!(body["user"]["role"], "user");
    assert_eq!(state.users().count().unwrap(), 1);

    let (status, again) = send(&app, Method::GET, "/v1/users/me", Some(&token("42")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["user"]["id"], body["user"]["id"]);
    assert_eq!(state.users().count().unwrap(), 1);
}

#[tokio::test]
async fn me_without_token_is_401() {
    let (app, _) = app_for(&static_key_config());
    let (status, body) = send(&app, Method::GET, "/v1/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "missing_auth_header");
}

#[tokio::test]
async fn forged_token_is_401() {
    let (app, state) = app_for(&static_key_config());
    let forged = token_with(OTHER_PRIVATE_PEM, None, claims("42"));

    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "invalid_signature");
    assert_eq!(state.users().count().unwrap(), 0);
}

#[tokio::test]
async fn wrong_issuer_is_401() {
    let (app, _) = app_for(&static_key_config());
    let mut c = claims("42");
    c["iss"] = json!("https://someone-else.example");

    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token_with(PRIVATE_PEM, None, c)), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "invalid_issuer");
}

#[tokio::test]
async fn expired_token_is_401() {
    let (app, _) = app_for(&static_key_config());
    let mut c = claims("42");
    c["exp"] = json!(chrono::Utc::now().timestamp() - 3600);

    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token_with(PRIVATE_PEM, None, c)), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "token_expired");
}

#[tokio::test]
async fn staff_lookup_and_admin_deactivation() {
    let (app, _) = app_for(&static_key_config());

    let (_, user) = send(&app, Method::GET, "/v1/users/me", Some(&token("42")), None).await;
    let user_id = user["user"]["id"].as_str().unwrap().to_string();

    // Regular users cannot look up others.
    let (status, _) = send(&app, Method::GET, &format!("/v1/users/{user_id}"), Some(&token("43")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let mut staff = claims("staff");
    staff["is_staff"] = json!(true);
    let staff_token = token_with(PRIVATE_PEM, None, staff);
    let (status, body) = send(&app, Method::GET, &format!("/v1/users/{user_id}"), Some(&staff_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["external_id"], "42");

    // Activation is admin only.
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/v1/users/{user_id}/active"),
        Some(&staff_token),
        Some(json!({"is_active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "insufficient_permissions");

    let mut admin = claims("admin");
    admin["roles"] = json!(["admin"]);
    let admin_token = token_with(PRIVATE_PEM, None, admin);
    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/v1/users/{user_id}/active"),
        Some(&admin_token),
        Some(json!({"is_active": false})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    // A valid ID service token no longer gets the deactivated user in.
    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token("42")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error_code"], "inactive_user");
}

#[tokio::test]
async fn health_is_public() {
    let (app, _) = app_for(&static_key_config());
    let (status, body) = send(&app, Method::GET, "/health/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["keys"], "ok");
}

#[tokio::test]
async fn cors_preflight_for_frontend() {
    let (app, _) = app_for(&static_key_config());
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/v1/users/me")
        .header(header::ORIGIN, FRONTEND)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], FRONTEND);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn users_persist_in_redb_across_restarts() {
    let dir = tempfile::TempDir::new().unwrap();
    let db_path = dir.path().join("users.redb").display().to_string();
    let config = config(&[
        ("ID_SERVICE_PUBLIC_KEY", PUBLIC_PEM.to_string()),
        ("USER_DB_PATH", db_path),
    ]);

    let first_id = {
        let (app, _) = app_for(&config);
        let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token("42")), None).await;
        assert_eq!(status, StatusCode::OK);
        body["user"]["id"].clone()
    };

    let (app, _) = app_for(&config);
    let (_, body) = send(&app, Method::GET, "/v1/users/me", Some(&token("42")), None).await;
    assert_eq!(body["user"]["id"], first_id);
}

/// Serve the fixture JWKS on an ephemeral port.
async fn jwks_server() -> String {
    let app = Router::new().route(
        "/.well-known/jwks.json",
        get(|| async { ([(header::CONTENT_TYPE, "application/json")], JWKS) }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/.well-known/jwks.json")
}

#[tokio::test]
async fn jwks_backed_verification() {
    let url = jwks_server().await;
    let (app, _) = app_for(&config(&[("ID_SERVICE_JWKS_URL", url)]));

    let with_kid = token_with(PRIVATE_PEM, Some("id-service-1"), claims("42"));
    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&with_kid), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["external_id"], "42");

    let unknown_kid = token_with(PRIVATE_PEM, Some("unknown"), claims("42"));
    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&unknown_kid), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "no_matching_key");
}

#[tokio::test]
async fn unreachable_jwks_reports_unready() {
    let (app, _) = app_for(&config(&[(
        "ID_SERVICE_JWKS_URL",
        "http://127.0.0.1:9/.well-known/jwks.json".to_string(),
    )]));

    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["checks"]["keys"], "unavailable");

    let (status, body) = send(&app, Method::GET, "/v1/users/me", Some(&token("42")), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error_code"], "jwks_fetch_error");
}
