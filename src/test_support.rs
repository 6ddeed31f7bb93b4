// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

use crate::auth::{JwtAuthBackend, JwtVerifier, KeyProvider};
use crate::state::AppState;
use crate::users::InMemoryUserStore;

pub const PRIVATE_PEM: &str = include_str!("../tests/fixtures/id_service_private.pem");
pub const PUBLIC_PEM: &str = include_str!("../tests/fixtures/id_service_public.pem");

/// Sign claims with the fixture ID service key.
pub fn sign(claims: serde_json::Value) -> String {
    let key = EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap();
    encode(&Header::new(Algorithm::RS256), &claims, &key).unwrap()
}

/// State trusting the fixture key, with an in-memory user store.
pub fn test_state() -> AppState {
    let keys = KeyProvider::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap();
    AppState::new(JwtAuthBackend::new(
        JwtVerifier::new(keys),
        Arc::new(InMemoryUserStore::new()),
    ))
}

pub const OTHER_PRIVATE_PEM: &str = include_str!("../tests/fixtures/other_private.pem");
pub const JWKS: &str = include_str!("../tests/fixtures/jwks.json");
/// `JWKS` plus `id-service-2`, the key of `OTHER_PRIVATE_PEM`.
pub const ROTATED_JWKS: &str = include_str!("../tests/fixtures/jwks_rotated.json");

/// Local stand-in for the ID service JWKS endpoint.
///
/// Counts fetches. Serves whatever body is set, or 502 when there is none.
#[derive(Clone)]
pub struct FakeIdService {
    hits: Arc<AtomicUsize>,
    body: Arc<Mutex<Option<&'static str>>>,
}

impl FakeIdService {
    /// Start serving `JWKS` on an ephemeral port.
    pub async fn start() -> (Self, String) {
        let service = Self {
            hits: Arc::new(AtomicUsize::new(0)),
            body: Arc::new(Mutex::new(Some(JWKS))),
        };
        let app = Router::new()
            .route("/.well-known/jwks.json", get(serve_jwks))
            .with_state(service.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (service, format!("http://{addr}/.well-known/jwks.json"))
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn respond_with(&self, body: &'static str) {
        *self.body.lock().unwrap() = Some(body);
    }

    pub fn go_down(&self) {
        *self.body.lock().unwrap() = None;
    }
}

async fn serve_jwks(State(service): State<FakeIdService>) -> Response {
    service.hits.fetch_add(1, Ordering::SeqCst);
    let body = *service.body.lock().unwrap();
    match body {
        Some(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        None => StatusCode::BAD_GATEWAY.into_response(),
    }
}
