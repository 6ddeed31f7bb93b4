// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! Bearer token authentication backend.
//!
//! Turns an `Authorization: Bearer <jwt>` header into an `AuthenticatedUser`:
//! verify the token, map its subject to a local user (creating one on first
//! sight), and refuse deactivated users.

use std::sync::Arc;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use tracing::{debug, error, info};

use super::claims::AuthenticatedUser;
use super::error::AuthError;
use super::verifier::JwtVerifier;
use crate::users::UserStore;

/// Authentication backend shared by the middleware and extractors.
#[derive(Clone)]
pub struct JwtAuthBackend {
    verifier: JwtVerifier,
    users: Arc<dyn UserStore>,
}

impl JwtAuthBackend {
    pub fn new(verifier: JwtVerifier, users: Arc<dyn UserStore>) -> Self {
        Self { verifier, users }
    }

    pub fn verifier(&self) -> &JwtVerifier {
        &self.verifier
    }

    pub fn users(&self) -> &Arc<dyn UserStore> {
        &self.users
    }

    /// Authenticate a request from its headers.
    ///
    /// Returns `Ok(None)` when no credentials were presented.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<AuthenticatedUser>, AuthError> {
        let Some(value) = headers.get(AUTHORIZATION) else {
            return Ok(None);
        };

        let value = value.to_str().map_err(|_| AuthError::InvalidAuthHeader)?;
        let token = bearer_token(value)?;

        self.authenticate_token(token).await.map(Some)
    }

    /// Authenticate a raw JWT.
    pub async fn authenticate_token(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.verifier.verify(token).await.inspect_err(|e| {
            debug!(error_code = e.error_code(), "Token rejected");
        })?;

        let external_id = claims.subject().ok_or(AuthError::MissingSubject)?;
        let profile = claims.to_profile(external_id);

        let user = self.users.find_or_create(&profile).map_err(|e| {
            error!(error = %e, store = self.users.kind(), "User lookup failed");
            AuthError::InternalError("user lookup failed".to_string())
        })?;

        if !user.is_active {
            info!(user_id = %user.id, external_id = %user.external_id, "Inactive user refused");
            return Err(AuthError::InactiveUser);
        }

        debug!(user_id = %user.id, role = %user.role, "Authenticated");
        Ok(AuthenticatedUser::new(&user, &claims))
    }
}

/// Extract the token from a `Bearer` authorization value.
///
/// The scheme is case-insensitive; surrounding whitespace is ignored.
pub fn bearer_token(value: &str) -> Result<&str, AuthError> {
    let mut parts = value.trim().splitn(2, char::is_whitespace);
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().map(str::trim).unwrap_or_default();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok(token)
}
