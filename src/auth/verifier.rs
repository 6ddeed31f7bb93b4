// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! RS256 token verification against the ID service keys.

use std::collections::HashSet;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::debug;

use super::claims::IdServiceClaims;
use super::error::AuthError;
use super::keys::KeyProvider;

/// Default clock skew tolerance (60 seconds).
pub const DEFAULT_LEEWAY: u64 = 60;

/// The only signature algorithm the ID service uses.
const ALGORITHM: Algorithm = Algorithm::RS256;

/// Verifies ID service tokens.
#[derive(Clone)]
pub struct JwtVerifier {
    keys: KeyProvider,
    issuer: Option<String>,
    audience: Option<String>,
    leeway: u64,
}

impl JwtVerifier {
    pub fn new(keys: KeyProvider) -> Self {
        Self {
            keys,
            issuer: None,
            audience: None,
            leeway: DEFAULT_LEEWAY,
        }
    }

    /// Require this `iss` value.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Require this value in `aud`.
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn keys(&self) -> &KeyProvider {
        &self.keys
    }

    /// Verify a compact JWT and return its claims.
    pub async fn verify(&self, token: &str) -> Result<IdServiceClaims, AuthError> {
        let header = decode_header(token).map_err(|_| AuthError::MalformedToken)?;

        if header.alg != ALGORITHM {
            debug!(alg = ?header.alg, "Rejecting token with unsupported algorithm");
            return Err(AuthError::UnsupportedAlgorithm);
        }

        #[cfg(feature = "dev")]
        if matches!(self.keys, KeyProvider::Unverified) {
            return self.verify_unverified(token);
        }

        let decoding_key = self.keys.resolve(header.kid.as_deref()).await?;

        let token_data = decode::<IdServiceClaims>(token, &decoding_key, &self.validation())
            .map_err(|e| map_jwt_error(e.kind()))?;

        Ok(token_data.claims)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = self.leeway;
        validation.validate_nbf = true;

        let mut required: HashSet<&str> = HashSet::from(["exp"]);

        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
            required.insert("iss");
        }

        if let Some(ref audience) = self.audience {
            validation.set_audience(&[audience]);
            required.insert("aud");
        } else {
            validation.validate_aud = false;
        }

        validation.set_required_spec_claims(&required.into_iter().collect::<Vec<_>>());
        validation
    }

    /// Development decode: no signature check, expiry still enforced.
    #[cfg(feature = "dev")]
    fn verify_unverified(&self, token: &str) -> Result<IdServiceClaims, AuthError> {
        let token_data = jsonwebtoken::dangerous::insecure_decode::<IdServiceClaims>(token)
            .map_err(|_| AuthError::MalformedToken)?;

        let now = chrono::Utc::now().timestamp();
        if token_data.claims.exp < now - self.leeway as i64 {
            return Err(AuthError::TokenExpired);
        }

        Ok(token_data.claims)
    }
}

fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::ImmatureSignature => AuthError::TokenNotYetValid,
        ErrorKind::InvalidAlgorithm => AuthError::UnsupportedAlgorithm,
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "iss" => AuthError::InvalidIssuer,
            "aud" => AuthError::InvalidAudience,
            _ => AuthError::MalformedToken,
        },
        _ => AuthError::MalformedToken,
    }
}
