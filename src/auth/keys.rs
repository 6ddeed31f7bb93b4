// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! Verification key sources.

use jsonwebtoken::DecodingKey;
use tracing::warn;

use super::error::AuthError;
use super::jwks::JwksManager;

/// Where RS256 verification keys come from.
#[derive(Clone)]
pub enum KeyProvider {
    /// A single ID service public key, loaded at startup.
    Static(DecodingKey),
    /// Keys published by the ID service as a JWKS document.
    Jwks(JwksManager),
    /// Decode without signature checks.
    ///
    /// WARNING: development only.
    #[cfg(feature = "dev")]
    Unverified,
}

impl KeyProvider {
    /// Parse a PEM encoded RSA public key (`PUBLIC KEY` or `RSA PUBLIC KEY`).
    pub fn from_rsa_pem(pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        Ok(KeyProvider::Static(DecodingKey::from_rsa_pem(pem)?))
    }

    /// Resolve the key for a token header's `kid`.
    ///
    /// A static key ignores the kid.
    pub async fn resolve(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        match self {
            KeyProvider::Static(key) => Ok(key.clone()),
            KeyProvider::Jwks(jwks) => match kid {
                Some(kid) => jwks.get_decoding_key(kid).await,
                None => jwks.get_any_decoding_key().await,
            },
            #[cfg(feature = "dev")]
            KeyProvider::Unverified => Err(AuthError::InternalError(
                "unverified key provider has no keys".to_string(),
            )),
        }
    }

    /// Readiness of the key source, for health checks.
    pub async fn status(&self) -> KeyStatus {
        match self {
            KeyProvider::Static(_) => KeyStatus::Ok,
            // Same cache and back-off as verification, so probes never hammer the ID service.
            KeyProvider::Jwks(jwks) => match jwks.get_any_decoding_key().await {
                Ok(_) => KeyStatus::Ok,
                Err(e) => {
                    warn!(error = %e, "JWKS unavailable");
                    KeyStatus::Unavailable
                }
            },
            #[cfg(feature = "dev")]
            KeyProvider::Unverified => KeyStatus::Insecure,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            KeyProvider::Static(_) => "static",
            KeyProvider::Jwks(_) => "jwks",
            #[cfg(feature = "dev")]
            KeyProvider::Unverified => "unverified",
        }
    }
}

/// Key source health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Ok,
    Unavailable,
    #[cfg(feature = "dev")]
    Insecure,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyStatus::Ok => "ok",
            KeyStatus::Unavailable => "unavailable",
            #[cfg(feature = "dev")]
            KeyStatus::Insecure => "insecure",
        }
    }

    pub fn is_ready(&self) -> bool {
        *self != KeyStatus::Unavailable
    }
}
