// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! - Keys are cached with a configurable TTL
//! - Stale cache is used on fetch failure (fail-open for availability)
//! - After a failed fetch, no new fetch is attempted until the retry interval passes
//! - Only one fetch is in flight at a time; concurrent callers wait for its result
//! - An unknown `kid` triggers one early refresh so rotated keys are picked up
//! - Only RSA keys are usable; everything else in the set is ignored

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm};
use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use super::error::AuthError;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default minimum spacing between refreshes caused by unknown key ids.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Default back-off after a failed fetch.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    /// Last failed fetch, cleared by the next successful one.
    failed_at: Option<Instant>,
}

impl CacheState {
    fn backing_off(&self, retry_interval: Duration) -> bool {
        self.failed_at
            .is_some_and(|failed_at| failed_at.elapsed() < retry_interval)
    }

    fn last_attempt(&self) -> Option<Instant> {
        let fetched_at = self.entry.as_ref().map(|entry| entry.fetched_at);
        fetched_at.max(self.failed_at)
    }
}

/// JWKS manager with caching.
///
/// Fetches and caches the ID service key set for JWT verification.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS URL (ID service endpoint)
    jwks_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    /// Minimum spacing between unknown-kid refreshes
    min_refresh_interval: Duration,
    /// Back-off after a failed fetch
    retry_interval: Duration,
    /// Cached JWKS
    cache: Arc<RwLock<CacheState>>,
    /// Held for the duration of a fetch
    fetch_lock: Arc<Mutex<()>>,
    /// HTTP client
    client: reqwest::Client,
}

impl JwksManager {
    /// Create a new JWKS manager.
    ///
    /// # Arguments
    /// - `jwks_url`: The JWKS endpoint URL (e.g., `https://id.digidex.example/.well-known/jwks.json`)
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, reqwest::Error> {
        Ok(Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            cache: Arc::new(RwLock::new(CacheState::default())),
            fetch_lock: Arc::new(Mutex::new(())),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
        })
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Set how often an unknown `kid` may force a refresh.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Set how long to wait after a failed fetch before trying again.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Fetch JWKS (with caching).
    async fn get_jwks(&self) -> Result<JwkSet, AuthError> {
        if let Some(cached) = self.cached().await {
            return cached;
        }

        let _fetching = self.fetch_lock.lock().await;
        // Whoever held the lock before us may have settled it already.
        if let Some(cached) = self.cached().await {
            return cached;
        }

        match self.fetch_and_store().await {
            Ok(jwks) => Ok(jwks),
            Err(e) => {
                let state = self.cache.read().await;
                match &state.entry {
                    Some(entry) => {
                        warn!(error = %e, url = %self.jwks_url, "JWKS refresh failed, serving stale keys");
                        Ok(entry.jwks.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// The answer available without a fetch: fresh keys, or the stale
    /// keys (or the error) while backing off after a failure.
    async fn cached(&self) -> Option<Result<JwkSet, AuthError>> {
        let state = self.cache.read().await;
        let backing_off = state.backing_off(self.retry_interval);

        match &state.entry {
            Some(entry) if backing_off || entry.fetched_at.elapsed() < self.cache_ttl => {
                Some(Ok(entry.jwks.clone()))
            }
            Some(_) => None,
            None if backing_off => Some(Err(AuthError::JwksFetchError(
                "JWKS endpoint unavailable, waiting before retry".to_string(),
            ))),
            None => None,
        }
    }

    /// Fetch and cache. Callers hold `fetch_lock`.
    async fn fetch_and_store(&self) -> Result<JwkSet, AuthError> {
        match self.fetch_jwks().await {
            Ok(jwks) => {
                self.store(jwks.clone()).await;
                Ok(jwks)
            }
            Err(e) => {
                self.cache.write().await.failed_at = Some(Instant::now());
                Err(e)
            }
        }
    }

    async fn store(&self, jwks: JwkSet) {
        let mut state = self.cache.write().await;
        state.entry = Some(CacheEntry {
            jwks,
            fetched_at: Instant::now(),
        });
        state.failed_at = None;
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, AuthError> {
        debug!(url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::JwksFetchError(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        let jwks: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::JwksFetchError(e.to_string()))?;

        Ok(jwks)
    }

    /// Get a decoding key for the given key ID.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey, AuthError> {
        let jwks = self.get_jwks().await?;
        if let Some(key) = find_key(&jwks, kid) {
            return key;
        }

        // Unknown kid: the ID service may have rotated its keys.
        if let Some(jwks) = self.refresh_for_unknown_kid(kid).await {
            if let Some(key) = find_key(&jwks, kid) {
                return key;
            }
        }

        Err(AuthError::NoMatchingKey)
    }

    /// Get the first usable RSA key (for tokens without kid).
    pub async fn get_any_decoding_key(&self) -> Result<DecodingKey, AuthError> {
        let jwks = self.get_jwks().await?;

        jwks.keys
            .iter()
            .find_map(|jwk| jwk_to_decoding_key(jwk).ok())
            .ok_or(AuthError::NoMatchingKey)
    }

    /// Force refresh the JWKS cache.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        let _fetching = self.fetch_lock.lock().await;
        self.fetch_and_store().await.map(|_| ())
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let state = self.cache.read().await;
        state
            .entry
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }

    /// Refetch once per `min_refresh_interval`. Otherwise the current set,
    /// which may be the one a concurrent caller just fetched.
    async fn refresh_for_unknown_kid(&self, kid: &str) -> Option<JwkSet> {
        let _fetching = self.fetch_lock.lock().await;

        let due = {
            let state = self.cache.read().await;
            state
                .last_attempt()
                .is_none_or(|at| at.elapsed() >= self.min_refresh_interval)
        };
        if !due {
            let state = self.cache.read().await;
            return state.entry.as_ref().map(|entry| entry.jwks.clone());
        }

        debug!(kid, "Unknown key id, refreshing JWKS");
        match self.fetch_and_store().await {
            Ok(jwks) => Some(jwks),
            Err(e) => {
                warn!(error = %e, kid, "JWKS refresh for unknown key id failed");
                None
            }
        }
    }
}

fn find_key(jwks: &JwkSet, kid: &str) -> Option<Result<DecodingKey, AuthError>> {
    jwks.keys
        .iter()
        .find(|k| k.common.key_id.as_deref() == Some(kid))
        .map(jwk_to_decoding_key)
}

/// Convert an RSA JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, AuthError> {
    if let Some(alg) = jwk.common.key_algorithm {
        if alg != KeyAlgorithm::RS256 {
            return Err(AuthError::UnsupportedAlgorithm);
        }
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| AuthError::InternalError(format!("Failed to create RSA key: {e}"))),
        _ => Err(AuthError::UnsupportedAlgorithm),
    }
}
