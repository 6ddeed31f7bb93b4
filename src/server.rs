// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! Wiring: configuration → application state → running server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::{tls_rustls::RustlsConfig, Handle};
use tracing::{info, warn};

use crate::api::router;
use crate::auth::{JwksManager, JwtAuthBackend, JwtVerifier, KeyProvider};
use crate::config::{AppConfig, AuthSettings, ConfigError, KeySource, TlsSettings};
use crate::state::AppState;
use crate::users::{InMemoryUserStore, RedbUserStore, UserStore};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Build the key provider for the configured source.
pub fn build_key_provider(settings: &AuthSettings) -> Result<KeyProvider, ConfigError> {
    match &settings.key_source {
        KeySource::JwksUrl(url) => Ok(KeyProvider::Jwks(
            JwksManager::new(url.clone())?.with_cache_ttl(settings.jwks_cache_ttl),
        )),
        #[cfg(feature = "dev")]
        KeySource::Unverified => Ok(KeyProvider::Unverified),
        source => {
            let pem = source.load_pem()?.unwrap_or_default();
            Ok(KeyProvider::from_rsa_pem(pem.as_bytes())?)
        }
    }
}

/// Build the verifier from auth settings.
pub fn build_verifier(settings: &AuthSettings) -> Result<JwtVerifier, ConfigError> {
    let mut verifier = JwtVerifier::new(build_key_provider(settings)?).with_leeway(settings.leeway);
    if let Some(issuer) = &settings.issuer {
        verifier = verifier.with_issuer(issuer.clone());
    }
    if let Some(audience) = &settings.audience {
        verifier = verifier.with_audience(audience.clone());
    }
    Ok(verifier)
}

/// Open the configured user store.
pub fn build_user_store(config: &AppConfig) -> Result<Arc<dyn UserStore>, ConfigError> {
    match &config.user_db_path {
        Some(path) => Ok(Arc::new(RedbUserStore::open(path)?)),
        None => Ok(Arc::new(InMemoryUserStore::new())),
    }
}

/// Build application state from configuration.
pub fn build_state(config: &AppConfig) -> Result<AppState, ConfigError> {
    let verifier = build_verifier(&config.auth)?;
    let users = build_user_store(config)?;

    info!(
        keys = verifier.keys().kind(),
        users = users.kind(),
        issuer = config.auth.issuer.as_deref().unwrap_or("<any>"),
        audience = config.auth.audience.as_deref().unwrap_or("<any>"),
        "Authentication configured"
    );

    Ok(AppState::new(JwtAuthBackend::new(verifier, users)))
}

/// Run the server until SIGINT/SIGTERM.
pub async fn serve(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = build_state(&config)?;

    // Warm the JWKS cache; failure is not fatal, the health check reports it.
    if let KeyProvider::Jwks(jwks) = state.auth.verifier().keys() {
        if let Err(e) = jwks.refresh().await {
            warn!(error = %e, url = jwks.jwks_url(), "Initial JWKS fetch failed");
        }
    }

    let app = router(state, &config.cors);
    let handle: Handle<SocketAddr> = Handle::new();
    tokio::spawn(shutdown_on_signal(handle.clone()));

    run_server(app, config.bind_addr, config.tls.as_ref(), handle).await?;

    info!("Server stopped");
    Ok(())
}

/// Serve `app` over HTTP, or HTTPS when TLS is configured, until `handle` shuts it down.
pub async fn run_server(
    app: Router,
    addr: SocketAddr,
    tls: Option<&TlsSettings>,
    handle: Handle<SocketAddr>,
) -> io::Result<()> {
    match tls {
        Some(tls) => {
            // Install the ring crypto provider for rustls (must be done before any TLS operations)
            let _ = rustls::crypto::ring::default_provider().install_default();
            let tls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path).await?;

            info!("DigiDex App service listening on https://{addr} (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
        None => {
            info!("DigiDex App service listening on http://{addr} (docs at /docs)");
            axum_server::bind(addr)
                .handle(handle)
                .serve(app.into_make_service())
                .await
        }
    }
}

async fn shutdown_on_signal(handle: Handle<SocketAddr>) {
    if let Err(e) = wait_for_signal().await {
        warn!(error = %e, "Cannot listen for shutdown signals");
        return;
    }
    info!("Shutdown signal received, draining connections");
    handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
}

#[cfg(unix)]
async fn wait_for_signal() -> io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
