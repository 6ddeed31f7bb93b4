// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! Cross-origin allow-listing for the frontend.
//!
//! Origins are matched exactly after normalisation (`scheme://host[:port]`,
//! lowercase host, default ports dropped). Credentials are only ever allowed
//! together with an explicit origin list.

use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use url::Url;

use crate::config::ConfigError;

/// Default preflight cache duration.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Which origins may call the API from a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// `*`: any origin, never with credentials
    Any,
    /// Exact origins; empty means same-origin only
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub origins: AllowedOrigins,
    pub allow_credentials: bool,
    pub max_age: Duration,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origins: AllowedOrigins::List(Vec::new()),
            allow_credentials: true,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

/// Parse a comma-separated origin list.
pub fn parse_origins(raw: &str) -> Result<AllowedOrigins, ConfigError> {
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if entries.contains(&"*") {
        if entries.len() > 1 {
            return Err(ConfigError::InvalidOrigin {
                origin: raw.to_string(),
                reason: "'*' cannot be combined with explicit origins".to_string(),
            });
        }
        return Ok(AllowedOrigins::Any);
    }

    let mut origins = Vec::with_capacity(entries.len());
    for entry in entries {
        let origin = normalize_origin(entry)?;
        if !origins.contains(&origin) {
            origins.push(origin);
        }
    }

    Ok(AllowedOrigins::List(origins))
}

fn normalize_origin(entry: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidOrigin {
        origin: entry.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(entry.trim_end_matches('/')).map_err(|e| invalid(&e.to_string()))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("origin must not have a path, query or fragment"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(invalid("origin must not carry credentials"));
    }

    Ok(url.origin().ascii_serialization())
}

/// Build the tower-http CORS layer.
pub fn cors_layer(settings: &CorsSettings) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .max_age(settings.max_age);

    match &settings.origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(origins) => {
            let values: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect();
            layer
                .allow_origin(AllowOrigin::list(values))
                .allow_credentials(settings.allow_credentials)
        }
    }
}
