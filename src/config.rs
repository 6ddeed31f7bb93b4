// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `ID_SERVICE_PUBLIC_KEY` | ID service RSA public key (PEM, `\n` escapes allowed) | one key source required |
//! | `ID_SERVICE_PUBLIC_KEY_FILE` | Path to the ID service public key PEM | one key source required |
//! | `ID_SERVICE_JWKS_URL` | ID service JWKS endpoint | one key source required |
//! | `ID_SERVICE_ISSUER` | Expected JWT issuer claim | Not checked |
//! | `ID_SERVICE_AUDIENCE` | Expected JWT audience claim | Not checked |
//! | `JWT_LEEWAY_SECONDS` | Clock skew tolerance | `60` |
//! | `JWKS_CACHE_TTL_SECONDS` | JWKS cache lifetime | `300` |
//! | `CORS_ALLOWED_ORIGINS` | Comma-separated origins, or `*` | none |
//! | `CORS_ALLOW_CREDENTIALS` | Allow cookies/authorization cross-origin | `true` |
//! | `CORS_MAX_AGE_SECONDS` | Preflight cache duration | `3600` |
//! | `USER_DB_PATH` | redb file for local users | in-memory |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key | plain HTTP |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::cors::{self, CorsSettings};

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const PUBLIC_KEY_ENV: &str = "ID_SERVICE_PUBLIC_KEY";
pub const PUBLIC_KEY_FILE_ENV: &str = "ID_SERVICE_PUBLIC_KEY_FILE";
pub const JWKS_URL_ENV: &str = "ID_SERVICE_JWKS_URL";
pub const ISSUER_ENV: &str = "ID_SERVICE_ISSUER";
pub const AUDIENCE_ENV: &str = "ID_SERVICE_AUDIENCE";
pub const LEEWAY_ENV: &str = "JWT_LEEWAY_SECONDS";
pub const JWKS_CACHE_TTL_ENV: &str = "JWKS_CACHE_TTL_SECONDS";
pub const CORS_ORIGINS_ENV: &str = "CORS_ALLOWED_ORIGINS";
pub const CORS_CREDENTIALS_ENV: &str = "CORS_ALLOW_CREDENTIALS";
pub const CORS_MAX_AGE_ENV: &str = "CORS_MAX_AGE_SECONDS";
pub const USER_DB_PATH_ENV: &str = "USER_DB_PATH";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no ID service key configured; set one of ID_SERVICE_PUBLIC_KEY, ID_SERVICE_PUBLIC_KEY_FILE, ID_SERVICE_JWKS_URL")]
    MissingKeySource,

    #[error("only one ID service key source may be set, found: {0}")]
    ConflictingKeySources(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("invalid CORS origin {origin:?}: {reason}")]
    InvalidOrigin { origin: String, reason: String },

    #[error("TLS_CERT_PATH and TLS_KEY_PATH must be set together")]
    IncompleteTls,

    #[error("failed to read {}: {source}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid ID service public key: {0}")]
    InvalidPublicKey(#[from] jsonwebtoken::errors::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to open user database: {0}")]
    UserStore(#[from] crate::users::UserStoreError),
}

/// Where the ID service verification key comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Inline PEM
    Pem(String),
    /// PEM file on disk
    PemFile(PathBuf),
    /// JWKS endpoint
    JwksUrl(String),
    /// No signature verification (`dev` builds only)
    #[cfg(feature = "dev")]
    Unverified,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub key_source: KeySource,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub leeway: u64,
    pub jwks_cache_ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub auth: AuthSettings,
    pub cors: CorsSettings,
    pub user_db_path: Option<PathBuf>,
    pub tls: Option<TlsSettings>,
    pub log_format: LogFormat,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port: u16 = parse_or(PORT_ENV, get(PORT_ENV), DEFAULT_PORT)?;
        let ip = IpAddr::from_str(host.trim_start_matches('[').trim_end_matches(']')).map_err(|_| {
            ConfigError::InvalidValue {
                name: HOST_ENV,
                value: host.clone(),
            }
        })?;
        let bind_addr = SocketAddr::new(ip, port);

        let auth = AuthSettings {
            key_source: key_source(get(PUBLIC_KEY_ENV), get(PUBLIC_KEY_FILE_ENV), get(JWKS_URL_ENV))?,
            issuer: get(ISSUER_ENV),
            audience: get(AUDIENCE_ENV),
            leeway: parse_or(LEEWAY_ENV, get(LEEWAY_ENV), crate::auth::verifier::DEFAULT_LEEWAY)?,
            jwks_cache_ttl: Duration::from_secs(parse_or(
                JWKS_CACHE_TTL_ENV,
                get(JWKS_CACHE_TTL_ENV),
                crate::auth::jwks::DEFAULT_CACHE_TTL.as_secs(),
            )?),
        };

        let cors = CorsSettings {
            origins: cors::parse_origins(&get(CORS_ORIGINS_ENV).unwrap_or_default())?,
            allow_credentials: parse_bool(CORS_CREDENTIALS_ENV, get(CORS_CREDENTIALS_ENV), true)?,
            max_age: Duration::from_secs(parse_or(
                CORS_MAX_AGE_ENV,
                get(CORS_MAX_AGE_ENV),
                cors::DEFAULT_MAX_AGE.as_secs(),
            )?),
        };

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsSettings {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteTls),
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref().map(str::to_lowercase).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            bind_addr,
            auth,
            cors,
            user_db_path: get(USER_DB_PATH_ENV).map(PathBuf::from),
            tls,
            log_format,
        })
    }
}

impl KeySource {
    /// Read the PEM for static key sources.
    pub fn load_pem(&self) -> Result<Option<String>, ConfigError> {
        match self {
            KeySource::Pem(pem) => Ok(Some(pem.clone())),
            KeySource::PemFile(path) => std::fs::read_to_string(path)
                .map(Some)
                .map_err(|source| ConfigError::ReadFile {
                    path: path.clone(),
                    source,
                }),
            KeySource::JwksUrl(_) => Ok(None),
            #[cfg(feature = "dev")]
            KeySource::Unverified => Ok(None),
        }
    }
}

fn key_source(
    pem: Option<String>,
    file: Option<String>,
    jwks: Option<String>,
) -> Result<KeySource, ConfigError> {
    let set: Vec<&str> = [
        (PUBLIC_KEY_ENV, pem.is_some()),
        (PUBLIC_KEY_FILE_ENV, file.is_some()),
        (JWKS_URL_ENV, jwks.is_some()),
    ]
    .iter()
    .filter(|(_, present)| *present)
    .map(|(name, _)| *name)
    .collect();

    if set.len() > 1 {
        return Err(ConfigError::ConflictingKeySources(set.join(", ")));
    }

    if let Some(pem) = pem {
        // Env files often carry the PEM on one line with literal \n.
        return Ok(KeySource::Pem(pem.replace("\\n", "\n")));
    }
    if let Some(file) = file {
        return Ok(KeySource::PemFile(file.into()));
    }
    if let Some(url) = jwks {
        url::Url::parse(&url).map_err(|_| ConfigError::InvalidValue {
            name: JWKS_URL_ENV,
            value: url.clone(),
        })?;
        return Ok(KeySource::JwksUrl(url));
    }

    no_key_source()
}

#[cfg(feature = "dev")]
fn no_key_source() -> Result<KeySource, ConfigError> {
    tracing::warn!("No ID service key configured; tokens will NOT be signature-checked");
    Ok(KeySource::Unverified)
}

#[cfg(not(feature = "dev"))]
fn no_key_source() -> Result<KeySource, ConfigError> {
    Err(ConfigError::MissingKeySource)
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let lowered = raw.as_deref().map(str::to_lowercase);
    match lowered.as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::InvalidValue {
            name,
            value: raw.unwrap_or_default(),
        }),
    }
}
