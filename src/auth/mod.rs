// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! # Authentication Module
//!
//! Authentication is delegated to the DigiDex ID service, which issues
//! RS256-signed JWTs.
//!
//! ## Auth Flow
//!
//! 1. Frontend (Next.js) signs the user in against the ID service
//! 2. Frontend sends `Authorization: Bearer <ID service JWT>`
//! 3. App service:
//!    - Verifies the RS256 signature against the ID service public key
//!      (static PEM or JWKS)
//!    - Checks expiry, and issuer/audience when configured
//!    - Maps `sub` to a local user, creating it on first sight
//!    - Sets `AuthenticatedUser` on the request
//!
//! ## Security
//!
//! - Only RS256 is accepted, whatever the token header claims
//! - Deactivated local users are refused even with a valid token
//! - Clock skew tolerance defaults to 60 seconds

pub mod backend;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod keys;
pub mod middleware;
pub mod roles;
pub mod verifier;

pub use backend::JwtAuthBackend;
pub use claims::{AuthenticatedUser, IdServiceClaims};
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, OptionalAuth, StaffOnly};
pub use jwks::JwksManager;
pub use keys::{KeyProvider, KeyStatus};
pub use roles::Role;
pub use verifier::JwtVerifier;
