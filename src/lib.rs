// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! DigiDex App Service - ID-service JWT authentication
//!
//! The App service trusts RS256 tokens issued by the separate DigiDex ID
//! service, maps them to local users and allow-lists the frontend origins.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token verification and request authentication
//! - `cors` - Cross-origin allow-list
//! - `users` - Local user records (in-memory or redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod cors;
pub mod error;
pub mod logging;
pub mod server;
pub mod state;
pub mod users;

#[cfg(test)]
mod test_support;
