// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! # Local Users
//!
//! The ID service owns credentials; the App service keeps a local record per
//! subject so application data has something to point at.
//!
//! ## Stores
//!
//! - `InMemoryUserStore` - process-local, used when `USER_DB_PATH` is unset
//! - `RedbUserStore` - embedded ACID database file

pub mod database;
pub mod memory;
pub mod model;

use uuid::Uuid;

pub use database::RedbUserStore;
pub use memory::InMemoryUserStore;
pub use model::{LocalUser, UserProfile};

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("cannot create {}: {source}", path.display())]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("user store lock poisoned")]
    Poisoned,

    #[error("corrupt user record: {0}")]
    Corrupt(String),

    #[error("not found: {0}")]
    NotFound(String),
}

pub type UserStoreResult<T> = Result<T, UserStoreError>;

/// Persistence for local users.
///
/// `find_or_create` must be atomic: two concurrent first logins of the same
/// subject end up with one record.
pub trait UserStore: Send + Sync {
    /// Look up the user for `profile.external_id`, creating it if absent,
    /// and refresh it from the profile.
    fn find_or_create(&self, profile: &UserProfile) -> UserStoreResult<LocalUser>;

    fn get(&self, id: Uuid) -> UserStoreResult<Option<LocalUser>>;

    fn get_by_external_id(&self, external_id: &str) -> UserStoreResult<Option<LocalUser>>;

    /// Activate or deactivate a user.
    fn set_active(&self, id: Uuid, active: bool) -> UserStoreResult<LocalUser>;

    fn count(&self) -> UserStoreResult<usize>;

    /// Short name for logs and health output.
    fn kind(&self) -> &'static str;
}
