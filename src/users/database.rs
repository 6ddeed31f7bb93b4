// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! Embedded user database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! - `users`: user id (UUID string) → serialized LocalUser
//! - `users_by_external_id`: ID service subject → user id

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use uuid::Uuid;

use super::{LocalUser, UserProfile, UserStore, UserStoreError, UserStoreResult};

// =============================================================================
// Table Definitions
// =============================================================================

/// Primary table: user id → serialized LocalUser (JSON bytes).
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Index: external id (`sub`) → user id.
const USERS_BY_EXTERNAL_ID: TableDefinition<&str, &str> =
    TableDefinition::new("users_by_external_id");

// =============================================================================
// RedbUserStore
// =============================================================================

/// Persistent user store.
pub struct RedbUserStore {
    db: Database,
}

impl RedbUserStore {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> UserStoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| UserStoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_EXTERNAL_ID)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }
}

fn decode_user(bytes: &[u8]) -> UserStoreResult<LocalUser> {
    Ok(serde_json::from_slice(bytes)?)
}

impl UserStore for RedbUserStore {
    fn find_or_create(&self, profile: &UserProfile) -> UserStoreResult<LocalUser> {
        let now = Utc::now();

        let write_txn = self.db.begin_write()?;
        let user = {
            let mut users = write_txn.open_table(USERS)?;
            let mut index = write_txn.open_table(USERS_BY_EXTERNAL_ID)?;

            let existing_id = index
                .get(profile.external_id.as_str())?
                .map(|v| v.value().to_string());

            let user = match existing_id {
                Some(id) => {
                    let stored = users
                        .get(id.as_str())?
                        .map(|v| v.value().to_vec())
                        .ok_or_else(|| UserStoreError::Corrupt(format!("dangling index for {id}")))?;
                    let mut user = decode_user(&stored)?;
                    user.apply_profile(profile, now);
                    user
                }
                None => {
                    let user = LocalUser::from_profile(profile, now);
                    let id = user.id.to_string();
                    index.insert(user.external_id.as_str(), id.as_str())?;
                    user
                }
            };

            let json = serde_json::to_vec(&user)?;
            let id = user.id.to_string();
            users.insert(id.as_str(), json.as_slice())?;
            user
        };
        write_txn.commit()?;

        Ok(user)
    }

    fn get(&self, id: Uuid) -> UserStoreResult<Option<LocalUser>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        let id = id.to_string();
        match table.get(id.as_str())? {
            Some(value) => Ok(Some(decode_user(value.value())?)),
            None => Ok(None),
        }
    }

    fn get_by_external_id(&self, external_id: &str) -> UserStoreResult<Option<LocalUser>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(USERS_BY_EXTERNAL_ID)?;
        let users = read_txn.open_table(USERS)?;

        let Some(id) = index.get(external_id)? else {
            return Ok(None);
        };
        match users.get(id.value())? {
            Some(value) => Ok(Some(decode_user(value.value())?)),
            None => Err(UserStoreError::Corrupt(format!(
                "dangling index for {}",
                id.value()
            ))),
        }
    }

    fn set_active(&self, id: Uuid, active: bool) -> UserStoreResult<LocalUser> {
        let key = id.to_string();

        let write_txn = self.db.begin_write()?;
        let user = {
            let mut users = write_txn.open_table(USERS)?;
            let stored = users
                .get(key.as_str())?
                .map(|v| v.value().to_vec())
                .ok_or_else(|| UserStoreError::NotFound(format!("User {id}")))?;

            let mut user = decode_user(&stored)?;
            user.is_active = active;
            let json = serde_json::to_vec(&user)?;
            users.insert(key.as_str(), json.as_slice())?;
            user
        };
        write_txn.commit()?;

        Ok(user)
    }

    fn count(&self) -> UserStoreResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(USERS)?;
        Ok(table.len()? as usize)
    }

    fn kind(&self) -> &'static str {
        "redb"
    }
}
