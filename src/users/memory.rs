// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! In-memory user store.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use super::{LocalUser, UserProfile, UserStore, UserStoreError, UserStoreResult};

#[derive(Default)]
struct Inner {
    users: HashMap<Uuid, LocalUser>,
    by_external_id: HashMap<String, Uuid>,
}

/// Process-local user store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryUserStore {
    inner: RwLock<Inner>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserStore for InMemoryUserStore {
    fn find_or_create(&self, profile: &UserProfile) -> UserStoreResult<LocalUser> {
        let mut inner = self.inner.write().map_err(|_| UserStoreError::Poisoned)?;
        let now = Utc::now();

        if let Some(id) = inner.by_external_id.get(&profile.external_id).copied() {
            let user = inner
                .users
                .get_mut(&id)
                .ok_or_else(|| UserStoreError::Corrupt(format!("dangling index for {id}")))?;
            user.apply_profile(profile, now);
            return Ok(user.clone());
        }

        let user = LocalUser::from_profile(profile, now);
        inner
            .by_external_id
            .insert(user.external_id.clone(), user.id);
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn get(&self, id: Uuid) -> UserStoreResult<Option<LocalUser>> {
        let inner = self.inner.read().map_err(|_| UserStoreError::Poisoned)?;
        Ok(inner.users.get(&id).cloned())
    }

    fn get_by_external_id(&self, external_id: &str) -> UserStoreResult<Option<LocalUser>> {
        let inner = self.inner.read().map_err(|_| UserStoreError::Poisoned)?;
        Ok(inner
            .by_external_id
            .get(external_id)
            .and_then(|id| inner.users.get(id))
            .cloned())
    }

    fn set_active(&self, id: Uuid, active: bool) -> UserStoreResult<LocalUser> {
        let mut inner = self.inner.write().map_err(|_| UserStoreError::Poisoned)?;
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| UserStoreError::NotFound(format!("User {id}")))?;
        user.is_active = active;
        Ok(user.clone())
    }

    fn count(&self) -> UserStoreResult<usize> {
        let inner = self.inner.read().map_err(|_| UserStoreError::Poisoned)?;
        Ok(inner.users.len())
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use std::sync::Arc;

    fn profile(external_id: &str) -> UserProfile {
        UserProfile {
            external_id: external_id.to_string(),
            username: format!("user-{external_id}"),
            email: None,
            first_name: None,
            last_name: None,
            role: Role::User,
        }
    }

    #[test]
    fn find_or_create_is_idempotent_per_subject() {
        let store = InMemoryUserStore::new();
        let first = store.find_or_create(&profile("42")).unwrap();
        let second = store.find_or_create(&profile("42")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.count().unwrap(), 1);
        assert!(second.last_login >= first.last_login);
    }

    #[test]
    fn distinct_subjects_get_distinct_users() {
        let store = InMemoryUserStore::new();
        let a = store.find_or_create(&profile("a")).unwrap();
        let b = store.find_or_create(&profile("b")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn lookups_by_both_keys() {
        let store = InMemoryUserStore::new();
        let user = store.find_or_create(&profile("42")).unwrap();

        assert_eq!(store.get(user.id).unwrap(), Some(user.clone()));
        assert_eq!(store.get_by_external_id("42").unwrap(), Some(user));
        assert_eq!(store.get_by_external_id("nope").unwrap(), None);
    }

    #[test]
    fn deactivation_survives_relogin() {
        let store = InMemoryUserStore::new();
        let user = store.find_or_create(&profile("42")).unwrap();
        store.set_active(user.id, false).unwrap();

        let again = store.find_or_create(&profile("42")).unwrap();
        assert!(!again.is_active);
    }

    #[test]
    fn set_active_unknown_user_fails() {
        let store = InMemoryUserStore::new();
        let result = store.set_active(Uuid::new_v4(), false);
        assert!(matches!(result, Err(UserStoreError::NotFound(_))));
    }

    #[test]
    fn concurrent_first_logins_create_one_user() {
        let store = Arc::new(InMemoryUserStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.find_or_create(&profile("42")).unwrap().id)
            })
            .collect();

        let ids: Vec<Uuid> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.iter().all(|id| *id == ids[0]));
        assert_eq!(store.count().unwrap(), 1);
    }
}
