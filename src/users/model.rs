// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! Local user records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::Role;

/// A user as known to the App service.
///
/// Created the first time the ID service vouches for a subject, then kept in
/// sync with the claims on every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct LocalUser {
    /// Local identifier
    pub id: Uuid,
    /// ID service subject
    pub external_id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub role: Role,
    /// Deactivated users cannot authenticate even with a valid token
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// Profile fields carried by a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub external_id: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
}

impl LocalUser {
    /// New active user from a token profile.
    pub fn from_profile(profile: &UserProfile, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            external_id: profile.external_id.clone(),
            username: profile.username.clone(),
            email: profile.email.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            role: profile.role,
            is_active: true,
            created_at: now,
            last_login: now,
        }
    }

    /// Refresh from a token profile.
    ///
    /// Fields the token omits keep their stored value. The role always follows
    /// the token so demotions take effect on the next request.
    pub fn apply_profile(&mut self, profile: &UserProfile, now: DateTime<Utc>) {
        self.username = profile.username.clone();
        if profile.email.is_some() {
            self.email = profile.email.clone();
        }
        if profile.first_name.is_some() {
            self.first_name = profile.first_name.clone();
        }
        if profile.last_name.is_some() {
            self.last_name = profile.last_name.clone();
        }
        self.role = profile.role;
        self.last_login = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            external_id: "42".to_string(),
            username: "ada".to_string(),
            email: Some("ada@example.com".to_string()),
            first_name: Some("Ada".to_string()),
            last_name: None,
            role: Role::Staff,
        }
    }

    #[test]
    fn from_profile_creates_active_user() {
        let now = Utc::now();
        let user = LocalUser::from_profile(&profile(), now);
        assert_eq!(user.external_id, "42");
        assert!(user.is_active);
        assert_eq!(user.created_at, now);
        assert_eq!(user.last_login, now);
    }

    #[test]
    fn apply_profile_keeps_omitted_fields() {
        let created = Utc::now();
        let mut user = LocalUser::from_profile(&profile(), created);

        let mut update = profile();
        update.email = None;
        update.last_name = Some("Lovelace".to_string());
        update.role = Role::User;

        let later = created + chrono::Duration::seconds(30);
        user.apply_profile(&update, later);

        assert_eq!(user.email.as_deref(), Some("ada@example.com"));
        assert_eq!(user.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(user.role, Role::User);
        assert_eq!(user.created_at, created);
        assert_eq!(user.last_login, later);
    }
}
