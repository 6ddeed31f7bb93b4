// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::claims::IdServiceClaims;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - ID service superusers, full access
/// - `Staff` - back-office users, may read other users' records
/// - `User` - regular signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrative access
    Admin,
    /// Staff member
    Staff,
    /// Regular user
    User,
}

impl Role {
    fn rank(self) -> u8 {
        match self {
            Role::Admin => 2,
            Role::Staff => 1,
            Role::User => 0,
        }
    }

    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        self.rank() >= required.rank()
    }

    /// Parse role from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Role> {
        match s.trim().to_lowercase().as_str() {
            "admin" | "administrator" | "superuser" => Some(Role::Admin),
            "staff" => Some(Role::Staff),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// Derive the role carried by ID service claims.
    ///
    /// The superuser flag wins, the staff flag grants at least `Staff`, and
    /// otherwise the highest recognised entry of `roles` is used.
    pub fn from_claims(claims: &IdServiceClaims) -> Role {
        if claims.is_superuser == Some(true) {
            return Role::Admin;
        }

        let listed = claims
            .roles
            .iter()
            .filter_map(|r| Role::from_str(r))
            .max_by_key(|r| r.rank())
            .unwrap_or_default();

        if claims.is_staff == Some(true) && !listed.has_privilege(Role::Staff) {
            return Role::Staff;
        }

        listed
    }
}

impl Default for Role {
    /// Default role is User (least privilege for authenticated users).
    fn default() -> Self {
        Role::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Staff => write!(f, "staff"),
            Role::User => write!(f, "user"),
        }
    }
}
