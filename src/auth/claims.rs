// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! JWT claims and authenticated user representation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::roles::Role;
use crate::users::{LocalUser, UserProfile};

/// Claims carried by an ID service access token.
///
/// Only `exp` is mandatory at the serde level. Issuer and audience are
/// enforced by the verifier when they are configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdServiceClaims {
    /// Subject, the ID service's identifier for the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Numeric or string user id, used when `sub` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,

    /// Expiration timestamp
    pub exp: i64,

    /// Issued at timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not before timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience, a string or an array of strings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,

    /// Token id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Session id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Role names assigned by the ID service
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_staff: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_superuser: Option<bool>,
}

impl IdServiceClaims {
    /// The external user identifier: `sub`, falling back to `user_id`.
    ///
    /// Blank values count as missing.
    pub fn subject(&self) -> Option<String> {
        let from_sub = self
            .sub
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        from_sub.or_else(|| match self.user_id.as_ref()? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Build the local user profile these claims describe.
    pub fn to_profile(&self, external_id: String) -> UserProfile {
        UserProfile {
            username: self
                .username
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| external_id.clone()),
            external_id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: Role::from_claims(self),
        }
    }
}

/// Authenticated user information placed on the request.
///
/// This is the primary type used throughout the application to represent
/// the authenticated user making a request.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthenticatedUser {
    /// Local user id
    pub user_id: Uuid,

    /// ID service identifier (`sub` claim)
    pub external_id: String,

    pub username: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// User's role
    pub role: Role,

    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Token issuer (not serialized)
    #[serde(skip)]
    pub issuer: Option<String>,

    /// Token expiration (Unix timestamp, not serialized)
    #[serde(skip)]
    pub expires_at: i64,
}

impl AuthenticatedUser {
    /// Combine the local record with the token that authenticated it.
    pub fn new(user: &LocalUser, claims: &IdServiceClaims) -> Self {
        Self {
            user_id: user.id,
            external_id: user.external_id.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            session_id: claims.sid.clone(),
            issuer: claims.iss.clone(),
            expires_at: claims.exp,
        }
    }

    /// Check if the user has the required role.
    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    /// Check if this user is staff or above.
    pub fn is_staff(&self) -> bool {
        self.has_role(Role::Staff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claims() -> IdServiceClaims {
        IdServiceClaims {
            sub: Some("user_123".to_string()),
            exp: 1700003600,
            iat: Some(1700000000),
            iss: Some("https://id.digidex.example".to_string()),
            sid: Some("sess_abc".to_string()),
            email: Some("ada@example.com".to_string()),
            username: Some("ada".to_string()),
            roles: vec!["staff".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn subject_prefers_sub() {
        let mut claims = sample_claims();
        claims.user_id = Some(serde_json::json!(7));
        assert_eq!(claims.subject().as_deref(), Some("user_123"));
    }

    #[test]
    fn subject_falls_back_to_numeric_user_id() {
        let mut claims = sample_claims();
        claims.sub = None;
        claims.user_id = Some(serde_json::json!(7));
        assert_eq!(claims.subject().as_deref(), Some("7"));
    }

    #[test]
    fn blank_subject_is_missing() {
        let mut claims = sample_claims();
        claims.sub = Some("  ".to_string());
        assert_eq!(claims.subject(), None);

        claims.user_id = Some(serde_json::json!(true));
        assert_eq!(claims.subject(), None);
    }

    #[test]
    fn profile_takes_username_and_role() {
        let profile = sample_claims().to_profile("user_123".to_string());
        assert_eq!(profile.username, "ada");
        assert_eq!(profile.role, Role::Staff);
        assert_eq!(profile.email.as_deref(), Some("ada@example.com"));
    }

    #[test]
    fn profile_username_falls_back_to_external_id() {
        let mut claims = sample_claims();
        claims.username = None;
        let profile = claims.to_profile("user_123".to_string());
        assert_eq!(profile.username, "user_123");
    }

    #[test]
    fn claims_deserialize_with_array_audience() {
        let json = r#"{"sub":"u1","exp":10,"aud":["app","cms"],"roles":["admin"]}"#;
        let claims: IdServiceClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.aud, Some(serde_json::json!(["app", "cms"])));
        assert_eq!(claims.roles, vec!["admin"]);
    }
}
