// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DigiDex

//! User endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AdminOnly, Auth, StaffOnly};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::LocalUser;

/// Response for GET /v1/users/me
#[derive(Debug, Serialize, ToSchema)]
pub struct UserMeResponse {
    /// The local user record
    pub user: LocalUser,
    /// Session ID (if available)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Request body for PUT /v1/users/{user_id}/active
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

/// Get the current authenticated user's local record.
#[utoipa::path(
    get,
    path = "/v1/users/me",
    tag = "Users",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "User information", body = UserMeResponse),
        (status = 401, description = "Unauthorized - invalid or missing token"),
    )
)]
pub async fn get_current_user(
    State(state): State<AppState>,
    Auth(user): Auth,
) -> Result<Json<UserMeResponse>, ApiError> {
    let record = state
        .users()
        .get(user.user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    Ok(Json(UserMeResponse {
        user: record,
        session_id: user.session_id,
    }))
}

/// Look up a local user (staff only).
#[utoipa::path(
    get,
    path = "/v1/users/{user_id}",
    tag = "Users",
    security(("bearer" = [])),
    params(("user_id" = Uuid, Path, description = "Local user ID")),
    responses(
        (status = 200, description = "User record", body = LocalUser),
        (status = 403, description = "Caller is not staff"),
        (status = 404, description = "No such user"),
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    StaffOnly(_caller): StaffOnly,
    Path(user_id): Path<Uuid>,
) -> Result<Json<LocalUser>, ApiError> {
    let user = state
        .users()
        .get(user_id)?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(user))
}

/// Activate or deactivate a local user (admin only).
///
/// Deactivated users are refused even when the ID service still issues
/// tokens for them.
#[utoipa::path(
    put,
    path = "/v1/users/{user_id}/active",
    tag = "Users",
    security(("bearer" = [])),
    params(("user_id" = Uuid, Path, description = "Local user ID")),
    request_body = SetActiveRequest,
    responses(
        (status = 200, description = "Updated user record", body = LocalUser),
        (status = 403, description = "Caller is not an admin"),
        (status = 404, description = "No such user"),
    )
)]
pub async fn set_user_active(
    State(state): State<AppState>,
    AdminOnly(caller): AdminOnly,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SetActiveRequest>,
) -> Result<Json<LocalUser>, ApiError> {
    if caller.user_id == user_id && !request.is_active {
        return Err(ApiError::bad_request("Cannot deactivate yourself"));
    }

    let user = state.users().set_active(user_id, request.is_active)?;

    info!(
        admin_id = %caller.user_id,
        user_id = %user.id,
        is_active = user.is_active,
        "User activation changed"
    );
    Ok(Json(user))
}
