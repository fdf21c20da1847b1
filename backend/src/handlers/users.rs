//! User administration handlers (admin only)

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use shared::models::UserRole;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::auth::UserProfile;
use crate::services::AuthService;
use crate::AppState;

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    pub is_active: Option<bool>,
    pub role: Option<UserRole>,
}

/// List all accounts
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserProfile>>> {
    let service = AuthService::new(state.db.clone(), &state.config);
    Ok(Json(service.list_users().await?))
}

/// Activate, deactivate or change the role of an account
pub async fn update_user(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    let service = AuthService::new(state.db.clone(), &state.config);
    let profile = service
        .update_user(current_user.0.user_id, user_id, body.is_active, body.role)
        .await?;
    Ok(Json(profile))
}
