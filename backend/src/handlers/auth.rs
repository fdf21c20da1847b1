//! Authentication handlers

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::{client_ip, CurrentUser};
use crate::services::auth::{AuthTokens, RegisterInput, UpdateProfileInput, UserProfile};
use crate::services::AuthService;
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Login endpoint handler
pub async fn login(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthTokens>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service
        .login(&body.username, &body.password, client_ip(&headers, peer.as_ref()))
        .await?;
    Ok(Json(tokens))
}

/// Register endpoint handler
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> AppResult<(StatusCode, Json<AuthTokens>)> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.register(body).await?;
    Ok((StatusCode::CREATED, Json(tokens)))
}

/// Refresh token endpoint handler
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<AuthTokens>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let tokens = auth_service.refresh_token(&body.refresh_token).await?;
    Ok(Json(tokens))
}

/// Logout endpoint handler
pub async fn logout(
    State(state): State<AppState>,
    current_user: CurrentUser,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> AppResult<StatusCode> {
    let user = current_user.0;
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    auth_service
        .logout(
            user.user_id,
            &user.username,
            &body.refresh_token,
            client_ip(&headers, peer.as_ref()),
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Current user's profile
pub async fn get_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<UserProfile>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let profile = auth_service.get_profile(current_user.0.user_id).await?;
    Ok(Json(profile))
}

/// Update the current user's profile
pub async fn update_profile(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(body): Json<UpdateProfileInput>,
) -> AppResult<Json<UserProfile>> {
    let auth_service = AuthService::new(state.db.clone(), &state.config);
    let profile = auth_service
        .update_profile(current_user.0.user_id, body)
        .await?;
    Ok(Json(profile))
}
