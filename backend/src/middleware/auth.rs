//! Authentication middleware
//!
//! JWT authentication and role-based access control middleware

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use shared::models::{permission_key, Action, Resource, UserRole};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ErrorDetail, ErrorResponse};
use crate::services::auth::decode_access_token;
use crate::AppState;

/// Authenticated user information extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub username: String,
    pub role: UserRole,
    pub permissions: Vec<String>,
}

impl AuthUser {
    /// Check if user has a specific permission
    pub fn has_permission(&self, resource: Resource, action: Action) -> bool {
        let permission = permission_key(resource, action);
        self.permissions.contains(&permission)
    }

    /// Fail with 403 unless the user holds `resource:action`
    pub fn require(&self, resource: Resource, action: Action) -> AppResult<()> {
        if self.has_permission(resource, action) {
            Ok(())
        } else {
            tracing::warn!(
                user = %self.username,
                "Permission denied: requires {}",
                permission_key(resource, action)
            );
            Err(AppError::InsufficientPermissions)
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Authentication middleware that validates JWT tokens.
///
/// The token proves identity; role and active flag are read back from the
/// database so deactivation and role changes apply on the next request.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return unauthorized_response("Missing or invalid Authorization header"),
    };

    let claims = match decode_access_token(token, &state.config.jwt.secret) {
        Ok(claims) => claims,
        Err(_) => return unauthorized_response("Invalid or expired token"),
    };

    let user_id = match Uuid::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => return unauthorized_response("Invalid user ID in token"),
    };

    let row = sqlx::query_as::<_, (String, String, bool)>(
        "SELECT username, role, is_active FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(&state.db)
    .await;

    let (username, role) = match row {
        Ok(Some((username, role, true))) => (username, role),
        Ok(_) => return unauthorized_response("Account not found or disabled"),
        Err(e) => return AppError::DatabaseError(e).into_response(),
    };

    let role = match role.parse::<UserRole>() {
        Ok(role) => role,
        Err(e) => return AppError::Internal(e.to_string()).into_response(),
    };

    let auth_user = AuthUser {
        user_id,
        username,
        permissions: role.permission_keys(),
        role,
    };

    request.extensions_mut().insert(auth_user);

    next.run(request).await
}

/// Rejects non-admin users. Must run after `auth_middleware`.
pub async fn admin_middleware(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => next.run(request).await,
        Some(_) => forbidden_response("Administrator access required"),
        None => unauthorized_response("Authentication required"),
    }
}

/// Client address for the audit trail: first `X-Forwarded-For` hop,
/// falling back to the peer address
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
        .or_else(|| peer.map(|ConnectInfo(addr)| addr.ip().to_string()))
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message_en: message.to_string(),
            message_fr: "Non autorisé".to_string(),
            field: None,
        },
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}

/// Create forbidden response
fn forbidden_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail {
            code: "FORBIDDEN".to_string(),
            message_en: message.to_string(),
            message_fr: "Accès refusé".to_string(),
            field: None,
        },
    };

    (StatusCode::FORBIDDEN, Json(error)).into_response()
}

/// Extractor for authenticated user
/// Use this in handlers to get the current user
#[derive(Clone, Debug)]
pub struct CurrentUser(pub AuthUser);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| {
                let error = ErrorResponse {
                    error: ErrorDetail {
                        code: "UNAUTHORIZED".to_string(),
                        message_en: "Authentication required".to_string(),
                        message_fr: "Authentification requise".to_string(),
                        field: None,
                    },
                };
                (StatusCode::UNAUTHORIZED, Json(error))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn user(role: UserRole) -> AuthUser {
        AuthUser {
            user_id: Uuid::new_v4(),
            username: "tester".to_string(),
            permissions: role.permission_keys(),
            role,
        }
    }

    #[test]
    fn permissions_follow_role() {
        let accountant = user(UserRole::Accountant);
        assert!(accountant.require(Resource::Invoice, Action::Edit).is_ok());
        assert!(accountant.require(Resource::Stock, Action::Create).is_err());
        assert!(user(UserRole::Admin).is_admin());
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        let peer = ConnectInfo(SocketAddr::from(([10, 0, 0, 2], 5000)));
        assert_eq!(
            client_ip(&headers, Some(&peer)).as_deref(),
            Some("203.0.113.7")
        );
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(&peer)).as_deref(),
            Some("10.0.0.2")
        );
        assert_eq!(client_ip(&HeaderMap::new(), None), None);
    }
}
