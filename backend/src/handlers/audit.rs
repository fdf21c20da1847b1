//! Audit trail handler (admin only)

use axum::{
    extract::{Query, State},
    Json,
};
use shared::types::{PaginatedResponse, Pagination};

use crate::error::AppResult;
use crate::services::audit::{AuditFilter, AuditLog};
use crate::services::AuditService;
use crate::AppState;

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Query(filter): Query<AuditFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<AuditLog>>> {
    let service = AuditService::new(state.db);
    Ok(Json(service.list(&filter, &pagination).await?))
}
