//! Main dashboard handler

use axum::{extract::State, Json};
use shared::models::{Action, Resource};

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::reporting::{DashboardMetrics, ReportingService};
use crate::AppState;

/// Order and invoice counters shown on the home page
pub async fn get_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<DashboardMetrics>> {
    current_user.0.require(Resource::Report, Action::View)?;
    let service = ReportingService::new(state.db);
    Ok(Json(service.dashboard().await?))
}
