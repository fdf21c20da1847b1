//! Stock movement handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::models::{Action, Resource};
use shared::types::Pagination;

use super::{csv_response, pdf_response, DaysQuery, FormatQuery};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::stock::{
    DailyMovements, ManualMovementInput, MovementFilter, StockDashboard, StockMovement,
};
use crate::services::{pdf, StockService};
use crate::AppState;

/// Record an entry, exit or adjustment by hand
pub async fn create_movement(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<ManualMovementInput>,
) -> AppResult<(StatusCode, Json<StockMovement>)> {
    current_user.0.require(Resource::Stock, Action::Create)?;
    let service = StockService::new(state.db);
    let movement = service
        .record_manual_movement(current_user.0.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(movement)))
}

/// Movement history; `?format=csv` exports the current page
pub async fn list_movements(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<MovementFilter>,
    Query(pagination): Query<Pagination>,
    Query(format): Query<FormatQuery>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Stock, Action::View)?;
    let service = StockService::new(state.db);
    let page = service.history(&filter, &pagination).await?;

    if format.is_csv() {
        current_user.0.require(Resource::Stock, Action::Export)?;
        return csv_response("stock_movements.csv", &page.data);
    }
    Ok(Json(page).into_response())
}

pub async fn stock_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<StockDashboard>> {
    current_user.0.require(Resource::Stock, Action::View)?;
    let service = StockService::new(state.db);
    Ok(Json(service.dashboard().await?))
}

/// Daily in/out/adjustment/return totals, last 7 days by default
pub async fn stock_chart(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<DaysQuery>,
) -> AppResult<Json<DailyMovements>> {
    current_user.0.require(Resource::Stock, Action::View)?;
    let service = StockService::new(state.db);
    Ok(Json(service.chart_data(query.days.unwrap_or(7)).await?))
}

/// Stock report as JSON, CSV or PDF (`?format=csv|pdf`)
pub async fn stock_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(format): Query<FormatQuery>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Stock, Action::View)?;
    let service = StockService::new(state.db.clone());
    let report = service.report().await?;
    let stamp = report.generated_at.format("%Y%m%d");

    match format.format.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("csv") => {
            current_user.0.require(Resource::Stock, Action::Export)?;
            service.record_export(current_user.0.user_id, "csv").await?;
            csv_response(&format!("stock_report_{}.csv", stamp), &report.lines)
        }
        Some("pdf") => {
            current_user.0.require(Resource::Stock, Action::Export)?;
            let bytes =
                pdf::render_stock_report(&state.config.company, &report, &current_user.0.username)?;
            service.record_export(current_user.0.user_id, "pdf").await?;
            Ok(pdf_response(&format!("stock_report_{}.pdf", stamp), bytes))
        }
        _ => Ok(Json(report).into_response()),
    }
}
