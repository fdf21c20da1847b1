//! Order handlers: header, lines, status workflow and reporting

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use shared::models::{Action, OrderStatus, Resource};
use shared::types::Pagination;
use uuid::Uuid;

use super::{csv_response, DaysQuery, FormatQuery};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::order::{
    AddLineInput, CreateOrderInput, DailyRevenue, Order, OrderDetail, OrderFilter, OrderLine,
    OrdersDashboard, ReportPeriod, StatusChangeResult, UpdateLineInput, UpdateOrderInput,
};
use crate::services::OrderService;
use crate::AppState;

#[derive(Deserialize)]
pub struct ChangeStatusRequest {
    pub status: String,
}

pub async fn create_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> AppResult<(StatusCode, Json<Order>)> {
    current_user.0.require(Resource::Order, Action::Create)?;
    let service = OrderService::new(state.db);
    let order = service.create(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List orders; `?format=csv` exports the current page
pub async fn list_orders(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<OrderFilter>,
    Query(pagination): Query<Pagination>,
    Query(format): Query<FormatQuery>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Order, Action::View)?;
    let service = OrderService::new(state.db);
    let page = service.list(&filter, &pagination).await?;

    if format.is_csv() {
        current_user.0.require(Resource::Order, Action::Export)?;
        return csv_response("orders.csv", &page.data);
    }
    Ok(Json(page).into_response())
}

/// Order page: lines, documents, invoices, deliveries and movements
pub async fn get_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<OrderDetail>> {
    current_user.0.require(Resource::Order, Action::View)?;
    let service = OrderService::new(state.db);
    Ok(Json(service.get_detail(order_id).await?))
}

pub async fn update_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<UpdateOrderInput>,
) -> AppResult<Json<Order>> {
    current_user.0.require(Resource::Order, Action::Edit)?;
    let service = OrderService::new(state.db);
    let order = service.update(current_user.0.user_id, order_id, input).await?;
    Ok(Json(order))
}

pub async fn add_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<AddLineInput>,
) -> AppResult<(StatusCode, Json<OrderLine>)> {
    current_user.0.require(Resource::Order, Action::Edit)?;
    let service = OrderService::new(state.db);
    let line = service
        .add_line(current_user.0.user_id, order_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(line)))
}

pub async fn update_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((order_id, line_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateLineInput>,
) -> AppResult<Json<OrderLine>> {
    current_user.0.require(Resource::Order, Action::Edit)?;
    let service = OrderService::new(state.db);
    let line = service
        .update_line(current_user.0.user_id, order_id, line_id, input)
        .await?;
    Ok(Json(line))
}

pub async fn delete_line(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path((order_id, line_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Order, Action::Edit)?;
    let service = OrderService::new(state.db);
    service
        .delete_line(current_user.0.user_id, order_id, line_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Move the order through its workflow, booking the stock movements the
/// transition implies
pub async fn change_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(body): Json<ChangeStatusRequest>,
) -> AppResult<Json<StatusChangeResult>> {
    current_user.0.require(Resource::Order, Action::Edit)?;
    let new_status = body.status.parse::<OrderStatus>()?;
    let service = OrderService::new(state.db);
    let result = service
        .change_status(current_user.0.user_id, order_id, new_status)
        .await?;
    Ok(Json(result))
}

pub async fn order_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<OrdersDashboard>> {
    current_user.0.require(Resource::Order, Action::View)?;
    let service = OrderService::new(state.db);
    Ok(Json(service.dashboard().await?))
}

/// Orders report for a period; `?format=csv` exports the orders
pub async fn order_report(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(period): Query<ReportPeriod>,
    Query(format): Query<FormatQuery>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Report, Action::View)?;
    let service = OrderService::new(state.db);
    let report = service.report(&period).await?;

    if format.is_csv() {
        current_user.0.require(Resource::Report, Action::Export)?;
        let file_name = format!(
            "orders_report_{}_{}.csv",
            report.date_from.format("%Y%m%d"),
            report.date_to.format("%Y%m%d")
        );
        return csv_response(&file_name, &report.orders);
    }
    Ok(Json(report).into_response())
}

/// Daily revenue, last 30 days by default
pub async fn order_chart(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<DaysQuery>,
) -> AppResult<Json<Vec<DailyRevenue>>> {
    current_user.0.require(Resource::Order, Action::View)?;
    let service = OrderService::new(state.db);
    Ok(Json(service.chart_data(query.days.unwrap_or(30)).await?))
}
