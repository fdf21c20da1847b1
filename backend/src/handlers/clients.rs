//! Client registry handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use shared::models::{Action, Resource};
use shared::types::Pagination;
use uuid::Uuid;

use super::{csv_response, pdf_response, FormatQuery};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::client::{
    Client, ClientDashboard, ClientDetail, ClientFilter, ClientStats, CreateClientInput,
    UpdateClientInput,
};
use crate::services::{pdf, ClientService};
use crate::AppState;

pub async fn create_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateClientInput>,
) -> AppResult<(StatusCode, Json<Client>)> {
    current_user.0.require(Resource::Client, Action::Create)?;
    let service = ClientService::new(state.db);
    let client = service.create(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

/// List clients; `?format=csv` exports the current page
pub async fn list_clients(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<ClientFilter>,
    Query(pagination): Query<Pagination>,
    Query(format): Query<FormatQuery>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Client, Action::View)?;
    let service = ClientService::new(state.db);
    let list = service.list(&filter, &pagination).await?;

    if format.is_csv() {
        current_user.0.require(Resource::Client, Action::Export)?;
        return csv_response("clients.csv", &list.page.data);
    }
    Ok(Json(list).into_response())
}

pub async fn get_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<Json<ClientDetail>> {
    current_user.0.require(Resource::Client, Action::View)?;
    let service = ClientService::new(state.db);
    Ok(Json(service.get_detail(client_id).await?))
}

pub async fn update_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
    Json(input): Json<UpdateClientInput>,
) -> AppResult<Json<Client>> {
    current_user.0.require(Resource::Client, Action::Edit)?;
    let service = ClientService::new(state.db);
    let client = service
        .update(current_user.0.user_id, client_id, input)
        .await?;
    Ok(Json(client))
}

pub async fn delete_client(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(client_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Client, Action::Delete)?;
    let service = ClientService::new(state.db);
    service.deactivate(current_user.0.user_id, client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn client_dashboard(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ClientDashboard>> {
    current_user.0.require(Resource::Client, Action::View)?;
    let service = ClientService::new(state.db);
    Ok(Json(service.dashboard().await?))
}

/// Chart data
pub async fn client_stats(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Json<ClientStats>> {
    current_user.0.require(Resource::Client, Action::View)?;
    let service = ClientService::new(state.db);
    Ok(Json(service.stats().await?))
}

/// Client report as PDF
pub async fn client_report_pdf(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> AppResult<Response> {
    current_user.0.require(Resource::Client, Action::Export)?;
    let service = ClientService::new(state.db.clone());
    let report = service.report(current_user.0.user_id).await?;
    let bytes = pdf::render_client_report(&state.config.company, &report, &current_user.0.username)?;

    let file_name = format!("client_report_{}.pdf", report.generated_at.format("%Y%m%d"));
    Ok(pdf_response(&file_name, bytes))
}
