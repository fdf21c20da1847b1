//! Invoice handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use shared::models::{Action, InvoiceStatus, Resource};
use shared::types::Pagination;
use uuid::Uuid;

use super::{csv_response, pdf_response, FormatQuery};
use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::invoice::{
    invoice_file_name, GenerateInvoiceInput, Invoice, InvoiceDetail, InvoiceFilter,
    InvoicePreview,
};
use crate::services::{pdf, InvoiceService};
use crate::AppState;

#[derive(Deserialize)]
pub struct InvoiceStatusRequest {
    pub status: String,
}

/// List invoices; `?format=csv` exports the current page
pub async fn list_invoices(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<InvoiceFilter>,
    Query(pagination): Query<Pagination>,
    Query(format): Query<FormatQuery>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Invoice, Action::View)?;
    let service = InvoiceService::new(state.db.clone(), &state.config);
    let page = service.list(&filter, &pagination).await?;

    if format.is_csv() {
        current_user.0.require(Resource::Invoice, Action::Export)?;
        return csv_response("invoices.csv", &page.data);
    }
    Ok(Json(page).into_response())
}

/// Amounts and dates the invoice form starts from
pub async fn preview_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<InvoicePreview>> {
    current_user.0.require(Resource::Invoice, Action::Create)?;
    let service = InvoiceService::new(state.db.clone(), &state.config);
    Ok(Json(service.preview(order_id).await?))
}

pub async fn generate_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<GenerateInvoiceInput>,
) -> AppResult<(StatusCode, Json<InvoiceDetail>)> {
    current_user.0.require(Resource::Invoice, Action::Create)?;
    let service = InvoiceService::new(state.db.clone(), &state.config);
    let detail = service
        .generate(current_user.0.user_id, order_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Json<InvoiceDetail>> {
    current_user.0.require(Resource::Invoice, Action::View)?;
    let service = InvoiceService::new(state.db.clone(), &state.config);
    Ok(Json(service.get_detail(invoice_id).await?))
}

pub async fn update_invoice_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
    Json(body): Json<InvoiceStatusRequest>,
) -> AppResult<Json<Invoice>> {
    current_user.0.require(Resource::Invoice, Action::Edit)?;
    let new_status = body.status.parse::<InvoiceStatus>()?;
    let service = InvoiceService::new(state.db.clone(), &state.config);
    let invoice = service
        .update_status(current_user.0.user_id, invoice_id, new_status)
        .await?;
    Ok(Json(invoice))
}

/// Invoice as a PDF download
pub async fn invoice_pdf(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(invoice_id): Path<Uuid>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Invoice, Action::Export)?;
    let service = InvoiceService::new(state.db.clone(), &state.config);
    let detail = service.get_detail(invoice_id).await?;
    let bytes = pdf::render_invoice(&state.config.company, &detail)?;
    service
        .record_export(current_user.0.user_id, &detail.invoice)
        .await?;

    let file_name = invoice_file_name(&detail.invoice.number, &detail.invoice.client_name);
    Ok(pdf_response(&file_name, bytes))
}
