//! Order document handlers: uploads, downloads and purchase orders

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Response,
    Json,
};
use shared::models::{Action, DocumentType, Resource};
use uuid::Uuid;

use super::file_response;
use crate::error::{AppError, AppResult};
use crate::middleware::CurrentUser;
use crate::services::document::{Document, DocumentFile, NewDocument};
use crate::services::DocumentService;
use crate::AppState;

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::validation(
        "file",
        &format!("Invalid upload: {}", e),
        "Téléversement invalide",
    )
}

/// Read the `file`, `name`, `doc_type` and `number` fields of an upload
async fn read_upload(mut multipart: Multipart) -> AppResult<NewDocument> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut name: Option<String> = None;
    let mut doc_type: Option<String> = None;
    let mut number: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name().unwrap_or_default() {
            "file" => {
                let file_name = field.file_name().unwrap_or("document").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, bytes.to_vec()));
            }
            "name" => name = Some(field.text().await.map_err(multipart_error)?),
            "doc_type" => doc_type = Some(field.text().await.map_err(multipart_error)?),
            "number" => number = Some(field.text().await.map_err(multipart_error)?),
            _ => {}
        }
    }

    let (file_name, bytes) = file
        .ok_or_else(|| AppError::validation("file", "No file provided", "Aucun fichier fourni"))?;
    let doc_type: DocumentType = doc_type
        .ok_or_else(|| {
            AppError::validation("doc_type", "Document type is required", "Type de document requis")
        })?
        .trim()
        .parse()?;

    Ok(NewDocument {
        name: name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| file_name.clone()),
        doc_type,
        number: number.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
        file_name,
        bytes,
    })
}

fn serve(file: DocumentFile) -> Response {
    file_response(file.content_type, &file.file_name, file.bytes)
}

/// Attach a file to an order
pub async fn upload_document(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Document>)> {
    current_user.0.require(Resource::Document, Action::Create)?;
    let upload = read_upload(multipart).await?;
    let service = DocumentService::new(state.db.clone(), &state.config);
    let document = service
        .upload(current_user.0.user_id, order_id, upload)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

pub async fn download_document(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Document, Action::View)?;
    let service = DocumentService::new(state.db.clone(), &state.config);
    Ok(serve(service.download(document_id).await?))
}

pub async fn delete_document(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Document, Action::Delete)?;
    let service = DocumentService::new(state.db.clone(), &state.config);
    service.delete(current_user.0.user_id, document_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Flag a document as handed to the customs agency
pub async fn mark_sent_to_agency(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(document_id): Path<Uuid>,
) -> AppResult<Json<Document>> {
    current_user.0.require(Resource::Document, Action::Edit)?;
    let service = DocumentService::new(state.db.clone(), &state.config);
    let document = service
        .mark_sent_to_agency(current_user.0.user_id, document_id)
        .await?;
    Ok(Json(document))
}

pub async fn generate_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<(StatusCode, Json<Document>)> {
    current_user.0.require(Resource::Document, Action::Create)?;
    let service = DocumentService::new(state.db.clone(), &state.config);
    let document = service
        .generate_purchase_order(current_user.0.user_id, order_id)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Purchase order PDF, generated on first download
pub async fn download_purchase_order(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Response> {
    current_user.0.require(Resource::Document, Action::View)?;
    let service = DocumentService::new(state.db.clone(), &state.config);
    let file = service
        .download_purchase_order(current_user.0.user_id, order_id)
        .await?;
    Ok(serve(file))
}
