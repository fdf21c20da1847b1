//! HTTP handlers

pub mod audit;
pub mod auth;
pub mod clients;
pub mod deliveries;
pub mod documents;
pub mod health;
pub mod invoices;
pub mod orders;
pub mod products;
pub mod reporting;
pub mod stock;
pub mod users;

use axum::{
    http::{header, HeaderName},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::error::AppResult;
use crate::services::ReportingService;

/// `?format=csv` switches list and report endpoints to a CSV download
#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

impl FormatQuery {
    pub fn is_csv(&self) -> bool {
        self.format
            .as_deref()
            .is_some_and(|f| f.eq_ignore_ascii_case("csv"))
    }
}

/// `?days=N` for chart endpoints
#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<u32>,
}

fn attachment(content_type: &str, file_name: &str, body: impl IntoResponse) -> Response {
    let headers: [(HeaderName, String); 2] = [
        (header::CONTENT_TYPE, content_type.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name.replace('"', "")),
        ),
    ];
    (headers, body).into_response()
}

/// CSV download of flat records
pub fn csv_response<T: serde::Serialize>(file_name: &str, rows: &[T]) -> AppResult<Response> {
    let csv = ReportingService::export_to_csv(rows)?;
    Ok(attachment("text/csv; charset=utf-8", file_name, csv))
}

/// PDF download
pub fn pdf_response(file_name: &str, bytes: Vec<u8>) -> Response {
    attachment("application/pdf", file_name, bytes)
}

/// Arbitrary file download
pub fn file_response(content_type: &str, file_name: &str, bytes: Vec<u8>) -> Response {
    attachment(content_type, file_name, bytes)
}
