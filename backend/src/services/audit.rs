//! Audit trail service

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;

use crate::error::AppResult;
use shared::models::AuditAction;
use shared::types::{PaginatedResponse, Pagination};

/// Audit service for recording and browsing user actions
#[derive(Clone)]
pub struct AuditService {
    db: PgPool,
}

/// A recorded user action
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    #[sqlx(try_from = "String")]
    pub action: AuditAction,
    pub model_name: String,
    pub object_id: String,
    pub object_repr: String,
    pub ip_address: Option<String>,
    pub details: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Entry to write
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub model_name: &'static str,
    pub object_id: String,
    pub object_repr: String,
    pub ip_address: Option<String>,
    pub details: JsonValue,
}

impl AuditEntry {
    pub fn new(
        user_id: Uuid,
        action: AuditAction,
        model_name: &'static str,
        object_id: impl ToString,
        object_repr: impl Into<String>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            action,
            model_name,
            object_id: object_id.to_string(),
            object_repr: object_repr.into(),
            ip_address: None,
            details: JsonValue::Object(Default::default()),
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = details;
        self
    }

    pub fn with_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }
}

/// Filters for the audit listing
#[derive(Debug, Default, Deserialize)]
pub struct AuditFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub model_name: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl AuditService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Write an audit entry on any executor, so callers can include it in
    /// their own transaction
    pub async fn record<'e, E>(executor: E, entry: &AuditEntry) -> AppResult<()>
    where
        E: PgExecutor<'e>,
    {
        let object_repr: String = entry.object_repr.chars().take(200).collect();

        sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, model_name, object_id, object_repr, ip_address, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.model_name)
        .bind(&entry.object_id)
        .bind(&object_repr)
        .bind(&entry.ip_address)
        .bind(&entry.details)
        .execute(executor)
        .await?;

        tracing::debug!(
            action = entry.action.as_str(),
            model = entry.model_name,
            object_id = %entry.object_id,
            "Audit entry recorded"
        );

        Ok(())
    }

    /// Browse the audit trail, newest first
    pub async fn list(
        &self,
        filter: &AuditFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<AuditLog>> {
        let action = filter.action.map(|a| a.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM audit_logs a
            WHERE ($1::uuid IS NULL OR a.user_id = $1)
              AND ($2::text IS NULL OR a.action = $2)
              AND ($3::text IS NULL OR a.model_name = $3)
              AND ($4::date IS NULL OR a.created_at::date >= $4)
              AND ($5::date IS NULL OR a.created_at::date <= $5)
            "#,
        )
        .bind(filter.user_id)
        .bind(action)
        .bind(&filter.model_name)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.db)
        .await?;

        let logs = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT a.id, a.user_id, u.username, a.action, a.model_name, a.object_id,
                   a.object_repr, a.ip_address, a.details, a.created_at
            FROM audit_logs a
            LEFT JOIN users u ON u.id = a.user_id
            WHERE ($1::uuid IS NULL OR a.user_id = $1)
              AND ($2::text IS NULL OR a.action = $2)
              AND ($3::text IS NULL OR a.model_name = $3)
              AND ($4::date IS NULL OR a.created_at::date >= $4)
              AND ($5::date IS NULL OR a.created_at::date <= $5)
            ORDER BY a.created_at DESC
            LIMIT $6 OFFSET $7
            "#,
        )
        .bind(filter.user_id)
        .bind(action)
        .bind(&filter.model_name)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(logs, pagination, total))
    }
}
