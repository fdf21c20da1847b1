//! Invoice service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use crate::services::client::{Client, CLIENT_COLUMNS};
use crate::services::order::{OrderLine, LINE_SELECT};
use shared::models::{
    default_due_date, order_total, AuditAction, InvoiceAmounts, InvoiceStatus, OrderStatus,
    PaymentMethod,
};
use shared::numbering::NumberPrefix;
use shared::types::{PaginatedResponse, Pagination};

/// Invoice service
#[derive(Clone)]
pub struct InvoiceService {
    db: PgPool,
    default_tax_rate: Decimal,
    due_days: i64,
}

/// Invoice with its order number and client name
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_number: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub delivery_id: Option<Uuid>,
    pub number: String,
    pub amount_excl_tax: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub amount_incl_tax: Decimal,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    #[sqlx(try_from = "String")]
    pub payment_method: PaymentMethod,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const INVOICE_SELECT: &str = r#"
    SELECT i.id, i.order_id, o.number AS order_number, i.client_id, c.company_name AS client_name,
           i.delivery_id, i.number, i.amount_excl_tax, i.tax_rate, i.tax_amount, i.amount_incl_tax,
           i.issued_at, i.due_at, i.payment_method, i.status, i.created_by, i.created_at, i.updated_at
    FROM invoices i
    JOIN orders o ON o.id = i.order_id
    JOIN clients c ON c.id = i.client_id
"#;

/// Short invoice row shown on an order page
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InvoiceSummary {
    pub id: Uuid,
    pub number: String,
    #[sqlx(try_from = "String")]
    pub status: InvoiceStatus,
    pub amount_incl_tax: Decimal,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

/// Input for generating an invoice from an order
#[derive(Debug, Deserialize)]
pub struct GenerateInvoiceInput {
    pub payment_method: PaymentMethod,
    pub tax_rate: Option<Decimal>,
    pub due_at: Option<DateTime<Utc>>,
    pub delivery_id: Option<Uuid>,
}

/// Pre-filled values for the invoice form
#[derive(Debug, Serialize)]
pub struct InvoicePreview {
    pub order_id: Uuid,
    pub order_number: String,
    pub client_name: String,
    #[serde(flatten)]
    pub amounts: InvoiceAmounts,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub lines: Vec<OrderLine>,
}

/// Invoice with everything printed on it
#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    pub invoice: Invoice,
    pub client: Client,
    pub lines: Vec<OrderLine>,
}

/// Filters for the invoice list
#[derive(Debug, Default, Deserialize)]
pub struct InvoiceFilter {
    pub search: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
}

impl InvoiceService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            default_tax_rate: config.company.default_tax_rate,
            due_days: config.company.invoice_due_days,
        }
    }

    /// Invoice rows for one order, newest first
    pub async fn list_for_order(db: &PgPool, order_id: Uuid) -> AppResult<Vec<InvoiceSummary>> {
        let invoices = sqlx::query_as::<_, InvoiceSummary>(
            r#"
            SELECT id, number, status, amount_incl_tax, issued_at, due_at
            FROM invoices WHERE order_id = $1
            ORDER BY issued_at DESC
            "#,
        )
        .bind(order_id)
        .fetch_all(db)
        .await?;
        Ok(invoices)
    }

    async fn order_lines(&self, order_id: Uuid) -> AppResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "{} WHERE l.order_id = $1 ORDER BY l.created_at",
            LINE_SELECT
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;
        Ok(lines)
    }

    /// Amounts and due date the invoice form starts from
    pub async fn preview(&self, order_id: Uuid) -> AppResult<InvoicePreview> {
        let (order_number, client_name) = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT o.number, c.company_name
            FROM orders o JOIN clients c ON c.id = o.client_id
            WHERE o.id = $1
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let lines = self.order_lines(order_id).await?;
        let amounts = InvoiceAmounts::compute(
            order_total(lines.iter().map(|l| &l.line_total)),
            self.default_tax_rate,
        )?;
        let issued_at = Utc::now();

        Ok(InvoicePreview {
            order_id,
            order_number,
            client_name,
            amounts,
            issued_at,
            due_at: default_due_date(issued_at, self.due_days),
            lines,
        })
    }

    /// Generate an invoice covering every line of an order
    pub async fn generate(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        input: GenerateInvoiceInput,
    ) -> AppResult<InvoiceDetail> {
        let mut tx = self.db.begin().await?;

        let (order_number, client_id, status) = sqlx::query_as::<_, (String, Uuid, String)>(
            "SELECT number, client_id, status FROM orders WHERE id = $1 FOR SHARE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let status: OrderStatus = status.parse()?;
        if status == OrderStatus::Cancelled {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} is cancelled and cannot be invoiced",
                order_number
            )));
        }

        let lines = sqlx::query_as::<_, (Uuid, Decimal)>(
            "SELECT id, line_total FROM order_lines WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?;
        if lines.is_empty() {
            return Err(AppError::validation(
                "order_id",
                "Order has no lines to invoice",
                "La commande n'a aucune ligne à facturer",
            ));
        }

        if let Some(delivery_id) = input.delivery_id {
            let belongs = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM deliveries WHERE id = $1 AND order_id = $2)",
            )
            .bind(delivery_id)
            .bind(order_id)
            .fetch_one(&mut *tx)
            .await?;
            if !belongs {
                return Err(AppError::NotFound("Delivery".to_string()));
            }
        }

        let amounts = InvoiceAmounts::compute(
            order_total(lines.iter().map(|(_, total)| total)),
            input.tax_rate.unwrap_or(self.default_tax_rate),
        )?;
        let issued_at = Utc::now();
        let due_at = input
            .due_at
            .unwrap_or_else(|| default_due_date(issued_at, self.due_days));
        if due_at < issued_at {
            return Err(AppError::validation(
                "due_at",
                "Due date cannot be before the issue date",
                "La date d'échéance ne peut pas précéder la date d'émission",
            ));
        }

        let number = NumberPrefix::Invoice.generate(issued_at);
        let invoice_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO invoices (order_id, client_id, delivery_id, number, amount_excl_tax,
                                  tax_rate, tax_amount, amount_incl_tax, issued_at, due_at,
                                  payment_method, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(client_id)
        .bind(input.delivery_id)
        .bind(&number)
        .bind(amounts.amount_excl_tax)
        .bind(amounts.tax_rate)
        .bind(amounts.tax_amount)
        .bind(amounts.amount_incl_tax)
        .bind(issued_at)
        .bind(due_at)
        .bind(input.payment_method.as_str())
        .bind(InvoiceStatus::Draft.as_str())
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let line_ids: Vec<Uuid> = lines.iter().map(|(id, _)| *id).collect();
        sqlx::query(
            r#"
            INSERT INTO invoice_lines (invoice_id, order_line_id)
            SELECT $1, UNNEST($2::uuid[])
            "#,
        )
        .bind(invoice_id)
        .bind(&line_ids)
        .execute(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Create, "Invoice", invoice_id, &number)
                .with_details(json!({
                    "order": order_number,
                    "amount_incl_tax": amounts.amount_incl_tax,
                    "lines": line_ids.len(),
                })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(%number, order = %order_number, total = %amounts.amount_incl_tax, "Invoice generated");
        self.get_detail(invoice_id).await
    }

    /// Get an invoice
    pub async fn get(&self, invoice_id: Uuid) -> AppResult<Invoice> {
        sqlx::query_as::<_, Invoice>(&format!("{} WHERE i.id = $1", INVOICE_SELECT))
            .bind(invoice_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Invoice".to_string()))
    }

    /// Invoice with client and invoiced lines
    pub async fn get_detail(&self, invoice_id: Uuid) -> AppResult<InvoiceDetail> {
        let invoice = self.get(invoice_id).await?;

        // Inactive clients still appear on their past invoices
        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE id = $1",
            CLIENT_COLUMNS
        ))
        .bind(invoice.client_id)
        .fetch_one(&self.db)
        .await?;

        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            r#"
            {}
            JOIN invoice_lines il ON il.order_line_id = l.id
            WHERE il.invoice_id = $1
            ORDER BY l.created_at
            "#,
            LINE_SELECT
        ))
        .bind(invoice_id)
        .fetch_all(&self.db)
        .await?;

        Ok(InvoiceDetail {
            invoice,
            client,
            lines,
        })
    }

    /// List invoices, newest first
    pub async fn list(
        &self,
        filter: &InvoiceFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Invoice>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let status = filter.status.map(|s| s.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM invoices i JOIN clients c ON c.id = i.client_id
            WHERE ($1::text IS NULL OR i.number ILIKE $1 OR c.company_name ILIKE $1)
              AND ($2::text IS NULL OR i.status = $2)
              AND ($3::uuid IS NULL OR i.client_id = $3)
            "#,
        )
        .bind(&search)
        .bind(status)
        .bind(filter.client_id)
        .fetch_one(&self.db)
        .await?;

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            {}
            WHERE ($1::text IS NULL OR i.number ILIKE $1 OR c.company_name ILIKE $1)
              AND ($2::text IS NULL OR i.status = $2)
              AND ($3::uuid IS NULL OR i.client_id = $3)
            ORDER BY i.issued_at DESC
            LIMIT $4 OFFSET $5
            "#,
            INVOICE_SELECT
        ))
        .bind(&search)
        .bind(status)
        .bind(filter.client_id)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(invoices, pagination, total))
    }

    /// Move an invoice along Draft → Issued → Sent → Paid, or cancel it
    pub async fn update_status(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        new_status: InvoiceStatus,
    ) -> AppResult<Invoice> {
        let mut tx = self.db.begin().await?;

        let (number, current) = sqlx::query_as::<_, (String, String)>(
            "SELECT number, status FROM invoices WHERE id = $1 FOR UPDATE",
        )
        .bind(invoice_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Invoice".to_string()))?;
        let current: InvoiceStatus = current.parse()?;

        current.check_transition(new_status)?;

        if current != new_status {
            sqlx::query("UPDATE invoices SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(invoice_id)
                .bind(new_status.as_str())
                .execute(&mut *tx)
                .await?;

            AuditService::record(
                &mut *tx,
                &AuditEntry::new(user_id, AuditAction::Update, "Invoice", invoice_id, &number)
                    .with_details(json!({ "old_status": current, "new_status": new_status })),
            )
            .await?;

            tracing::info!(%number, from = current.as_str(), to = new_status.as_str(), "Invoice status changed");
        }

        tx.commit().await?;
        self.get(invoice_id).await
    }

    /// Record that an invoice PDF was downloaded
    pub async fn record_export(&self, user_id: Uuid, invoice: &Invoice) -> AppResult<()> {
        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Export, "Invoice", invoice.id, &invoice.number)
                .with_details(json!({ "format": "pdf" })),
        )
        .await
    }
}

/// File name offered for an invoice PDF
pub fn invoice_file_name(number: &str, company_name: &str) -> String {
    let company: String = company_name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        .collect();
    format!("invoice_{}_{}.pdf", number, company)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_file_name_joins_company_words() {
        assert_eq!(
            invoice_file_name("FAC20240101093000123", "Atlantic Fish  Export"),
            "invoice_FAC20240101093000123_Atlantic_Fish_Export.pdf"
        );
        assert_eq!(
            invoice_file_name("FAC1", "Pêcheries \"du\" Nord"),
            "invoice_FAC1_Pêcheries_du_Nord.pdf"
        );
    }
}
