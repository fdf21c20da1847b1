//! Main dashboard and tabular export

use serde::Serialize;
use sqlx::PgPool;

use crate::error::{AppError, AppResult};
use crate::services::order::{Order, ORDER_SELECT};

/// Reporting service
#[derive(Clone)]
pub struct ReportingService {
    db: PgPool,
}

/// Figures on the home dashboard
#[derive(Debug, Serialize)]
pub struct DashboardMetrics {
    pub total_orders: i64,
    /// Orders in preparation or shipped
    pub orders_in_progress: i64,
    /// Invoices issued or sent but not yet paid
    pub unpaid_invoices: i64,
    pub recent_orders: Vec<Order>,
}

impl ReportingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Home dashboard
    pub async fn dashboard(&self) -> AppResult<DashboardMetrics> {
        let (total_orders, orders_in_progress) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('preparation', 'shipped'))
            FROM orders
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let unpaid_invoices = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM invoices WHERE status IN ('issued', 'sent')",
        )
        .fetch_one(&self.db)
        .await?;

        let recent_orders = sqlx::query_as::<_, Order>(&format!(
            "{} ORDER BY o.created_at DESC LIMIT 5",
            ORDER_SELECT
        ))
        .fetch_all(&self.db)
        .await?;

        Ok(DashboardMetrics {
            total_orders,
            orders_in_progress,
            unpaid_invoices,
            recent_orders,
        })
    }

    /// Serialize flat records to CSV with a header row
    pub fn export_to_csv<T: Serialize>(data: &[T]) -> AppResult<String> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in data {
            wtr.serialize(record)
                .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[derive(Serialize)]
    struct Row {
        code: &'static str,
        name: &'static str,
        quantity: Decimal,
        alert: Option<bool>,
    }

    #[test]
    fn csv_has_header_and_quotes_commas() {
        let rows = [
            Row {
                code: "PROD1",
                name: "Thon rouge",
                quantity: Decimal::new(1250, 2),
                alert: Some(false),
            },
            Row {
                code: "PROD2",
                name: "Sole, filets",
                quantity: Decimal::ZERO,
                alert: None,
            },
        ];
        let csv = ReportingService::export_to_csv(&rows).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "code,name,quantity,alert");
        assert_eq!(lines[1], "PROD1,Thon rouge,12.50,false");
        assert_eq!(lines[2], "PROD2,\"Sole, filets\",0,");
    }

    #[test]
    fn empty_export_is_empty() {
        let rows: Vec<Row> = Vec::new();
        assert_eq!(ReportingService::export_to_csv(&rows).unwrap(), "");
    }
}
