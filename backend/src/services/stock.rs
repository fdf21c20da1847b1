//! Stock movement service: manual movements, history, dashboard and reports

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use shared::models::{
    apply_manual_movement, stock_value, AuditAction, MovementType, StockChange, StockLevel,
};
use shared::types::{month_start, DateRange, PaginatedResponse, Pagination};

/// Stock service
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

/// Stock movement with the names needed to display it
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub unit: String,
    #[sqlx(try_from = "String")]
    pub movement_type: MovementType,
    /// Signed: negative when stock left
    pub quantity: Decimal,
    pub stock_before: Decimal,
    pub stock_after: Decimal,
    pub order_id: Option<Uuid>,
    pub order_number: Option<String>,
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub(crate) const MOVEMENT_SELECT: &str = r#"
    SELECT m.id, m.product_id, p.code AS product_code, p.name AS product_name, p.unit,
           m.movement_type, m.quantity, m.stock_before, m.stock_after,
           m.order_id, o.number AS order_number, m.user_id, u.username,
           m.reason, m.created_at
    FROM stock_movements m
    JOIN products p ON p.id = m.product_id
    LEFT JOIN orders o ON o.id = m.order_id
    LEFT JOIN users u ON u.id = m.user_id
"#;

/// Input for a movement entered by hand
#[derive(Debug, Deserialize)]
pub struct ManualMovementInput {
    pub product_id: Uuid,
    pub movement_type: MovementType,
    /// Quantity moved, or the new absolute level for an adjustment
    pub quantity: Decimal,
    pub reason: Option<String>,
}

/// Filters for the movement history
#[derive(Debug, Default, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Count and absolute quantity per movement type
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TypeTotal {
    #[sqlx(try_from = "String")]
    pub movement_type: MovementType,
    pub count: i64,
    pub quantity: Decimal,
}

/// Product ranked by moved quantity
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TopMovedProduct {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub unit: String,
    pub moved_quantity: Decimal,
    pub movement_count: i64,
}

/// Per-day totals keyed by movement type
pub type DailyMovements = BTreeMap<String, BTreeMap<&'static str, Decimal>>;

/// Stock dashboard
#[derive(Debug, Serialize)]
pub struct StockDashboard {
    pub active_products: i64,
    pub products_in_alert: i64,
    pub stock_value: Decimal,
    pub movements_today: i64,
    pub recent_movements: Vec<StockMovement>,
    pub last_30_days: Vec<TypeTotal>,
    pub last_7_days: DailyMovements,
    pub top_products: Vec<TopMovedProduct>,
}

/// One row of the stock report
#[derive(Debug, Clone, Serialize)]
pub struct StockReportLine {
    pub code: String,
    pub name: String,
    pub unit: String,
    pub stock_quantity: Decimal,
    pub unit_price: Decimal,
    pub value: Decimal,
    pub alert_threshold: Decimal,
    pub stock_level: StockLevel,
}

/// Stock report
#[derive(Debug, Serialize)]
pub struct StockReport {
    pub generated_at: DateTime<Utc>,
    pub lines: Vec<StockReportLine>,
    pub total_value: Decimal,
    pub alert_count: usize,
    pub zero_stock_count: usize,
    pub month_to_date: Vec<TypeTotal>,
}

#[derive(Debug, FromRow)]
struct DailyRow {
    day: NaiveDate,
    movement_type: String,
    quantity: Decimal,
}

#[derive(Debug, FromRow)]
struct ValuationRow {
    code: String,
    name: String,
    unit: String,
    stock_quantity: Decimal,
    unit_price: Decimal,
    alert_threshold: Decimal,
}

/// Build a zero-filled per-day, per-type table
fn daily_table(range: &DateRange, rows: &[(NaiveDate, MovementType, Decimal)]) -> DailyMovements {
    range
        .days()
        .into_iter()
        .map(|day| {
            let totals = MovementType::ALL
                .iter()
                .map(|t| {
                    let quantity = rows
                        .iter()
                        .filter(|(d, rt, _)| *d == day && rt == t)
                        .map(|(_, _, q)| *q)
                        .sum();
                    (t.as_str(), quantity)
                })
                .collect();
            (day.to_string(), totals)
        })
        .collect()
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Persist a movement and the product's new stock level.
    ///
    /// The caller must hold the product row lock (`SELECT ... FOR UPDATE`)
    /// on the same connection and must have computed `change` from the
    /// locked stock level.
    pub async fn insert_movement(
        conn: &mut PgConnection,
        product_id: Uuid,
        movement_type: MovementType,
        change: &StockChange,
        order_id: Option<Uuid>,
        user_id: Option<Uuid>,
        reason: Option<&str>,
    ) -> AppResult<Uuid> {
        let movement_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO stock_movements (product_id, movement_type, quantity, stock_before,
                                         stock_after, order_id, user_id, reason)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(product_id)
        .bind(movement_type.as_str())
        .bind(change.delta)
        .bind(change.stock_before)
        .bind(change.stock_after)
        .bind(order_id)
        .bind(user_id)
        .bind(reason)
        .fetch_one(&mut *conn)
        .await?;

        sqlx::query("UPDATE products SET stock_quantity = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(change.stock_after)
            .execute(&mut *conn)
            .await?;

        tracing::info!(
            %product_id,
            movement_type = movement_type.as_str(),
            delta = %change.delta,
            stock_after = %change.stock_after,
            "Stock movement recorded"
        );

        Ok(movement_id)
    }

    /// Lock a product row and return its name and stock level
    pub async fn lock_product(
        conn: &mut PgConnection,
        product_id: Uuid,
    ) -> AppResult<(String, Decimal)> {
        sqlx::query_as::<_, (String, Decimal)>(
            "SELECT name, stock_quantity FROM products WHERE id = $1 AND is_active = true FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    async fn get_movement(&self, movement_id: Uuid) -> AppResult<StockMovement> {
        sqlx::query_as::<_, StockMovement>(&format!("{} WHERE m.id = $1", MOVEMENT_SELECT))
            .bind(movement_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Stock movement".to_string()))
    }

    /// Record a movement entered by hand
    pub async fn record_manual_movement(
        &self,
        user_id: Uuid,
        input: ManualMovementInput,
    ) -> AppResult<StockMovement> {
        let mut tx = self.db.begin().await?;

        let (name, on_hand) = Self::lock_product(&mut tx, input.product_id).await?;
        let change = apply_manual_movement(input.movement_type, on_hand, input.quantity)
            .map_err(|e| {
                tracing::warn!(product = %name, "Manual movement rejected: {}", e);
                AppError::from(e)
            })?;

        let reason = input
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());

        let movement_id = Self::insert_movement(
            &mut tx,
            input.product_id,
            input.movement_type,
            &change,
            None,
            Some(user_id),
            reason,
        )
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(
                user_id,
                AuditAction::Create,
                "StockMovement",
                movement_id,
                format!("{} {} {}", input.movement_type.as_str(), change.delta, name),
            )
            .with_details(json!({
                "product_id": input.product_id,
                "old_quantity": change.stock_before,
                "new_quantity": change.stock_after,
                "reason": reason,
            })),
        )
        .await?;

        tx.commit().await?;

        self.get_movement(movement_id).await
    }

    /// Movement history, newest first
    pub async fn history(
        &self,
        filter: &MovementFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let movement_type = filter.movement_type.map(|t| t.as_str());

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM stock_movements m
            WHERE ($1::uuid IS NULL OR m.product_id = $1)
              AND ($2::text IS NULL OR m.movement_type = $2)
              AND ($3::date IS NULL OR m.created_at::date >= $3)
              AND ($4::date IS NULL OR m.created_at::date <= $4)
            "#,
        )
        .bind(filter.product_id)
        .bind(movement_type)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.db)
        .await?;

        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            r#"
            {}
            WHERE ($1::uuid IS NULL OR m.product_id = $1)
              AND ($2::text IS NULL OR m.movement_type = $2)
              AND ($3::date IS NULL OR m.created_at::date >= $3)
              AND ($4::date IS NULL OR m.created_at::date <= $4)
            ORDER BY m.created_at DESC
            LIMIT $5 OFFSET $6
            "#,
            MOVEMENT_SELECT
        ))
        .bind(filter.product_id)
        .bind(movement_type)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(movements, pagination, total))
    }

    async fn type_totals_since(&self, since: NaiveDate) -> AppResult<Vec<TypeTotal>> {
        let totals = sqlx::query_as::<_, TypeTotal>(
            r#"
            SELECT movement_type, COUNT(*) AS count, COALESCE(SUM(ABS(quantity)), 0) AS quantity
            FROM stock_movements
            WHERE created_at::date >= $1
            GROUP BY movement_type
            ORDER BY movement_type
            "#,
        )
        .bind(since)
        .fetch_all(&self.db)
        .await?;
        Ok(totals)
    }

    /// Per-day, per-type quantities for the last `days` days
    pub async fn chart_data(&self, days: u32) -> AppResult<DailyMovements> {
        let range = DateRange::last_days(Utc::now().date_naive(), days.clamp(1, 366));

        let rows = sqlx::query_as::<_, DailyRow>(
            r#"
            SELECT created_at::date AS day, movement_type, SUM(ABS(quantity)) AS quantity
            FROM stock_movements
            WHERE created_at::date BETWEEN $1 AND $2
            GROUP BY 1, 2
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let rows: Vec<(NaiveDate, MovementType, Decimal)> = rows
            .into_iter()
            .filter_map(|r| {
                r.movement_type
                    .parse()
                    .ok()
                    .map(|t| (r.day, t, r.quantity))
            })
            .collect();

        Ok(daily_table(&range, &rows))
    }

    /// Stock dashboard
    pub async fn dashboard(&self) -> AppResult<StockDashboard> {
        let today = Utc::now().date_naive();

        let (active_products, products_in_alert, total_value) =
            sqlx::query_as::<_, (i64, i64, Decimal)>(
                r#"
                SELECT COUNT(*),
                       COUNT(*) FILTER (WHERE stock_quantity <= alert_threshold),
                       COALESCE(SUM(stock_quantity * unit_price), 0)
                FROM products WHERE is_active = true
                "#,
            )
            .fetch_one(&self.db)
            .await?;

        let movements_today = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM stock_movements WHERE created_at::date = $1",
        )
        .bind(today)
        .fetch_one(&self.db)
        .await?;

        let recent_movements = sqlx::query_as::<_, StockMovement>(&format!(
            "{} ORDER BY m.created_at DESC LIMIT 10",
            MOVEMENT_SELECT
        ))
        .fetch_all(&self.db)
        .await?;

        let since_30 = today - chrono::Duration::days(30);
        let top_products = sqlx::query_as::<_, TopMovedProduct>(
            r#"
            SELECT p.id, p.code, p.name, p.unit,
                   SUM(ABS(m.quantity)) AS moved_quantity, COUNT(m.id) AS movement_count
            FROM stock_movements m
            JOIN products p ON p.id = m.product_id
            WHERE m.created_at::date >= $1
            GROUP BY p.id, p.code, p.name, p.unit
            ORDER BY moved_quantity DESC
            LIMIT 5
            "#,
        )
        .bind(since_30)
        .fetch_all(&self.db)
        .await?;

        Ok(StockDashboard {
            active_products,
            products_in_alert,
            stock_value: total_value.round_dp(2),
            movements_today,
            recent_movements,
            last_30_days: self.type_totals_since(since_30).await?,
            last_7_days: self.chart_data(7).await?,
            top_products,
        })
    }

    /// Valuation of every active product plus this month's movement totals
    pub async fn report(&self) -> AppResult<StockReport> {
        let rows = sqlx::query_as::<_, ValuationRow>(
            r#"
            SELECT code, name, unit, stock_quantity, unit_price, alert_threshold
            FROM products WHERE is_active = true
            ORDER BY name
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        let lines: Vec<StockReportLine> = rows
            .into_iter()
            .map(|r| StockReportLine {
                value: stock_value(r.stock_quantity, r.unit_price),
                stock_level: StockLevel::of(r.stock_quantity, r.alert_threshold),
                code: r.code,
                name: r.name,
                unit: r.unit,
                stock_quantity: r.stock_quantity,
                unit_price: r.unit_price,
                alert_threshold: r.alert_threshold,
            })
            .collect();

        let total_value = lines.iter().map(|l| l.value).sum();
        let alert_count = lines
            .iter()
            .filter(|l| l.stock_quantity <= l.alert_threshold)
            .count();
        let zero_stock_count = lines
            .iter()
            .filter(|l| l.stock_level == StockLevel::OutOfStock)
            .count();

        let month_to_date = self
            .type_totals_since(month_start(Utc::now().date_naive(), 0))
            .await?;

        Ok(StockReport {
            generated_at: Utc::now(),
            lines,
            total_value,
            alert_count,
            zero_stock_count,
            month_to_date,
        })
    }

    /// Record that a stock report was exported
    pub async fn record_export(&self, user_id: Uuid, format: &str) -> AppResult<()> {
        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Export, "Product", "all", "Stock report")
                .with_details(json!({ "format": format })),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn daily_table_fills_every_day_and_type() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let range = DateRange::last_days(today, 3);
        let rows = vec![
            (today, MovementType::Out, dec("12.5")),
            (today, MovementType::In, dec("40")),
            (NaiveDate::from_ymd_opt(2024, 6, 8).unwrap(), MovementType::Return, dec("3")),
        ];

        let table = daily_table(&range, &rows);
        assert_eq!(table.len(), 3);
        assert_eq!(table["2024-06-10"]["out"], dec("12.5"));
        assert_eq!(table["2024-06-10"]["adjustment"], Decimal::ZERO);
        assert_eq!(table["2024-06-08"]["return"], dec("3"));
        assert_eq!(table["2024-06-09"].values().sum::<Decimal>(), Decimal::ZERO);
        assert!(table.values().all(|day| day.len() == MovementType::ALL.len()));
    }
}
