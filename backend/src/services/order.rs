//! Order service: order lifecycle, lines and stock reconciliation

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use crate::services::delivery::{Delivery, DeliveryService, TransportLeg};
use crate::services::document::{Document, DocumentService};
use crate::services::invoice::{InvoiceService, InvoiceSummary};
use crate::services::stock::{StockMovement, StockService, MOVEMENT_SELECT};
use shared::models::{line_total, order_total, AuditAction, Incoterm, OrderStatus, OrderType};
use shared::numbering::NumberPrefix;
use shared::reconciliation::{plan_status_change, LineDemand, StatusChange, StockWarning};
use shared::types::{month_start, DateRange, PaginatedResponse, Pagination};
use shared::validation::{validate_non_negative, validate_positive_quantity};

/// Order service
#[derive(Clone)]
pub struct OrderService {
    db: PgPool,
}

/// Order with its client name and total
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub number: String,
    #[sqlx(try_from = "String")]
    pub order_type: OrderType,
    pub client_id: Uuid,
    pub client_name: String,
    #[sqlx(try_from = "String")]
    pub status: OrderStatus,
    pub incoterm: Option<String>,
    pub comment: Option<String>,
    pub shipping_date: Option<NaiveDate>,
    pub created_by: Option<Uuid>,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const ORDER_SELECT: &str = r#"
    SELECT o.id, o.number, o.order_type, o.client_id, c.company_name AS client_name,
           o.status, o.incoterm, o.comment, o.shipping_date, o.created_by,
           COALESCE((SELECT SUM(l.line_total) FROM order_lines l WHERE l.order_id = o.id), 0) AS total,
           o.created_at, o.updated_at
    FROM orders o
    JOIN clients c ON c.id = o.client_id
"#;

/// Order line with product details
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_code: String,
    pub product_name: String,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

pub(crate) const LINE_SELECT: &str = r#"
    SELECT l.id, l.order_id, l.product_id, p.code AS product_code, p.name AS product_name,
           p.unit, l.quantity, l.unit_price, l.line_total
    FROM order_lines l
    JOIN products p ON p.id = l.product_id
"#;

/// Input for creating an order
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrderInput {
    pub order_type: OrderType,
    pub client_id: Uuid,
    pub incoterm: Option<Incoterm>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
    pub shipping_date: Option<NaiveDate>,
}

/// Input for updating an order header
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrderInput {
    pub order_type: Option<OrderType>,
    pub client_id: Option<Uuid>,
    pub incoterm: Option<Incoterm>,
    #[validate(length(max = 2000))]
    pub comment: Option<String>,
    pub shipping_date: Option<NaiveDate>,
}

/// Input for adding a line
#[derive(Debug, Deserialize)]
pub struct AddLineInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
    /// Defaults to the product's current price
    pub unit_price: Option<Decimal>,
}

/// Input for changing a line
#[derive(Debug, Default, Deserialize)]
pub struct UpdateLineInput {
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
}

/// Filters for the order list
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub search: Option<String>,
    pub status: Option<OrderStatus>,
    pub order_type: Option<OrderType>,
    pub client_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Everything shown on the order page
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub documents: Vec<Document>,
    pub invoices: Vec<InvoiceSummary>,
    pub deliveries: Vec<Delivery>,
    pub transport_legs: Vec<TransportLeg>,
    pub stock_movements: Vec<StockMovement>,
    pub total: Decimal,
}

/// Outcome of a status change
#[derive(Debug, Serialize)]
pub struct StatusChangeResult {
    pub order: Order,
    pub previous_status: OrderStatus,
    pub movements: Vec<StockMovement>,
    pub warnings: Vec<StockWarning>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TypeCount {
    pub order_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct MonthlyRevenue {
    pub month: NaiveDate,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ClientRevenue {
    pub client_id: Uuid,
    pub company_name: String,
    pub orders: i64,
    pub revenue: Decimal,
}

/// Orders dashboard
#[derive(Debug, Serialize)]
pub struct OrdersDashboard {
    pub total_orders: i64,
    pub in_progress: i64,
    pub delivered: i64,
    pub revenue: Decimal,
    pub recent_orders: Vec<Order>,
    pub by_status: Vec<StatusCount>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
}

/// Period for the orders report; defaults to the last 30 days
#[derive(Debug, Default, Deserialize)]
pub struct ReportPeriod {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Orders report
#[derive(Debug, Serialize)]
pub struct OrdersReport {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub total_orders: i64,
    pub revenue: Decimal,
    pub average_basket: Decimal,
    pub by_status: Vec<StatusCount>,
    pub by_type: Vec<TypeCount>,
    pub top_clients: Vec<ClientRevenue>,
    pub orders: Vec<Order>,
}

#[derive(Debug, FromRow)]
struct DemandRow {
    product_id: Uuid,
    product_name: String,
    unit: String,
    quantity: Decimal,
}

/// Revenue divided by order count, zero when there are no orders
pub fn average_basket(revenue: Decimal, total_orders: i64) -> Decimal {
    if total_orders <= 0 {
        return Decimal::ZERO;
    }
    (revenue / Decimal::from(total_orders)).round_dp(2)
}

fn fill_revenue_months(today: NaiveDate, months: u32, rows: &[MonthlyRevenue]) -> Vec<MonthlyRevenue> {
    (0..months)
        .rev()
        .map(|back| {
            let month = month_start(today, back);
            let revenue = rows
                .iter()
                .find(|r| r.month == month)
                .map(|r| r.revenue)
                .unwrap_or(Decimal::ZERO);
            MonthlyRevenue { month, revenue }
        })
        .collect()
}

fn fill_revenue_days(range: &DateRange, rows: &[DailyRevenue]) -> Vec<DailyRevenue> {
    range
        .days()
        .into_iter()
        .map(|date| DailyRevenue {
            date,
            revenue: rows
                .iter()
                .find(|r| r.date == date)
                .map(|r| r.revenue)
                .unwrap_or(Decimal::ZERO),
        })
        .collect()
}

fn lines_locked(number: &str, status: OrderStatus) -> AppError {
    AppError::InvalidStateTransition(format!(
        "order {} is {}; lines can only be edited while it is a draft",
        number, status
    ))
}

impl OrderService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a draft order
    pub async fn create(&self, user_id: Uuid, input: CreateOrderInput) -> AppResult<Order> {
        input.validate()?;
        self.ensure_client(input.client_id).await?;

        let number = NumberPrefix::Order.generate_now();
        let order_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO orders (number, order_type, client_id, status, incoterm, comment,
                                shipping_date, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&number)
        .bind(input.order_type.as_str())
        .bind(input.client_id)
        .bind(OrderStatus::Draft.as_str())
        .bind(input.incoterm.map(|i| i.as_str()))
        .bind(&input.comment)
        .bind(input.shipping_date)
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Create, "Order", order_id, &number)
                .with_details(json!({
                    "order_type": input.order_type,
                    "client_id": input.client_id,
                })),
        )
        .await?;

        tracing::info!(%number, order_type = input.order_type.as_str(), "Order created");
        self.get(order_id).await
    }

    async fn ensure_client(&self, client_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1 AND is_active = true)",
        )
        .bind(client_id)
        .fetch_one(&self.db)
        .await?;
        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound("Client".to_string()))
        }
    }

    /// Get an order
    pub async fn get(&self, order_id: Uuid) -> AppResult<Order> {
        sqlx::query_as::<_, Order>(&format!("{} WHERE o.id = $1", ORDER_SELECT))
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    /// Lines of an order, oldest first
    pub async fn lines(&self, order_id: Uuid) -> AppResult<Vec<OrderLine>> {
        let lines = sqlx::query_as::<_, OrderLine>(&format!(
            "{} WHERE l.order_id = $1 ORDER BY l.created_at",
            LINE_SELECT
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;
        Ok(lines)
    }

    /// List orders, newest first
    pub async fn list(
        &self,
        filter: &OrderFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<Order>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let status = filter.status.map(|s| s.as_str());
        let order_type = filter.order_type.map(|t| t.as_str());

        let conditions = r#"
            WHERE ($1::text IS NULL OR o.number ILIKE $1 OR c.company_name ILIKE $1 OR o.comment ILIKE $1)
              AND ($2::text IS NULL OR o.status = $2)
              AND ($3::text IS NULL OR o.order_type = $3)
              AND ($4::uuid IS NULL OR o.client_id = $4)
              AND ($5::date IS NULL OR o.created_at::date >= $5)
              AND ($6::date IS NULL OR o.created_at::date <= $6)
        "#;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM orders o JOIN clients c ON c.id = o.client_id {}",
            conditions
        ))
        .bind(&search)
        .bind(status)
        .bind(order_type)
        .bind(filter.client_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .fetch_one(&self.db)
        .await?;

        let orders = sqlx::query_as::<_, Order>(&format!(
            "{} {} ORDER BY o.created_at DESC LIMIT $7 OFFSET $8",
            ORDER_SELECT, conditions
        ))
        .bind(&search)
        .bind(status)
        .bind(order_type)
        .bind(filter.client_id)
        .bind(filter.date_from)
        .bind(filter.date_to)
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.db)
        .await?;

        Ok(PaginatedResponse::new(orders, pagination, total))
    }

    /// Order page
    pub async fn get_detail(&self, order_id: Uuid) -> AppResult<OrderDetail> {
        let order = self.get(order_id).await?;
        let lines = self.lines(order_id).await?;

        let documents = DocumentService::list_for_order(&self.db, order_id).await?;
        let invoices = InvoiceService::list_for_order(&self.db, order_id).await?;
        let deliveries = DeliveryService::deliveries_for_order(&self.db, order_id).await?;
        let transport_legs = DeliveryService::legs_for_order(&self.db, order_id).await?;

        let stock_movements = sqlx::query_as::<_, StockMovement>(&format!(
            "{} WHERE m.order_id = $1 ORDER BY m.created_at",
            MOVEMENT_SELECT
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        let total = order_total(lines.iter().map(|l| &l.line_total));

        Ok(OrderDetail {
            order,
            lines,
            documents,
            invoices,
            deliveries,
            transport_legs,
            stock_movements,
            total,
        })
    }

    /// Update the order header
    pub async fn update(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        input: UpdateOrderInput,
    ) -> AppResult<Order> {
        input.validate()?;
        if let Some(client_id) = input.client_id {
            self.ensure_client(client_id).await?;
        }

        let mut tx = self.db.begin().await?;
        let (number, status) = Self::lock_order(&mut tx, order_id).await?;

        // Changing the type after confirmation would invalidate the stock already moved
        if input.order_type.is_some() && !status.lines_editable() {
            return Err(AppError::InvalidStateTransition(format!(
                "order {} is {}; its type can only change while it is a draft",
                number, status
            )));
        }

        sqlx::query(
            r#"
            UPDATE orders
            SET order_type = COALESCE($2, order_type),
                client_id = COALESCE($3, client_id),
                incoterm = COALESCE($4, incoterm),
                comment = COALESCE($5, comment),
                shipping_date = COALESCE($6, shipping_date),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(order_id)
        .bind(input.order_type.map(|t| t.as_str()))
        .bind(input.client_id)
        .bind(input.incoterm.map(|i| i.as_str()))
        .bind(&input.comment)
        .bind(input.shipping_date)
        .execute(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Update, "Order", order_id, &number),
        )
        .await?;

        tx.commit().await?;
        self.get(order_id).await
    }

    /// Lock an order row and return its number and status
    async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<(String, OrderStatus)> {
        let (number, status) = sqlx::query_as::<_, (String, String)>(
            "SELECT number, status FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
        Ok((number, status.parse()?))
    }

    async fn lock_draft(conn: &mut PgConnection, order_id: Uuid) -> AppResult<String> {
        let (number, status) = Self::lock_order(conn, order_id).await?;
        if !status.lines_editable() {
            return Err(lines_locked(&number, status));
        }
        Ok(number)
    }

    async fn get_line(&self, line_id: Uuid) -> AppResult<OrderLine> {
        sqlx::query_as::<_, OrderLine>(&format!("{} WHERE l.id = $1", LINE_SELECT))
            .bind(line_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order line".to_string()))
    }

    /// Add a line to a draft order
    pub async fn add_line(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        input: AddLineInput,
    ) -> AppResult<OrderLine> {
        validate_positive_quantity(input.quantity).map_err(AppError::invalid_field("quantity"))?;

        let mut tx = self.db.begin().await?;
        let number = Self::lock_draft(&mut tx, order_id).await?;

        let (product_name, current_price) = sqlx::query_as::<_, (String, Decimal)>(
            "SELECT name, unit_price FROM products WHERE id = $1 AND is_active = true",
        )
        .bind(input.product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let unit_price = input.unit_price.unwrap_or(current_price);
        validate_non_negative(unit_price).map_err(AppError::invalid_field("unit_price"))?;

        let line_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO order_lines (order_id, product_id, quantity, unit_price, line_total)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(input.product_id)
        .bind(input.quantity)
        .bind(unit_price)
        .bind(line_total(input.quantity, unit_price))
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE orders SET updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(
                user_id,
                AuditAction::Create,
                "OrderLine",
                line_id,
                format!("{} - {}", number, product_name),
            )
            .with_details(json!({ "quantity": input.quantity, "unit_price": unit_price })),
        )
        .await?;

        tx.commit().await?;
        self.get_line(line_id).await
    }

    /// Change quantity or price of a line on a draft order
    pub async fn update_line(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        line_id: Uuid,
        input: UpdateLineInput,
    ) -> AppResult<OrderLine> {
        if let Some(quantity) = input.quantity {
            validate_positive_quantity(quantity).map_err(AppError::invalid_field("quantity"))?;
        }
        if let Some(price) = input.unit_price {
            validate_non_negative(price).map_err(AppError::invalid_field("unit_price"))?;
        }

        let mut tx = self.db.begin().await?;
        let number = Self::lock_draft(&mut tx, order_id).await?;

        let (quantity, unit_price) = sqlx::query_as::<_, (Decimal, Decimal)>(
            "SELECT quantity, unit_price FROM order_lines WHERE id = $1 AND order_id = $2",
        )
        .bind(line_id)
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order line".to_string()))?;

        let quantity = input.quantity.unwrap_or(quantity);
        let unit_price = input.unit_price.unwrap_or(unit_price);

        sqlx::query(
            "UPDATE order_lines SET quantity = $2, unit_price = $3, line_total = $4 WHERE id = $1",
        )
        .bind(line_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(line_total(quantity, unit_price))
        .execute(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Update, "OrderLine", line_id, &number)
                .with_details(json!({ "quantity": quantity, "unit_price": unit_price })),
        )
        .await?;

        tx.commit().await?;
        self.get_line(line_id).await
    }

    /// Remove a line from a draft order
    pub async fn delete_line(&self, user_id: Uuid, order_id: Uuid, line_id: Uuid) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        let number = Self::lock_draft(&mut tx, order_id).await?;

        let deleted = sqlx::query("DELETE FROM order_lines WHERE id = $1 AND order_id = $2")
            .bind(line_id)
            .bind(order_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(AppError::NotFound("Order line".to_string()));
        }

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Delete, "OrderLine", line_id, &number),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Move an order to a new status and reconcile stock.
    ///
    /// Runs in one transaction holding the order row lock and the locks of
    /// every product the order touches, so concurrent status changes and
    /// manual movements cannot interleave with the stock computation.
    pub async fn change_status(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> AppResult<StatusChangeResult> {
        let mut tx = self.db.begin().await?;

        let (number, order_type, from) = sqlx::query_as::<_, (String, String, String)>(
            "SELECT number, order_type, status FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
        let order_type: OrderType = order_type.parse()?;
        let from: OrderStatus = from.parse()?;

        from.check_transition(new_status)?;
        if from == new_status {
            tx.rollback().await?;
            return Ok(StatusChangeResult {
                order: self.get(order_id).await?,
                previous_status: from,
                movements: Vec::new(),
                warnings: Vec::new(),
                messages: Vec::new(),
            });
        }

        let lines: Vec<LineDemand> = sqlx::query_as::<_, DemandRow>(
            r#"
            SELECT l.product_id, p.name AS product_name, p.unit, l.quantity
            FROM order_lines l
            JOIN products p ON p.id = l.product_id
            WHERE l.order_id = $1
            ORDER BY l.created_at
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|r| LineDemand {
            product_id: r.product_id,
            product_name: r.product_name,
            unit: r.unit,
            quantity: r.quantity,
        })
        .collect();

        let ledger: HashMap<Uuid, Decimal> = sqlx::query_as::<_, (Uuid, Decimal)>(
            r#"
            SELECT product_id, SUM(quantity)
            FROM stock_movements
            WHERE order_id = $1
            GROUP BY product_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let mut product_ids: Vec<Uuid> = lines
            .iter()
            .map(|l| l.product_id)
            .chain(ledger.keys().copied())
            .collect();
        product_ids.sort();
        product_ids.dedup();

        // Sorted ids give a stable lock order across concurrent transactions
        let on_hand: HashMap<Uuid, Decimal> = sqlx::query_as::<_, (Uuid, Decimal)>(
            "SELECT id, stock_quantity FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
        )
        .bind(&product_ids)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let plan = plan_status_change(&StatusChange {
            order_number: &number,
            order_type,
            from,
            to: new_status,
            lines: &lines,
            on_hand: &on_hand,
            ledger: &ledger,
        })?;

        let mut movement_ids = Vec::with_capacity(plan.movements.len());
        for planned in &plan.movements {
            let id = StockService::insert_movement(
                &mut tx,
                planned.product_id,
                planned.movement_type,
                &planned.change,
                Some(order_id),
                Some(user_id),
                Some(&planned.reason),
            )
            .await?;
            movement_ids.push(id);
        }

        sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(new_status.as_str())
            .execute(&mut *tx)
            .await?;

        let messages: Vec<String> = plan.warnings.iter().map(ToString::to_string).collect();

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Update, "Order", order_id, &number).with_details(
                json!({
                    "old_status": from,
                    "new_status": new_status,
                    "movements": plan.movements,
                    "warnings": messages,
                }),
            ),
        )
        .await?;

        tx.commit().await?;

        for message in &messages {
            tracing::warn!(order = %number, "{}", message);
        }
        tracing::info!(
            order = %number,
            from = from.as_str(),
            to = new_status.as_str(),
            movements = movement_ids.len(),
            "Order status changed"
        );

        let movements = sqlx::query_as::<_, StockMovement>(&format!(
            "{} WHERE m.id = ANY($1) ORDER BY m.created_at",
            MOVEMENT_SELECT
        ))
        .bind(&movement_ids)
        .fetch_all(&self.db)
        .await?;

        Ok(StatusChangeResult {
            order: self.get(order_id).await?,
            previous_status: from,
            movements,
            warnings: plan.warnings,
            messages,
        })
    }

    async fn status_counts(&self, range: Option<&DateRange>) -> AppResult<Vec<StatusCount>> {
        let counts = sqlx::query_as::<_, StatusCount>(
            r#"
            SELECT status, COUNT(*) AS count
            FROM orders
            WHERE ($1::date IS NULL OR created_at::date BETWEEN $1 AND $2)
            GROUP BY status
            ORDER BY status
            "#,
        )
        .bind(range.map(|r| r.start))
        .bind(range.map(|r| r.end))
        .fetch_all(&self.db)
        .await?;
        Ok(counts)
    }

    /// Orders dashboard
    pub async fn dashboard(&self) -> AppResult<OrdersDashboard> {
        let (total_orders, in_progress, delivered) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status IN ('draft', 'confirmed', 'preparation', 'shipped')),
                   COUNT(*) FILTER (WHERE status = 'delivered')
            FROM orders
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let revenue = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT COALESCE(SUM(l.line_total), 0)
            FROM order_lines l
            JOIN orders o ON o.id = l.order_id
            WHERE o.status = 'delivered'
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let recent_orders = sqlx::query_as::<_, Order>(&format!(
            "{} ORDER BY o.created_at DESC LIMIT 10",
            ORDER_SELECT
        ))
        .fetch_all(&self.db)
        .await?;

        let today = Utc::now().date_naive();
        let monthly = sqlx::query_as::<_, MonthlyRevenue>(
            r#"
            SELECT date_trunc('month', o.created_at)::date AS month,
                   COALESCE(SUM(l.line_total), 0) AS revenue
            FROM orders o
            JOIN order_lines l ON l.order_id = o.id
            WHERE o.status = 'delivered' AND o.created_at >= $1
            GROUP BY 1
            "#,
        )
        .bind(month_start(today, 5))
        .fetch_all(&self.db)
        .await?;

        Ok(OrdersDashboard {
            total_orders,
            in_progress,
            delivered,
            revenue,
            recent_orders,
            by_status: self.status_counts(None).await?,
            monthly_revenue: fill_revenue_months(today, 6, &monthly),
        })
    }

    /// Orders report over a period
    pub async fn report(&self, period: &ReportPeriod) -> AppResult<OrdersReport> {
        let today = Utc::now().date_naive();
        let range = DateRange {
            start: period.date_from.unwrap_or(today - Duration::days(30)),
            end: period.date_to.unwrap_or(today),
        };
        if range.start > range.end {
            return Err(AppError::validation(
                "date_from",
                "Start date must not be after end date",
                "La date de début doit précéder la date de fin",
            ));
        }

        let orders = sqlx::query_as::<_, Order>(&format!(
            "{} WHERE o.created_at::date BETWEEN $1 AND $2 ORDER BY o.created_at DESC",
            ORDER_SELECT
        ))
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let total_orders = orders.len() as i64;
        let revenue: Decimal = orders
            .iter()
            .filter(|o| o.status == OrderStatus::Delivered)
            .map(|o| o.total)
            .sum();

        let by_type = sqlx::query_as::<_, TypeCount>(
            r#"
            SELECT order_type, COUNT(*) AS count
            FROM orders
            WHERE created_at::date BETWEEN $1 AND $2
            GROUP BY order_type
            ORDER BY order_type
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        let top_clients = sqlx::query_as::<_, ClientRevenue>(
            r#"
            SELECT c.id AS client_id, c.company_name,
                   COUNT(DISTINCT o.id) AS orders,
                   COALESCE(SUM(l.line_total), 0) AS revenue
            FROM orders o
            JOIN clients c ON c.id = o.client_id
            LEFT JOIN order_lines l ON l.order_id = o.id
            WHERE o.created_at::date BETWEEN $1 AND $2
            GROUP BY c.id, c.company_name
            ORDER BY revenue DESC
            LIMIT 10
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(OrdersReport {
            date_from: range.start,
            date_to: range.end,
            total_orders,
            revenue,
            average_basket: average_basket(revenue, total_orders),
            by_status: self.status_counts(Some(&range)).await?,
            by_type,
            top_clients,
            orders,
        })
    }

    /// Daily revenue of delivered orders over the last `days` days
    pub async fn chart_data(&self, days: u32) -> AppResult<Vec<DailyRevenue>> {
        let range = DateRange::last_days(Utc::now().date_naive(), days.clamp(1, 366));

        let rows = sqlx::query_as::<_, DailyRevenue>(
            r#"
            SELECT o.created_at::date AS date, COALESCE(SUM(l.line_total), 0) AS revenue
            FROM orders o
            JOIN order_lines l ON l.order_id = o.id
            WHERE o.status = 'delivered' AND o.created_at::date BETWEEN $1 AND $2
            GROUP BY 1
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        Ok(fill_revenue_days(&range, &rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn average_basket_handles_empty_period() {
        assert_eq!(average_basket(dec("1000"), 0), Decimal::ZERO);
        assert_eq!(average_basket(dec("1000"), 3), dec("333.33"));
        assert_eq!(average_basket(Decimal::ZERO, 4), Decimal::ZERO);
    }

    #[test]
    fn revenue_series_are_zero_filled() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        let rows = vec![MonthlyRevenue {
            month: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            revenue: dec("250.50"),
        }];
        let months = fill_revenue_months(today, 6, &rows);
        assert_eq!(months.len(), 6);
        assert_eq!(months[0].month, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(months[4].revenue, dec("250.50"));
        assert_eq!(months[5].revenue, Decimal::ZERO);

        let range = DateRange::last_days(today, 30);
        let days = fill_revenue_days(
            &range,
            &[DailyRevenue {
                date: today,
                revenue: dec("10"),
            }],
        );
        assert_eq!(days.len(), 30);
        assert_eq!(days.last().map(|d| d.revenue), Some(dec("10")));
        assert!(days[..29].iter().all(|d| d.revenue == Decimal::ZERO));
    }

    #[test]
    fn line_edit_error_names_the_status() {
        let err = lines_locked("CMD20240101120000000", OrderStatus::Confirmed);
        assert!(err.to_string().contains("confirmed"));
    }
}
