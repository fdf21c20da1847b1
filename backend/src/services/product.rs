//! Product catalogue service

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use crate::services::stock::{StockMovement, StockService, MOVEMENT_SELECT};
use shared::models::{
    is_in_alert, split_totals, AuditAction, MovementType, StockChange, StockLevel, DEFAULT_UNIT,
    LOW_STOCK_QUANTITY,
};
use shared::numbering::NumberPrefix;
use shared::validation::validate_non_negative;

/// Product service
#[derive(Clone)]
pub struct ProductService {
    db: PgPool,
}

/// Product record
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub unit_price: Decimal,
    pub stock_quantity: Decimal,
    pub unit: String,
    pub alert_threshold: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn stock_level(&self) -> StockLevel {
        StockLevel::of(self.stock_quantity, self.alert_threshold)
    }

    pub fn in_alert(&self) -> bool {
        is_in_alert(self.stock_quantity, self.alert_threshold)
    }
}

pub(crate) const PRODUCT_COLUMNS: &str = "id, code, name, unit_price, stock_quantity, unit, \
     alert_threshold, is_active, created_at, updated_at";

/// Product with its computed stock status
#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub stock_level: StockLevel,
    pub in_alert: bool,
}

impl From<Product> for ProductView {
    fn from(product: Product) -> Self {
        Self {
            stock_level: product.stock_level(),
            in_alert: product.in_alert(),
            product,
        }
    }
}

/// Input for creating a product
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(max = 30))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    pub unit_price: Decimal,
    pub stock_quantity: Option<Decimal>,
    #[validate(length(min = 1, max = 10))]
    pub unit: Option<String>,
    pub alert_threshold: Option<Decimal>,
}

/// Input for updating a product. Stock is changed through movements only.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProductInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    #[validate(length(min = 1, max = 10))]
    pub unit: Option<String>,
    pub alert_threshold: Option<Decimal>,
}

/// Filters for the product list
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    /// Only products at or below their alert threshold
    #[serde(default)]
    pub alert_only: bool,
    /// Only products with less than ten units left
    #[serde(default)]
    pub low_stock: bool,
}

/// Product page
#[derive(Debug, Serialize)]
pub struct ProductDetail {
    pub product: ProductView,
    pub recent_movements: Vec<StockMovement>,
    pub total_in: Decimal,
    pub total_out: Decimal,
}

impl ProductService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Create a product; a positive initial stock is booked as an `in` movement
    pub async fn create(&self, user_id: Uuid, input: CreateProductInput) -> AppResult<Product> {
        input.validate()?;
        validate_non_negative(input.unit_price).map_err(AppError::invalid_field("unit_price"))?;
        let initial = input.stock_quantity.unwrap_or(Decimal::ZERO);
        validate_non_negative(initial).map_err(AppError::invalid_field("stock_quantity"))?;
        let threshold = input.alert_threshold.unwrap_or(Decimal::ZERO);
        validate_non_negative(threshold).map_err(AppError::invalid_field("alert_threshold"))?;

        let code = input
            .code
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| NumberPrefix::Product.generate_now());

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE code = $1)",
        )
        .bind(&code)
        .fetch_one(&self.db)
        .await?;
        if exists {
            return Err(AppError::Conflict {
                resource: "code".to_string(),
                message: format!("Product code {} already exists", code),
                message_fr: format!("Le code produit {} existe déjà", code),
            });
        }

        let mut tx = self.db.begin().await?;

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            INSERT INTO products (code, name, unit_price, stock_quantity, unit, alert_threshold)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(&code)
        .bind(input.name.trim())
        .bind(input.unit_price)
        .bind(initial)
        .bind(input.unit.as_deref().unwrap_or(DEFAULT_UNIT))
        .bind(threshold)
        .fetch_one(&mut *tx)
        .await?;

        if initial > Decimal::ZERO {
            StockService::insert_movement(
                &mut tx,
                product.id,
                MovementType::In,
                &StockChange::new(Decimal::ZERO, initial),
                None,
                Some(user_id),
                Some("Initial stock at product creation"),
            )
            .await?;
        }

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Create, "Product", product.id, &product.name)
                .with_details(json!({
                    "code": product.code,
                    "initial_stock": initial,
                    "unit_price": product.unit_price,
                })),
        )
        .await?;

        tx.commit().await?;

        tracing::info!(code = %product.code, %initial, "Product created");
        Ok(product)
    }

    /// Get an active product
    pub async fn get(&self, product_id: Uuid) -> AppResult<Product> {
        sqlx::query_as::<_, Product>(&format!(
            "SELECT {} FROM products WHERE id = $1 AND is_active = true",
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// List active products ordered by name
    pub async fn list(&self, filter: &ProductFilter) -> AppResult<Vec<ProductView>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));

        let products = sqlx::query_as::<_, Product>(&format!(
            r#"
            SELECT {} FROM products
            WHERE is_active = true
              AND ($1::text IS NULL OR name ILIKE $1 OR code ILIKE $1)
              AND (NOT $2 OR stock_quantity <= alert_threshold)
              AND (NOT $3 OR stock_quantity < $4)
            ORDER BY name
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(&search)
        .bind(filter.alert_only)
        .bind(filter.low_stock)
        .bind(LOW_STOCK_QUANTITY)
        .fetch_all(&self.db)
        .await?;

        Ok(products.into_iter().map(ProductView::from).collect())
    }

    /// Product page: last 20 movements and in/out totals
    pub async fn get_detail(&self, product_id: Uuid) -> AppResult<ProductDetail> {
        let product = self.get(product_id).await?;

        let recent_movements = sqlx::query_as::<_, StockMovement>(&format!(
            "{} WHERE m.product_id = $1 ORDER BY m.created_at DESC LIMIT 20",
            MOVEMENT_SELECT
        ))
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        let deltas = sqlx::query_scalar::<_, Decimal>(
            "SELECT quantity FROM stock_movements WHERE product_id = $1",
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;
        let (total_in, total_out) = split_totals(deltas);

        Ok(ProductDetail {
            product: product.into(),
            recent_movements,
            total_in,
            total_out,
        })
    }

    /// Update catalogue fields
    pub async fn update(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> AppResult<Product> {
        input.validate()?;
        if let Some(price) = input.unit_price {
            validate_non_negative(price).map_err(AppError::invalid_field("unit_price"))?;
        }
        if let Some(threshold) = input.alert_threshold {
            validate_non_negative(threshold).map_err(AppError::invalid_field("alert_threshold"))?;
        }

        let product = sqlx::query_as::<_, Product>(&format!(
            r#"
            UPDATE products
            SET name = COALESCE($2, name),
                unit_price = COALESCE($3, unit_price),
                unit = COALESCE($4, unit),
                alert_threshold = COALESCE($5, alert_threshold),
                updated_at = NOW()
            WHERE id = $1 AND is_active = true
            RETURNING {}
            "#,
            PRODUCT_COLUMNS
        ))
        .bind(product_id)
        .bind(input.name.as_deref().map(str::trim))
        .bind(input.unit_price)
        .bind(&input.unit)
        .bind(input.alert_threshold)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Update, "Product", product.id, &product.name),
        )
        .await?;

        Ok(product)
    }

    /// Soft-delete a product
    pub async fn deactivate(&self, user_id: Uuid, product_id: Uuid) -> AppResult<()> {
        let name = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE products SET is_active = false, updated_at = NOW()
            WHERE id = $1 AND is_active = true
            RETURNING name
            "#,
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Delete, "Product", product_id, &name),
        )
        .await?;

        Ok(())
    }
}
