//! Vehicles, deliveries and transport legs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::services::audit::{AuditEntry, AuditService};
use shared::models::{AuditAction, DeliveryStatus, OrderType, TransportMode, TransportStatus};
use shared::numbering::NumberPrefix;
use shared::validation::{validate_non_negative, validate_positive_quantity};

/// Delivery and transport service
#[derive(Clone)]
pub struct DeliveryService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub name: String,
    pub driver: Option<String>,
    pub capacity_kg: Decimal,
    pub registration: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

const VEHICLE_COLUMNS: &str = "id, name, driver, capacity_kg, registration, is_active, created_at";

/// Delivery of an order by one of the company's vehicles
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Delivery {
    pub id: Uuid,
    pub order_id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle_name: String,
    pub number: String,
    pub delivered_at: DateTime<Utc>,
    pub address: String,
    pub fee: Decimal,
    #[sqlx(try_from = "String")]
    pub status: DeliveryStatus,
    pub driver: Option<String>,
    pub client_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const DELIVERY_SELECT: &str = r#"
    SELECT d.id, d.order_id, d.vehicle_id, v.name AS vehicle_name, d.number, d.delivered_at,
           d.address, d.fee, d.status, d.driver, d.client_signature, d.created_at, d.updated_at
    FROM deliveries d
    JOIN vehicles v ON v.id = d.vehicle_id
"#;

/// One leg of an export or import shipment
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TransportLeg {
    pub id: Uuid,
    pub order_id: Uuid,
    #[sqlx(try_from = "String")]
    pub mode: TransportMode,
    pub carrier: String,
    pub departure_date: NaiveDate,
    pub container_number: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: TransportStatus,
    pub cost: Decimal,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const LEG_COLUMNS: &str = "id, order_id, mode, carrier, departure_date, container_number, status, \
     cost, tracking_number, created_at, updated_at";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVehicleInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 100))]
    pub driver: Option<String>,
    pub capacity_kg: Decimal,
    #[validate(length(min = 1, max = 20))]
    pub registration: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateDeliveryInput {
    pub vehicle_id: Uuid,
    pub delivered_at: DateTime<Utc>,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    pub fee: Option<Decimal>,
    /// Defaults to the vehicle's driver
    #[validate(length(max = 100))]
    pub driver: Option<String>,
    pub client_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDeliveryStatusInput {
    pub status: DeliveryStatus,
    pub client_signature: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTransportLegInput {
    pub mode: TransportMode,
    #[validate(length(min = 1, max = 100))]
    pub carrier: String,
    pub departure_date: NaiveDate,
    #[validate(length(max = 50))]
    pub container_number: Option<String>,
    pub cost: Option<Decimal>,
    #[validate(length(max = 100))]
    pub tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTransportLegInput {
    pub status: TransportStatus,
    pub tracking_number: Option<String>,
}

impl DeliveryService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ------------------------------------------------------------------
    // Vehicles
    // ------------------------------------------------------------------

    pub async fn create_vehicle(&self, user_id: Uuid, input: CreateVehicleInput) -> AppResult<Vehicle> {
        input.validate()?;
        validate_positive_quantity(input.capacity_kg).map_err(AppError::invalid_field("capacity_kg"))?;

        let registration = input.registration.trim().to_uppercase();
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM vehicles WHERE registration = $1)",
        )
        .bind(&registration)
        .fetch_one(&self.db)
        .await?;
        if exists {
            return Err(AppError::Conflict {
                resource: "registration".to_string(),
                message: format!("Vehicle {} already exists", registration),
                message_fr: format!("Le véhicule {} existe déjà", registration),
            });
        }

        let vehicle = sqlx::query_as::<_, Vehicle>(&format!(
            r#"
            INSERT INTO vehicles (name, driver, capacity_kg, registration)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            VEHICLE_COLUMNS
        ))
        .bind(input.name.trim())
        .bind(&input.driver)
        .bind(input.capacity_kg)
        .bind(&registration)
        .fetch_one(&self.db)
        .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Create, "Vehicle", vehicle.id, &vehicle.registration),
        )
        .await?;

        Ok(vehicle)
    }

    /// Vehicles ordered by name; inactive ones only on request
    pub async fn list_vehicles(&self, include_inactive: bool) -> AppResult<Vec<Vehicle>> {
        let vehicles = sqlx::query_as::<_, Vehicle>(&format!(
            "SELECT {} FROM vehicles WHERE ($1 OR is_active = true) ORDER BY name",
            VEHICLE_COLUMNS
        ))
        .bind(include_inactive)
        .fetch_all(&self.db)
        .await?;
        Ok(vehicles)
    }

    pub async fn deactivate_vehicle(&self, user_id: Uuid, vehicle_id: Uuid) -> AppResult<()> {
        let registration = sqlx::query_scalar::<_, String>(
            "UPDATE vehicles SET is_active = false WHERE id = $1 AND is_active = true RETURNING registration",
        )
        .bind(vehicle_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Delete, "Vehicle", vehicle_id, &registration),
        )
        .await
    }

    // ------------------------------------------------------------------
    // Deliveries
    // ------------------------------------------------------------------

    pub async fn deliveries_for_order(db: &PgPool, order_id: Uuid) -> AppResult<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(&format!(
            "{} WHERE d.order_id = $1 ORDER BY d.delivered_at",
            DELIVERY_SELECT
        ))
        .bind(order_id)
        .fetch_all(db)
        .await?;
        Ok(deliveries)
    }

    async fn get_delivery(&self, delivery_id: Uuid) -> AppResult<Delivery> {
        sqlx::query_as::<_, Delivery>(&format!("{} WHERE d.id = $1", DELIVERY_SELECT))
            .bind(delivery_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Delivery".to_string()))
    }

    /// Schedule a delivery for an order
    pub async fn add_delivery(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        input: CreateDeliveryInput,
    ) -> AppResult<Delivery> {
        input.validate()?;
        let fee = input.fee.unwrap_or(Decimal::ZERO);
        validate_non_negative(fee).map_err(AppError::invalid_field("fee"))?;

        let order_number = sqlx::query_scalar::<_, String>("SELECT number FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let (is_active, vehicle_driver) = sqlx::query_as::<_, (bool, Option<String>)>(
            "SELECT is_active, driver FROM vehicles WHERE id = $1",
        )
        .bind(input.vehicle_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))?;
        if !is_active {
            return Err(AppError::validation(
                "vehicle_id",
                "Vehicle is no longer in service",
                "Ce véhicule n'est plus en service",
            ));
        }

        let number = NumberPrefix::Delivery.generate_now();
        let delivery_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO deliveries (order_id, vehicle_id, number, delivered_at, address, fee,
                                    status, driver, client_signature)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(order_id)
        .bind(input.vehicle_id)
        .bind(&number)
        .bind(input.delivered_at)
        .bind(input.address.trim())
        .bind(fee)
        .bind(DeliveryStatus::Pending.as_str())
        .bind(input.driver.or(vehicle_driver))
        .bind(&input.client_signature)
        .fetch_one(&self.db)
        .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(user_id, AuditAction::Create, "Delivery", delivery_id, &number)
                .with_details(json!({ "order": order_number })),
        )
        .await?;

        tracing::info!(%number, order = %order_number, "Delivery scheduled");
        self.get_delivery(delivery_id).await
    }

    pub async fn update_delivery_status(
        &self,
        user_id: Uuid,
        delivery_id: Uuid,
        input: UpdateDeliveryStatusInput,
    ) -> AppResult<Delivery> {
        let mut tx = self.db.begin().await?;

        let (number, current) = sqlx::query_as::<_, (String, String)>(
            "SELECT number, status FROM deliveries WHERE id = $1 FOR UPDATE",
        )
        .bind(delivery_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Delivery".to_string()))?;
        let current: DeliveryStatus = current.parse()?;
        current.check_transition(input.status)?;

        sqlx::query(
            r#"
            UPDATE deliveries
            SET status = $2, client_signature = COALESCE($3, client_signature), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(delivery_id)
        .bind(input.status.as_str())
        .bind(&input.client_signature)
        .execute(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Update, "Delivery", delivery_id, &number)
                .with_details(json!({ "old_status": current, "new_status": input.status })),
        )
        .await?;

        tx.commit().await?;
        self.get_delivery(delivery_id).await
    }

    // ------------------------------------------------------------------
    // Transport legs
    // ------------------------------------------------------------------

    pub async fn legs_for_order(db: &PgPool, order_id: Uuid) -> AppResult<Vec<TransportLeg>> {
        let legs = sqlx::query_as::<_, TransportLeg>(&format!(
            "SELECT {} FROM transport_legs WHERE order_id = $1 ORDER BY departure_date, created_at",
            LEG_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(db)
        .await?;
        Ok(legs)
    }

    /// Add a transport leg; local orders travel by delivery only
    pub async fn add_transport_leg(
        &self,
        user_id: Uuid,
        order_id: Uuid,
        input: CreateTransportLegInput,
    ) -> AppResult<TransportLeg> {
        input.validate()?;
        let cost = input.cost.unwrap_or(Decimal::ZERO);
        validate_non_negative(cost).map_err(AppError::invalid_field("cost"))?;

        let (order_number, order_type) = sqlx::query_as::<_, (String, String)>(
            "SELECT number, order_type FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        let order_type: OrderType = order_type.parse()?;
        if order_type == OrderType::Local {
            return Err(AppError::validation(
                "order_id",
                "Transport legs are not available for local orders",
                "Les étapes de transport ne sont pas disponibles pour les commandes locales",
            ));
        }

        let leg = sqlx::query_as::<_, TransportLeg>(&format!(
            r#"
            INSERT INTO transport_legs (order_id, mode, carrier, departure_date, container_number,
                                        status, cost, tracking_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            LEG_COLUMNS
        ))
        .bind(order_id)
        .bind(input.mode.as_str())
        .bind(input.carrier.trim())
        .bind(input.departure_date)
        .bind(&input.container_number)
        .bind(TransportStatus::Waiting.as_str())
        .bind(cost)
        .bind(&input.tracking_number)
        .fetch_one(&self.db)
        .await?;

        AuditService::record(
            &self.db,
            &AuditEntry::new(
                user_id,
                AuditAction::Create,
                "TransportLeg",
                leg.id,
                format!("{} - {} {}", order_number, leg.mode, leg.carrier),
            ),
        )
        .await?;

        Ok(leg)
    }

    pub async fn update_transport_leg(
        &self,
        user_id: Uuid,
        leg_id: Uuid,
        input: UpdateTransportLegInput,
    ) -> AppResult<TransportLeg> {
        let mut tx = self.db.begin().await?;

        let current = sqlx::query_scalar::<_, String>(
            "SELECT status FROM transport_legs WHERE id = $1 FOR UPDATE",
        )
        .bind(leg_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Transport leg".to_string()))?;
        let current: TransportStatus = current.parse()?;
        current.check_transition(input.status)?;

        let leg = sqlx::query_as::<_, TransportLeg>(&format!(
            r#"
            UPDATE transport_legs
            SET status = $2, tracking_number = COALESCE($3, tracking_number), updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            LEG_COLUMNS
        ))
        .bind(leg_id)
        .bind(input.status.as_str())
        .bind(&input.tracking_number)
        .fetch_one(&mut *tx)
        .await?;

        AuditService::record(
            &mut *tx,
            &AuditEntry::new(user_id, AuditAction::Update, "TransportLeg", leg_id, &leg.carrier)
                .with_details(json!({ "old_status": current, "new_status": input.status })),
        )
        .await?;

        tx.commit().await?;
        Ok(leg)
    }
}
