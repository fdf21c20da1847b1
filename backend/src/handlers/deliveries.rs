//! Vehicle, local delivery and export transport handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::models::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::delivery::{
    CreateDeliveryInput, CreateTransportLegInput, CreateVehicleInput, Delivery, TransportLeg,
    UpdateDeliveryStatusInput, UpdateTransportLegInput, Vehicle,
};
use crate::services::DeliveryService;
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct VehicleQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

pub async fn list_vehicles(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(query): Query<VehicleQuery>,
) -> AppResult<Json<Vec<Vehicle>>> {
    current_user.0.require(Resource::Delivery, Action::View)?;
    let service = DeliveryService::new(state.db);
    Ok(Json(service.list_vehicles(query.include_inactive).await?))
}

pub async fn create_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateVehicleInput>,
) -> AppResult<(StatusCode, Json<Vehicle>)> {
    current_user.0.require(Resource::Delivery, Action::Create)?;
    let service = DeliveryService::new(state.db);
    let vehicle = service.create_vehicle(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn delete_vehicle(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(vehicle_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Delivery, Action::Delete)?;
    let service = DeliveryService::new(state.db);
    service
        .deactivate_vehicle(current_user.0.user_id, vehicle_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_order_deliveries(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<Delivery>>> {
    current_user.0.require(Resource::Delivery, Action::View)?;
    Ok(Json(
        DeliveryService::deliveries_for_order(&state.db, order_id).await?,
    ))
}

/// Schedule a local delivery for an order
pub async fn create_delivery(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<CreateDeliveryInput>,
) -> AppResult<(StatusCode, Json<Delivery>)> {
    current_user.0.require(Resource::Delivery, Action::Create)?;
    let service = DeliveryService::new(state.db);
    let delivery = service
        .add_delivery(current_user.0.user_id, order_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

pub async fn update_delivery_status(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(delivery_id): Path<Uuid>,
    Json(input): Json<UpdateDeliveryStatusInput>,
) -> AppResult<Json<Delivery>> {
    current_user.0.require(Resource::Delivery, Action::Edit)?;
    let service = DeliveryService::new(state.db);
    let delivery = service
        .update_delivery_status(current_user.0.user_id, delivery_id, input)
        .await?;
    Ok(Json(delivery))
}

pub async fn list_transport_legs(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<Vec<TransportLeg>>> {
    current_user.0.require(Resource::Delivery, Action::View)?;
    Ok(Json(DeliveryService::legs_for_order(&state.db, order_id).await?))
}

/// Add a leg to an export shipment
pub async fn create_transport_leg(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<CreateTransportLegInput>,
) -> AppResult<(StatusCode, Json<TransportLeg>)> {
    current_user.0.require(Resource::Delivery, Action::Create)?;
    let service = DeliveryService::new(state.db);
    let leg = service
        .add_transport_leg(current_user.0.user_id, order_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(leg)))
}

pub async fn update_transport_leg(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(leg_id): Path<Uuid>,
    Json(input): Json<UpdateTransportLegInput>,
) -> AppResult<Json<TransportLeg>> {
    current_user.0.require(Resource::Delivery, Action::Edit)?;
    let service = DeliveryService::new(state.db);
    let leg = service
        .update_transport_leg(current_user.0.user_id, leg_id, input)
        .await?;
    Ok(Json(leg))
}
