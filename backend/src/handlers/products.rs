//! Product catalogue handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::models::{Action, Resource};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::product::{
    CreateProductInput, Product, ProductDetail, ProductFilter, ProductView, UpdateProductInput,
};
use crate::services::ProductService;
use crate::AppState;

pub async fn create_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    current_user.0.require(Resource::Product, Action::Create)?;
    let service = ProductService::new(state.db);
    let product = service.create(current_user.0.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

pub async fn list_products(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Query(filter): Query<ProductFilter>,
) -> AppResult<Json<Vec<ProductView>>> {
    current_user.0.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.list(&filter).await?))
}

/// Product with its latest movements
pub async fn get_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductDetail>> {
    current_user.0.require(Resource::Product, Action::View)?;
    let service = ProductService::new(state.db);
    Ok(Json(service.get_detail(product_id).await?))
}

pub async fn update_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> AppResult<Json<Product>> {
    current_user.0.require(Resource::Product, Action::Edit)?;
    let service = ProductService::new(state.db);
    let product = service
        .update(current_user.0.user_id, product_id, input)
        .await?;
    Ok(Json(product))
}

pub async fn delete_product(
    State(state): State<AppState>,
    current_user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    current_user.0.require(Resource::Product, Action::Delete)?;
    let service = ProductService::new(state.db);
    service.deactivate(current_user.0.user_id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
