//! Catalog mirror and per-product quantity endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{PriceList, Product, QuantityDetails, Reservation};
use inventory::InventoryError;
use inventory_store::InventoryStore;
use serde::Deserialize;

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub external_id: String,
    pub title: String,
    pub physical_count: u32,
    pub prices: PriceList,
}

#[derive(Deserialize)]
pub struct UpdateCountRequest {
    pub physical_count: u32,
}

/// POST /products: registers a catalog product with the reservation core.
#[tracing::instrument(skip(state, req), fields(external_id = %req.external_id))]
pub async fn create<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = Product::new(req.external_id, req.title, req.physical_count, req.prices);
    state
        .inventory
        .store()
        .save_product(product.clone())
        .await
        .map_err(InventoryError::from)?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    let product = state
        .inventory
        .store()
        .get_product(id)
        .await
        .map_err(InventoryError::from)?
        .ok_or(InventoryError::ProductNotFound(id))?;

    Ok(Json(product))
}

/// PUT /products/{id}/count: sets the physical count after a stock take.
#[tracing::instrument(skip(state, req))]
pub async fn update_count<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateCountRequest>,
) -> Result<Json<QuantityDetails>, ApiError> {
    let id: ProductId = parse_id(&id)?;
    state
        .inventory
        .store()
        .update_product_count(id, req.physical_count)
        .await
        .map_err(InventoryError::from)?;

    let details = state
        .inventory
        .quantities()
        .get_product_quantity_details(id)
        .await?;
    Ok(Json(details))
}

/// GET /products/{id}/quantity: physical, reserved and available counts.
#[tracing::instrument(skip(state))]
pub async fn quantity<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<QuantityDetails>, ApiError> {
    let id = parse_id(&id)?;
    let details = state
        .inventory
        .quantities()
        .get_product_quantity_details(id)
        .await?;
    Ok(Json(details))
}

/// GET /products/{id}/reservations
#[tracing::instrument(skip(state))]
pub async fn reservations<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let id = parse_id(&id)?;
    let reservations = state
        .inventory
        .ledger()
        .get_reservations_by_product(id)
        .await?;
    Ok(Json(reservations))
}
