//! Direct hold management: reserve, release, release by order and by author.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId, ReservationId, UserId};
use domain::Reservation;
use inventory_store::InventoryStore;
use serde::{Deserialize, Serialize};

use super::{AppState, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ReserveRequest {
    pub product: ProductId,
    pub author: UserId,
    pub order: OrderId,
    pub quantity: u32,
    #[serde(default)]
    pub for_stock: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseQuery {
    pub product: ProductId,
    pub author: UserId,
    pub order: OrderId,
}

#[derive(Serialize)]
pub struct ReservedResponse {
    pub reservation_id: ReservationId,
}

#[derive(Serialize)]
pub struct ReleasedResponse {
    pub released: usize,
}

/// POST /reservations: creates or re-quantifies the hold of an order on a product.
///
/// The author must be allowed to reserve and the units must be available.
#[tracing::instrument(skip(state, req), fields(product = %req.product, order = %req.order))]
pub async fn reserve<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ReserveRequest>,
) -> Result<(StatusCode, Json<ReservedResponse>), ApiError> {
    let reservation_id = state
        .inventory
        .reserve(req.product, req.author, req.quantity, req.order, req.for_stock)
        .await?;

    Ok((StatusCode::CREATED, Json(ReservedResponse { reservation_id })))
}

/// DELETE /reservations?product=&author=&order=: releases one hold.
///
/// Releasing a hold that does not exist succeeds with `released: 0`.
#[tracing::instrument(skip(state))]
pub async fn release<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ReleaseQuery>,
) -> Result<Json<ReleasedResponse>, ApiError> {
    let removed = state
        .inventory
        .ledger()
        .remove_reservation(query.product, query.author, query.order)
        .await?;

    Ok(Json(ReleasedResponse {
        released: usize::from(removed.is_some()),
    }))
}

/// DELETE /reservations/orders/{id}
#[tracing::instrument(skip(state))]
pub async fn release_by_order<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReleasedResponse>, ApiError> {
    let order = parse_id(&id)?;
    let released = state
        .inventory
        .ledger()
        .remove_reservation_by_order_id(order)
        .await?;
    Ok(Json(ReleasedResponse { released }))
}

/// GET /reservations/users/{id}
#[tracing::instrument(skip(state))]
pub async fn list_for_user<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reservation>>, ApiError> {
    let author = parse_id(&id)?;
    let reservations = state.inventory.ledger().get_user_reservations(author).await?;
    Ok(Json(reservations))
}

/// DELETE /reservations/users/{id}: releases every hold of an author.
#[tracing::instrument(skip(state))]
pub async fn release_for_user<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ReleasedResponse>, ApiError> {
    let author = parse_id(&id)?;
    let released = state
        .inventory
        .ledger()
        .remove_all_user_reservations(author)
        .await?;
    Ok(Json(ReleasedResponse { released }))
}
