//! Customer cart and order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{ProductId, UserId};
use domain::{CustomerOrder, OrderStatus};
use inventory::{CheckoutRequest, OrderView, Page};
use inventory_store::InventoryStore;
use serde::Deserialize;

use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CartItemRequest {
    pub author: UserId,
    pub product: ProductId,
    pub quantity: u32,
}

/// Body of a status change; a missing `status` is rejected with `status_required`.
#[derive(Deserialize)]
pub struct StatusRequest<T> {
    pub status: Option<T>,
}

#[derive(Deserialize)]
pub struct AuthorQuery {
    pub author: UserId,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl AuthorQuery {
    fn page(&self) -> Page {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
        .page()
    }
}

// -- Handlers --

/// POST /orders/cart/items: adds units of a product to the author's cart.
#[tracing::instrument(skip(state, req), fields(author = %req.author, product = %req.product))]
pub async fn add_cart_item<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CartItemRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let view = state
        .inventory
        .orders()
        .create_or_add(req.author, req.product, req.quantity)
        .await?;
    Ok(Json(view))
}

/// PUT /orders/cart/items: sets the quantity of a product already in the cart.
#[tracing::instrument(skip(state, req), fields(author = %req.author, product = %req.product))]
pub async fn update_cart_item<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CartItemRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let view = state
        .inventory
        .orders()
        .update_cart_item(req.author, req.product, req.quantity)
        .await?;
    Ok(Json(view))
}

/// GET /orders/cart/{author}
#[tracing::instrument(skip(state))]
pub async fn cart<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(author): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let author = parse_id(&author)?;
    let view = state.inventory.orders().get_order_in_progress(author).await?;
    Ok(Json(view))
}

/// POST /orders/cart/{author}/checkout: commits the cart as an order.
#[tracing::instrument(skip(state, checkout))]
pub async fn checkout<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(author): Path<String>,
    checkout: Option<Json<CheckoutRequest>>,
) -> Result<Json<OrderView>, ApiError> {
    let author = parse_id(&author)?;
    let checkout = checkout.map(|Json(c)| c).unwrap_or_default();
    let view = state.inventory.orders().to_order(author, checkout).await?;
    Ok(Json(view))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order = parse_id(&id)?;
    let view = state.inventory.orders().get_order(order).await?;
    Ok(Json(view))
}

/// PATCH /orders/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn change_status<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest<OrderStatus>>,
) -> Result<Json<OrderView>, ApiError> {
    let order = parse_id(&id)?;
    let view = state
        .inventory
        .orders()
        .change_order_status(order, req.status)
        .await?;
    Ok(Json(view))
}

/// DELETE /orders/{id}/items/{item_id}
///
/// Responds 204 when the last item was removed and the order deleted with it.
#[tracing::instrument(skip(state))]
pub async fn delete_item<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let order = parse_id(&id)?;
    let item = parse_id(&item_id)?;
    let remaining = state
        .inventory
        .orders()
        .delete_order_item(order, item)
        .await?;

    Ok(match remaining {
        Some(view) => Json(view).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// GET /orders?author=&page=&per_page=
#[tracing::instrument(skip(state, query), fields(author = %query.author))]
pub async fn list_by_author<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<AuthorQuery>,
) -> Result<Json<Vec<CustomerOrder>>, ApiError> {
    let orders = state
        .inventory
        .orders()
        .list_orders_by_author(query.author, query.page())
        .await?;
    Ok(Json(orders))
}

/// GET /orders/active: orders awaiting fulfilment.
#[tracing::instrument(skip(state, query))]
pub async fn list_active<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<CustomerOrder>>, ApiError> {
    let orders = state
        .inventory
        .orders()
        .list_active_orders(query.page())
        .await?;
    Ok(Json(orders))
}

/// GET /orders/history
#[tracing::instrument(skip(state, query))]
pub async fn list_history<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<CustomerOrder>>, ApiError> {
    let orders = state
        .inventory
        .orders()
        .list_order_history(query.page())
        .await?;
    Ok(Json(orders))
}
