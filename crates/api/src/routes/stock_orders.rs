//! Staff stock order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use common::{ProductId, UserId};
use domain::{StockOrder, StockOrderStatus};
use inventory::{OrderView, Page, StockOrderUpdate};
use inventory_store::InventoryStore;
use serde::Deserialize;

use super::orders::StatusRequest;
use super::{AppState, PageQuery, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateStockOrderRequest {
    pub author: UserId,
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ListQuery {
    pub author: Option<UserId>,
    pub status: Option<StockOrderStatus>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl ListQuery {
    fn page(&self) -> Page {
        PageQuery {
            page: self.page,
            per_page: self.per_page,
        }
        .page()
    }
}

/// POST /stock-orders: opens an empty stock order.
#[tracing::instrument(skip(state, req), fields(author = %req.author))]
pub async fn create<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<CreateStockOrderRequest>,
) -> Result<(StatusCode, Json<StockOrder>), ApiError> {
    let order = state
        .inventory
        .stock_orders()
        .create_empty_stock_order(req.author)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /stock-orders?author=&status=&page=&per_page=
#[tracing::instrument(skip(state, query))]
pub async fn list<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<StockOrder>>, ApiError> {
    let orders = state
        .inventory
        .stock_orders()
        .list_stock_orders(query.author, query.status, query.page())
        .await?;
    Ok(Json(orders))
}

/// GET /stock-orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order = parse_id(&id)?;
    let view = state.inventory.stock_orders().get_stock_order(order).await?;
    Ok(Json(view))
}

/// PATCH /stock-orders/{id}: counterparty, notes, pricing and item quantities.
#[tracing::instrument(skip(state, update))]
pub async fn update<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(update): Json<StockOrderUpdate>,
) -> Result<Json<OrderView>, ApiError> {
    let order = parse_id(&id)?;
    let view = state
        .inventory
        .stock_orders()
        .update_stock_order(order, update)
        .await?;
    Ok(Json(view))
}

/// POST /stock-orders/{id}/items
#[tracing::instrument(skip(state, req), fields(product = %req.product))]
pub async fn add_item<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<OrderView>, ApiError> {
    let order = parse_id(&id)?;
    let view = state
        .inventory
        .stock_orders()
        .add_product_to_stock_order(order, req.product, req.quantity)
        .await?;
    Ok(Json(view))
}

/// DELETE /stock-orders/{id}/items/{item_id}
#[tracing::instrument(skip(state))]
pub async fn delete_item<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let order = parse_id(&id)?;
    let item = parse_id(&item_id)?;
    let remaining = state
        .inventory
        .stock_orders()
        .delete_stock_order_item(order, item)
        .await?;

    Ok(match remaining {
        Some(view) => Json(view).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// POST /stock-orders/{id}/confirm: prices the order and submits it upstream.
#[tracing::instrument(skip(state))]
pub async fn confirm<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderView>, ApiError> {
    let order = parse_id(&id)?;
    let view = state
        .inventory
        .stock_orders()
        .confirm_stock_order(order)
        .await?;
    Ok(Json(view))
}

/// PATCH /stock-orders/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn change_status<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest<StockOrderStatus>>,
) -> Result<Json<OrderView>, ApiError> {
    let order = parse_id(&id)?;
    let view = state
        .inventory
        .stock_orders()
        .change_stock_order_status(order, req.status)
        .await?;
    Ok(Json(view))
}
