//! HTTP host for the inventory reservation core.
//!
//! Exposes reservations, product quantities, customer orders and stock
//! orders as JSON endpoints, with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use inventory::{
    Collaborators, InMemoryStockService, InMemoryUserDirectory, Inventory, InventorySettings,
    StockService, TracingNotifier,
};
use inventory_store::{InMemoryInventoryStore, InventoryStore};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: InventoryStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{orders, products, reservations, stock_orders, users};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        // catalog mirror and quantities
        .route("/products", post(products::create::<S>))
        .route("/products/{id}", get(products::get::<S>))
        .route("/products/{id}/count", put(products::update_count::<S>))
        .route("/products/{id}/quantity", get(products::quantity::<S>))
        .route("/products/{id}/reservations", get(products::reservations::<S>))
        .route("/users/{id}", put(users::put::<S>).get(users::get::<S>))
        // holds
        .route(
            "/reservations",
            post(reservations::reserve::<S>).delete(reservations::release::<S>),
        )
        .route(
            "/reservations/orders/{id}",
            delete(reservations::release_by_order::<S>),
        )
        .route(
            "/reservations/users/{id}",
            get(reservations::list_for_user::<S>).delete(reservations::release_for_user::<S>),
        )
        // customer orders
        .route(
            "/orders/cart/items",
            post(orders::add_cart_item::<S>).put(orders::update_cart_item::<S>),
        )
        .route("/orders/cart/{author}", get(orders::cart::<S>))
        .route("/orders/cart/{author}/checkout", post(orders::checkout::<S>))
        .route("/orders", get(orders::list_by_author::<S>))
        .route("/orders/active", get(orders::list_active::<S>))
        .route("/orders/history", get(orders::list_history::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/{id}/status", patch(orders::change_status::<S>))
        .route(
            "/orders/{id}/items/{item_id}",
            delete(orders::delete_item::<S>),
        )
        // stock orders
        .route(
            "/stock-orders",
            post(stock_orders::create::<S>).get(stock_orders::list::<S>),
        )
        .route(
            "/stock-orders/{id}",
            get(stock_orders::get::<S>).patch(stock_orders::update::<S>),
        )
        .route("/stock-orders/{id}/items", post(stock_orders::add_item::<S>))
        .route(
            "/stock-orders/{id}/items/{item_id}",
            delete(stock_orders::delete_item::<S>),
        )
        .route("/stock-orders/{id}/confirm", post(stock_orders::confirm::<S>))
        .route(
            "/stock-orders/{id}/status",
            patch(stock_orders::change_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the services over `store`.
///
/// Author profiles live in an in-memory directory shared with the
/// `/users` routes; notifications go to the log.
pub fn create_state<S: InventoryStore + Clone + 'static>(
    store: S,
    stock_service: Arc<dyn StockService>,
    settings: InventorySettings,
) -> Arc<AppState<S>> {
    let users = InMemoryUserDirectory::new();
    let collaborators = Collaborators::new(
        Arc::new(users.clone()),
        stock_service,
        Arc::new(TracingNotifier),
    );

    Arc::new(AppState {
        inventory: Inventory::new(store, collaborators, settings),
        users,
    })
}

/// Creates the default application state: in-memory store and upstream sink.
pub fn create_default_state() -> Arc<AppState<InMemoryInventoryStore>> {
    create_state(
        InMemoryInventoryStore::new(),
        Arc::new(InMemoryStockService::new()),
        InventorySettings::default(),
    )
}
