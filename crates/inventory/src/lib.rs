//! Inventory reservation and order lifecycle services.
//!
//! This crate provides:
//! - [`ReservationLedger`]: creates, re-quantifies and releases holds
//! - [`QuantityEngine`]: availability and the checked reservation path
//! - [`OrderService`] and [`StockOrderService`]: order workflows
//! - [`ExpirationSweeper`]: periodic release of stale holds
//!
//! Holds on a product are written with compare-and-swap on the product's
//! `reservation_version`, so concurrent requests can never reserve more
//! than the physical count.

pub mod error;
pub mod ledger;
mod lifecycle;
pub mod orders;
pub mod quantity;
pub mod services;
pub mod stock_orders;
pub mod sweeper;

pub use error::{InventoryError, Result};
pub use ledger::{MAX_ATTEMPTS, ReservationLedger};
pub use lifecycle::{Collaborators, InventorySettings, LineItemView, OrderView, Page};
pub use orders::{CheckoutRequest, OrderService};
pub use quantity::QuantityEngine;
pub use services::{
    HttpStockService, HttpStockServiceConfig, InMemoryNotifier, InMemoryStockService,
    InMemoryUserDirectory, Notification, NotificationKind, Notifier, OrderSubmission,
    StockService, StockServiceError, SubmissionPosition, TracingNotifier, UserDirectory,
};
pub use stock_orders::{ItemQuantity, StockOrderService, StockOrderUpdate};
pub use sweeper::{ExpirationSweeper, SweepReport};

use common::{OrderId, ProductId, ReservationId, UserId};
use inventory_store::InventoryStore;
use lifecycle::OrderLifecycle;

/// All services wired over one store.
#[derive(Clone)]
pub struct Inventory<S> {
    store: S,
    engine: QuantityEngine<S>,
    lifecycle: OrderLifecycle<S>,
    orders: OrderService<S>,
    stock_orders: StockOrderService<S>,
}

impl<S> Inventory<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, collaborators: Collaborators, settings: InventorySettings) -> Self {
        let ledger = ReservationLedger::new(store.clone(), settings.hold_policy);
        let engine = QuantityEngine::new(store.clone(), ledger);
        let lifecycle = OrderLifecycle {
            store: store.clone(),
            engine: engine.clone(),
            collaborators,
            settings,
        };

        Self {
            orders: OrderService::new(lifecycle.clone()),
            stock_orders: StockOrderService::new(lifecycle.clone()),
            lifecycle,
            store,
            engine,
        }
    }

    /// Places a checked hold for `author`, who must be confirmed and not banned.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product: ProductId,
        author: UserId,
        quantity: u32,
        order: OrderId,
        for_stock: bool,
    ) -> Result<ReservationId> {
        self.lifecycle.authorize(author).await?;
        self.engine
            .reserve(product, author, quantity, order, for_stock)
            .await
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger(&self) -> &ReservationLedger<S> {
        self.engine.ledger()
    }

    pub fn quantities(&self) -> &QuantityEngine<S> {
        &self.engine
    }

    pub fn orders(&self) -> &OrderService<S> {
        &self.orders
    }

    pub fn stock_orders(&self) -> &StockOrderService<S> {
        &self.stock_orders
    }

    /// A sweeper over the same store.
    pub fn sweeper(&self) -> ExpirationSweeper<S> {
        ExpirationSweeper::new(self.store.clone())
    }
}
