use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId, ProductId, ReservationId, UserId, Version};
use domain::{CustomerOrder, LineItem, OrderRecord, Product, Reservation, ReservationUpsert, StockOrder};

use crate::{OrderQuery, Result};

/// A product together with every reservation on it, read at one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product: Product,
    pub reservations: Vec<Reservation>,
}

impl ProductSnapshot {
    /// The `reservation_version` the snapshot was read at.
    pub fn version(&self) -> Version {
        self.product.reservation_version
    }
}

/// Result of an insert-or-update of a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub reservation: Reservation,
    /// True if a new row was inserted, false if an existing one was updated.
    pub created: bool,
    /// The product's `reservation_version` after the write.
    pub product_version: Version,
}

/// Result of the sweeper's atomic release attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The hold was released.
    Released(Reservation),
    /// The referencing line item has been committed; the hold is kept.
    Committed,
    /// No line item references the hold.
    Orphaned,
    /// The hold no longer exists or is not expired anymore.
    Gone,
}

/// Persistence port of the reservation core.
///
/// Every method is atomic on its own. Writes that touch a product's
/// reservation set advance its `reservation_version`. All implementations
/// must be thread-safe (Send + Sync).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    // ---- products ----

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Inserts or updates the catalog fields of a product.
    ///
    /// The reservation set of an existing product is kept and its
    /// `reservation_version` advanced, since the count may have changed.
    async fn save_product(&self, product: Product) -> Result<()>;

    /// Overwrites the physical count and advances `reservation_version`.
    /// Fails with `ProductNotFound`.
    async fn update_product_count(&self, id: ProductId, physical_count: u32) -> Result<()>;

    /// Reads a product and its reservations consistently.
    async fn product_snapshot(&self, id: ProductId) -> Result<Option<ProductSnapshot>>;

    // ---- reservations ----

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    async fn find_reservation(
        &self,
        product: ProductId,
        order: OrderId,
    ) -> Result<Option<Reservation>>;

    async fn reservations_for_product(&self, product: ProductId) -> Result<Vec<Reservation>>;

    async fn reservations_for_order(&self, order: OrderId) -> Result<Vec<Reservation>>;

    async fn reservations_for_author(&self, author: UserId) -> Result<Vec<Reservation>>;

    /// Returns up to `limit` reservations with `expires_at <= now` that an
    /// in-progress line item still points at, oldest first.
    ///
    /// Holds of committed or missing items are never returned, so they
    /// cannot fill a batch.
    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>>;

    /// Creates the `(product, order)` reservation or replaces its quantity.
    ///
    /// When `expected` is set the write only happens if the product's
    /// `reservation_version` still equals it; otherwise `ConcurrencyConflict`
    /// is returned. Fails with `ProductNotFound` for an unknown product.
    async fn upsert_reservation(
        &self,
        upsert: ReservationUpsert,
        expected: Option<Version>,
    ) -> Result<UpsertOutcome>;

    /// Deletes a reservation, clears `reserved` on line items pointing at it
    /// and pulls it from the product's set. Returns `None` if it did not exist.
    async fn delete_reservation(&self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Releases an expired reservation only if its line item exists and is
    /// still in progress. The check and the delete happen in one step.
    async fn release_expired_reservation(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome>;

    // ---- line items ----

    async fn get_line_item(&self, id: LineItemId) -> Result<Option<LineItem>>;

    async fn find_line_item(&self, order: OrderId, product: ProductId) -> Result<Option<LineItem>>;

    async fn line_items_for_order(&self, order: OrderId) -> Result<Vec<LineItem>>;

    async fn save_line_item(&self, item: LineItem) -> Result<()>;

    /// Returns false if the item did not exist.
    async fn delete_line_item(&self, id: LineItemId) -> Result<bool>;

    // ---- orders ----

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>>;

    async fn find_in_progress_customer_order(&self, author: UserId)
    -> Result<Option<CustomerOrder>>;

    async fn in_progress_stock_orders(&self, author: UserId) -> Result<Vec<StockOrder>>;

    /// Inserts a new order. A second in-progress customer order for the same
    /// author fails with `DuplicateInProgressOrder`, a second empty
    /// in-progress stock order with `EmptyStockOrderExists`.
    async fn insert_order(&self, order: OrderRecord) -> Result<OrderRecord>;

    /// Saves an order if its `version` still matches the stored one and
    /// returns it with the advanced version.
    async fn save_order(&self, order: OrderRecord) -> Result<OrderRecord>;

    /// Returns false if the order did not exist.
    async fn delete_order(&self, id: OrderId) -> Result<bool>;

    /// Deletes the order only if it lists no items and no line item points
    /// at it. Returns false if it was kept or did not exist.
    async fn discard_empty_order(&self, id: OrderId) -> Result<bool>;

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<OrderRecord>>;
}
