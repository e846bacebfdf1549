use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId, ProductId, ReservationId, UserId, Version};
use domain::{
    CustomerOrder, LineItem, OrderKind, OrderLike, OrderRecord, Product, Reservation,
    ReservationUpsert, StockOrder,
};
use tokio::sync::RwLock;

use crate::{
    OrderQuery, Result, StoreError,
    store::{InventoryStore, ProductSnapshot, SweepOutcome, UpsertOutcome},
};

#[derive(Default)]
struct Tables {
    products: HashMap<ProductId, Product>,
    reservations: HashMap<ReservationId, Reservation>,
    line_items: HashMap<LineItemId, LineItem>,
    orders: HashMap<OrderId, OrderRecord>,
}

impl Tables {
    fn reservations_where(&self, pred: impl Fn(&Reservation) -> bool) -> Vec<Reservation> {
        let mut rows: Vec<_> = self
            .reservations
            .values()
            .filter(|r| pred(r))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.reserved_at, r.id));
        rows
    }

    /// True if an in-progress line item points at the reservation.
    fn held_by_cart_item(&self, id: ReservationId) -> bool {
        self.line_items
            .values()
            .any(|item| item.reserved == Some(id) && item.in_progress)
    }

    /// Removes a reservation and every reference to it.
    fn remove_reservation(&mut self, id: ReservationId) -> Option<Reservation> {
        let reservation = self.reservations.remove(&id)?;
        for item in self.line_items.values_mut() {
            if item.reserved == Some(id) {
                item.reserved = None;
            }
        }
        if let Some(product) = self.products.get_mut(&reservation.product) {
            product.detach_reservation(id);
            product.reservation_version = product.reservation_version.next();
        }
        Some(reservation)
    }
}

/// In-memory inventory store for tests and local runs.
///
/// All tables sit behind one lock, so every method is a single critical
/// section and compare-and-swap semantics match the PostgreSQL store.
#[derive(Clone, Default)]
pub struct InMemoryInventoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryInventoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of reservations stored.
    pub async fn reservation_count(&self) -> usize {
        self.tables.read().await.reservations.len()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        *tables = Tables::default();
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn save_product(&self, mut product: Product) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.products.get(&product.id) {
            product.reservations = existing.reservations.clone();
            product.reservation_version = existing.reservation_version.next();
        }
        tables.products.insert(product.id, product);
        Ok(())
    }

    async fn update_product_count(&self, id: ProductId, physical_count: u32) -> Result<()> {
        let mut tables = self.tables.write().await;
        let product = tables
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.physical_count = physical_count;
        product.reservation_version = product.reservation_version.next();
        Ok(())
    }

    async fn product_snapshot(&self, id: ProductId) -> Result<Option<ProductSnapshot>> {
        let tables = self.tables.read().await;
        let Some(product) = tables.products.get(&id) else {
            return Ok(None);
        };
        Ok(Some(ProductSnapshot {
            product: product.clone(),
            reservations: tables.reservations_where(|r| r.product == id),
        }))
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.tables.read().await.reservations.get(&id).cloned())
    }

    async fn find_reservation(
        &self,
        product: ProductId,
        order: OrderId,
    ) -> Result<Option<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .reservations
            .values()
            .find(|r| r.product == product && r.order == order)
            .cloned())
    }

    async fn reservations_for_product(&self, product: ProductId) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables.reservations_where(|r| r.product == product))
    }

    async fn reservations_for_order(&self, order: OrderId) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables.reservations_where(|r| r.order == order))
    }

    async fn reservations_for_author(&self, author: UserId) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        Ok(tables.reservations_where(|r| r.author == author))
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<_> = tables
            .reservations
            .values()
            .filter(|r| r.is_expired(now) && tables.held_by_cart_item(r.id))
            .cloned()
            .collect();
        rows.sort_by_key(|r| (r.expires_at, r.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn upsert_reservation(
        &self,
        upsert: ReservationUpsert,
        expected: Option<Version>,
    ) -> Result<UpsertOutcome> {
        let mut tables = self.tables.write().await;

        let actual = tables
            .products
            .get(&upsert.product)
            .map(|p| p.reservation_version)
            .ok_or(StoreError::ProductNotFound(upsert.product))?;

        if let Some(expected) = expected
            && actual != expected
        {
            return Err(StoreError::ConcurrencyConflict {
                product: upsert.product,
                expected,
                actual,
            });
        }

        let existing = tables
            .reservations
            .values_mut()
            .find(|r| r.product == upsert.product && r.order == upsert.order);

        let (reservation, created) = match existing {
            Some(row) => {
                upsert.apply_to(row);
                (row.clone(), false)
            }
            None => {
                let row = upsert.new_reservation();
                tables.reservations.insert(row.id, row.clone());
                (row, true)
            }
        };

        let product_version = actual.next();
        if let Some(product) = tables.products.get_mut(&upsert.product) {
            product.attach_reservation(reservation.id);
            product.reservation_version = product_version;
        }

        Ok(UpsertOutcome {
            reservation,
            created,
            product_version,
        })
    }

    async fn delete_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.tables.write().await.remove_reservation(id))
    }

    async fn release_expired_reservation(
        &self,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome> {
        let mut tables = self.tables.write().await;

        match tables.reservations.get(&id) {
            Some(r) if r.is_expired(now) => {}
            _ => return Ok(SweepOutcome::Gone),
        }

        let in_progress = tables
            .line_items
            .values()
            .find(|item| item.reserved == Some(id))
            .map(|item| item.in_progress);

        match in_progress {
            None => Ok(SweepOutcome::Orphaned),
            Some(false) => Ok(SweepOutcome::Committed),
            Some(true) => Ok(tables
                .remove_reservation(id)
                .map_or(SweepOutcome::Gone, SweepOutcome::Released)),
        }
    }

    async fn get_line_item(&self, id: LineItemId) -> Result<Option<LineItem>> {
        Ok(self.tables.read().await.line_items.get(&id).cloned())
    }

    async fn find_line_item(&self, order: OrderId, product: ProductId) -> Result<Option<LineItem>> {
        let tables = self.tables.read().await;
        Ok(tables
            .line_items
            .values()
            .find(|i| i.order == order && i.product == product)
            .cloned())
    }

    async fn line_items_for_order(&self, order: OrderId) -> Result<Vec<LineItem>> {
        let tables = self.tables.read().await;
        let Some(record) = tables.orders.get(&order) else {
            return Ok(tables
                .line_items
                .values()
                .filter(|i| i.order == order)
                .cloned()
                .collect());
        };
        // Keep the order's own item ordering.
        Ok(record
            .items()
            .iter()
            .filter_map(|id| tables.line_items.get(id).cloned())
            .collect())
    }

    async fn save_line_item(&self, item: LineItem) -> Result<()> {
        self.tables.write().await.line_items.insert(item.id, item);
        Ok(())
    }

    async fn delete_line_item(&self, id: LineItemId) -> Result<bool> {
        Ok(self.tables.write().await.line_items.remove(&id).is_some())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<OrderRecord>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_in_progress_customer_order(
        &self,
        author: UserId,
    ) -> Result<Option<CustomerOrder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter_map(OrderRecord::as_customer)
            .find(|o| o.author == author && o.is_in_progress())
            .cloned())
    }

    async fn in_progress_stock_orders(&self, author: UserId) -> Result<Vec<StockOrder>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter_map(OrderRecord::as_stock)
            .filter(|o| o.author == author && o.is_in_progress())
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at));
        Ok(orders)
    }

    async fn insert_order(&self, order: OrderRecord) -> Result<OrderRecord> {
        let mut tables = self.tables.write().await;

        if order.is_in_progress() {
            let author = order.author();
            let open = |o: &&OrderRecord| {
                o.kind() == order.kind() && o.is_in_progress() && o.author() == author
            };
            match order.kind() {
                OrderKind::Customer if tables.orders.values().any(|o| open(&o)) => {
                    return Err(StoreError::DuplicateInProgressOrder(author));
                }
                OrderKind::Stock
                    if order.is_empty()
                        && tables.orders.values().filter(open).any(|o| o.is_empty()) =>
                {
                    return Err(StoreError::EmptyStockOrderExists(author));
                }
                _ => {}
            }
        }

        tables.orders.insert(order.id(), order.clone());
        Ok(order)
    }

    async fn save_order(&self, mut order: OrderRecord) -> Result<OrderRecord> {
        let mut tables = self.tables.write().await;
        let id = order.id();
        let stored = tables
            .orders
            .get(&id)
            .ok_or(StoreError::OrderNotFound(id))?;

        if stored.version() != order.version() {
            return Err(StoreError::OrderVersionConflict {
                order: id,
                expected: order.version(),
                actual: stored.version(),
            });
        }

        order.set_version(order.version().next());
        tables.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn delete_order(&self, id: OrderId) -> Result<bool> {
        Ok(self.tables.write().await.orders.remove(&id).is_some())
    }

    async fn discard_empty_order(&self, id: OrderId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let unused = tables.orders.get(&id).is_some_and(|o| o.is_empty())
            && !tables.line_items.values().any(|i| i.order == id);
        if !unused {
            return Ok(false);
        }
        Ok(tables.orders.remove(&id).is_some())
    }

    async fn list_orders(&self, query: OrderQuery) -> Result<Vec<OrderRecord>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|o| query.matches(o.kind(), o.author(), o.status_str()))
            .cloned()
            .collect();

        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(orders.into_iter().skip(offset).take(limit).collect())
    }
}
