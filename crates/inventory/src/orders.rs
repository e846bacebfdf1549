//! Customer order workflow: cart, checkout and status transitions.

use chrono::Utc;
use common::{LineItemId, OrderId, ProductId, UserId};
use domain::{
    CustomerOrder, LineItem, OrderKind, OrderLike, OrderRecord, OrderStatus, Packaging,
    StatusEffect, validate_quantity,
};
use inventory_store::{InventoryStore, OrderQuery, StoreError};
use serde::Deserialize;

use crate::error::{InventoryError, Result};
use crate::ledger::{HoldRequest, MAX_ATTEMPTS};
use crate::lifecycle::{ItemPlan, OrderLifecycle, OrderView, Page};
use crate::services::NotificationKind;

/// Details captured when a cart is committed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub packaging: Packaging,
    #[serde(default)]
    pub necessary_notes: String,
}

#[derive(Debug, Clone, Copy)]
enum CartChange {
    /// Adds to the item's current count.
    Add(u32),
    /// Replaces the item's count.
    Set(u32),
}

/// Service for customer orders.
///
/// An author has at most one in-progress order, which acts as their cart.
#[derive(Clone)]
pub struct OrderService<S> {
    lifecycle: OrderLifecycle<S>,
}

impl<S> OrderService<S>
where
    S: InventoryStore + Clone,
{
    pub(crate) fn new(lifecycle: OrderLifecycle<S>) -> Self {
        Self { lifecycle }
    }

    /// Adds `quantity` units of a product to the author's cart, creating the
    /// cart if needed.
    #[tracing::instrument(skip(self))]
    pub async fn create_or_add(
        &self,
        author: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<OrderView> {
        self.put_cart_item(author, product, CartChange::Add(quantity))
            .await
    }

    /// Re-quantifies a product already in the author's cart.
    #[tracing::instrument(skip(self))]
    pub async fn update_cart_item(
        &self,
        author: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<OrderView> {
        self.put_cart_item(author, product, CartChange::Set(quantity))
            .await
    }

    async fn put_cart_item(
        &self,
        author: UserId,
        product: ProductId,
        change: CartChange,
    ) -> Result<OrderView> {
        let lc = &self.lifecycle;
        let (CartChange::Add(requested) | CartChange::Set(requested)) = change;
        validate_quantity(requested)?;
        let profile = lc.authorize(author).await?;
        lc.require_product(product).await?;

        let (order, created) = match (change, self.find_cart(author).await?) {
            (_, Some(order)) => (order, false),
            (CartChange::Set(_), None) => return Err(InventoryError::NoOrderInProgress(author)),
            (CartChange::Add(_), None) => self.open_cart(author, &profile.name).await?,
        };
        order.ensure_cart_open()?;

        let existing = lc.store.find_line_item(order.id, product).await?;
        let count = match (change, &existing) {
            (CartChange::Add(q), Some(item)) => item.item_count.saturating_add(q),
            (CartChange::Set(q), Some(_)) | (CartChange::Add(q), None) => q,
            (CartChange::Set(_), None) => {
                return Err(InventoryError::ProductNotInOrder {
                    order: order.id,
                    product,
                });
            }
        };

        let order_id = order.id;
        let prior = lc
            .store
            .find_reservation(product, order_id)
            .await?
            .map(|r| r.quantity);
        let reservation = match lc.engine.reserve(product, author, count, order_id, false).await {
            Ok(id) => id,
            Err(e) => {
                if created {
                    self.discard_cart(order_id).await;
                }
                return Err(e);
            }
        };

        let mut item = existing
            .clone()
            .unwrap_or_else(|| LineItem::new(order_id, product, author, count, false));
        item.item_count = count;
        item.reserved = Some(reservation);

        let attached = match lc.store.save_line_item(item.clone()).await {
            Ok(()) => self.attach_to_cart(order, item.id).await,
            Err(e) => Err(e.into()),
        };
        let record = match attached {
            Ok(record) => record,
            Err(e) => {
                let hold = HoldRequest {
                    product,
                    author,
                    quantity: count,
                    order: order_id,
                    for_stock: false,
                };
                self.revert_cart_item(item, existing, hold, prior).await;
                if created {
                    self.discard_cart(order_id).await;
                }
                return Err(e);
            }
        };

        tracing::info!(order_id = %record.id(), %product, count, "cart item updated");
        lc.view(record).await
    }

    /// Lists `item` on the cart. A concurrent save of the cart is retried
    /// on a fresh read as long as the cart is still open.
    async fn attach_to_cart(&self, mut cart: CustomerOrder, item: LineItemId) -> Result<OrderRecord> {
        let id = cart.id;
        let mut attempt = 1;
        loop {
            let mut record = OrderRecord::from(cart);
            if record.items().contains(&item) {
                return Ok(record);
            }
            record.add_item(item);

            match self.lifecycle.store.save_order(record).await {
                Ok(saved) => return Ok(saved),
                Err(e) if e.is_conflict() && attempt < MAX_ATTEMPTS => {
                    attempt += 1;
                    metrics::counter!("cart_save_retries_total").increment(1);
                    tracing::debug!(attempt, line_item = %item, "cart moved, retrying");
                    cart = self.load_customer_order(id).await?;
                    cart.ensure_cart_open()?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Puts a cart item and its hold back after the cart could not be saved.
    async fn revert_cart_item(
        &self,
        item: LineItem,
        original: Option<LineItem>,
        hold: HoldRequest,
        prior: Option<u32>,
    ) {
        let lc = &self.lifecycle;
        let restored = match original {
            Some(original) => lc.store.save_line_item(original).await,
            None => lc.store.delete_line_item(item.id).await.map(|_| ()),
        };
        if let Err(e) = restored {
            tracing::warn!(error = %e, line_item = %item.id, "failed to revert cart item");
        }
        if let Err(e) = lc.engine.ledger().restore_hold(hold, prior).await {
            tracing::warn!(error = %e, line_item = %item.id, "failed to revert cart hold");
        }
    }

    async fn find_cart(&self, author: UserId) -> Result<Option<CustomerOrder>> {
        Ok(self
            .lifecycle
            .store
            .find_in_progress_customer_order(author)
            .await?)
    }

    async fn open_cart(&self, author: UserId, name: &str) -> Result<(CustomerOrder, bool)> {
        let cart = CustomerOrder::new(author, name, Utc::now());
        match self.lifecycle.store.insert_order(cart.into()).await {
            Ok(record) => {
                metrics::counter!("orders_created_total", "kind" => "customer").increment(1);
                let cart = record
                    .into_customer()
                    .ok_or(InventoryError::NoOrderInProgress(author))?;
                Ok((cart, true))
            }
            // Lost the race against a concurrent request by the same author.
            Err(StoreError::DuplicateInProgressOrder(_)) => {
                let cart = self
                    .find_cart(author)
                    .await?
                    .ok_or(InventoryError::NoOrderInProgress(author))?;
                Ok((cart, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Drops a cart this request opened, unless another request has put
    /// an item in it meanwhile.
    async fn discard_cart(&self, order: OrderId) {
        match self.lifecycle.store.discard_empty_order(order).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(order_id = %order, "new cart in use, kept"),
            Err(e) => tracing::warn!(error = %e, order_id = %order, "failed to discard new cart"),
        }
    }

    /// Commits the author's cart: every item is re-validated at its final
    /// quantity and its hold refreshed, then the order becomes `ordered`.
    #[tracing::instrument(skip(self))]
    pub async fn to_order(&self, author: UserId, checkout: CheckoutRequest) -> Result<OrderView> {
        let cart = self
            .find_cart(author)
            .await?
            .ok_or(InventoryError::NoOrderInProgress(author))?;
        let (target, effect) = cart.plan_status_change(Some(OrderStatus::Ordered))?;
        let record = self.commit(cart, target, effect, Some(checkout)).await?;
        self.lifecycle
            .notify(&record, NotificationKind::OrderPlaced)
            .await;
        self.lifecycle.view(record).await
    }

    async fn commit(
        &self,
        mut cart: CustomerOrder,
        target: OrderStatus,
        effect: StatusEffect,
        checkout: Option<CheckoutRequest>,
    ) -> Result<OrderRecord> {
        let lc = &self.lifecycle;
        let items: Vec<LineItem> = lc
            .store
            .line_items_for_order(cart.id)
            .await?
            .into_iter()
            .filter(|i| i.in_progress)
            .collect();
        if items.is_empty() {
            return Err(domain::OrderError::NoItems.into());
        }

        let plans = items
            .into_iter()
            .map(|original| {
                let mut target = original.clone();
                target.in_progress = false;
                ItemPlan { original, target }
            })
            .collect();
        let reserved = lc.reserve_all(plans).await?;

        if let Some(checkout) = checkout {
            cart.set_checkout(checkout.packaging, checkout.necessary_notes);
        }
        cart.apply_status_change(target, effect, Utc::now());

        match lc.store.save_order(cart.into()).await {
            Ok(record) => {
                metrics::counter!("orders_placed_total").increment(1);
                Ok(record)
            }
            Err(e) => {
                lc.undo(reserved.changes).await;
                Err(e.into())
            }
        }
    }

    /// Moves an order to `target` and applies the hold side effects.
    ///
    /// Requesting the current status is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn change_order_status(
        &self,
        order: OrderId,
        target: Option<OrderStatus>,
    ) -> Result<OrderView> {
        let lc = &self.lifecycle;
        let mut customer = self.load_customer_order(order).await?;
        let (target, effect) = customer.plan_status_change(target)?;
        let now = Utc::now();

        let record = match effect {
            StatusEffect::None => return lc.view(customer.into()).await,
            StatusEffect::CommitCart => self.commit(customer, target, effect, None).await?,
            StatusEffect::Confirm { restore_holds } => {
                let notes = customer.necessary_notes.clone();
                let mut record = OrderRecord::from(customer);
                let confirmation = lc
                    .confirm(
                        &mut record,
                        restore_holds,
                        lc.settings.customer_counterparty_id.clone(),
                        notes,
                    )
                    .await?;
                let mut customer = record
                    .into_customer()
                    .ok_or(InventoryError::OrderNotFound(order))?;
                customer.apply_status_change(target, effect, now);
                lc.save_confirmed(customer.into(), confirmation).await?
            }
            StatusEffect::Reorder => {
                let items = lc.store.line_items_for_order(order).await?;
                let reserved = lc
                    .reserve_all(items.into_iter().map(ItemPlan::unchanged).collect())
                    .await?;
                customer.apply_status_change(target, effect, now);
                match lc.store.save_order(customer.into()).await {
                    Ok(record) => record,
                    Err(e) => {
                        lc.undo(reserved.changes).await;
                        return Err(e.into());
                    }
                }
            }
            StatusEffect::Reject | StatusEffect::Complete => {
                customer.apply_status_change(target, effect, now);
                let record = lc.store.save_order(customer.into()).await?;
                lc.release_closed(order, target.as_str()).await;
                record
            }
            StatusEffect::Deliver => {
                customer.apply_status_change(target, effect, now);
                lc.store.save_order(customer.into()).await?
            }
        };

        metrics::counter!("order_status_changes_total", "status" => target.as_str()).increment(1);
        lc.notify(
            &record,
            NotificationKind::StatusChanged {
                status: target.to_string(),
            },
        )
        .await;
        lc.view(record).await
    }

    /// Deletes a line item of an in-progress or ordered order.
    ///
    /// Returns `None` when the last item was removed and the order deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_order_item(
        &self,
        order: OrderId,
        item: LineItemId,
    ) -> Result<Option<OrderView>> {
        let lc = &self.lifecycle;
        let customer = self.load_customer_order(order).await?;
        customer.ensure_items_deletable()?;

        let record = OrderRecord::from(customer);
        let item = lc.find_item(&record, item).await?;
        match lc.delete_item(record, item).await? {
            Some(record) => Ok(Some(lc.view(record).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_order_in_progress(&self, author: UserId) -> Result<OrderView> {
        let cart = self
            .find_cart(author)
            .await?
            .ok_or(InventoryError::NoOrderInProgress(author))?;
        self.lifecycle.view(cart.into()).await
    }

    pub async fn get_order(&self, order: OrderId) -> Result<OrderView> {
        let customer = self.load_customer_order(order).await?;
        self.lifecycle.view(customer.into()).await
    }

    pub async fn list_orders_by_author(
        &self,
        author: UserId,
        page: Page,
    ) -> Result<Vec<CustomerOrder>> {
        self.list(OrderQuery::for_kind(OrderKind::Customer).author(author), page)
            .await
    }

    /// Orders awaiting fulfilment (`ordered` or `confirmed`).
    pub async fn list_active_orders(&self, page: Page) -> Result<Vec<CustomerOrder>> {
        let statuses = status_names(OrderStatus::is_active);
        self.list(OrderQuery::for_kind(OrderKind::Customer).statuses(statuses), page)
            .await
    }

    /// Finished orders (`delivered`, `rejected` or `completed`).
    pub async fn list_order_history(&self, page: Page) -> Result<Vec<CustomerOrder>> {
        let statuses = status_names(OrderStatus::is_history);
        self.list(OrderQuery::for_kind(OrderKind::Customer).statuses(statuses), page)
            .await
    }

    async fn list(&self, query: OrderQuery, page: Page) -> Result<Vec<CustomerOrder>> {
        let records = self
            .lifecycle
            .store
            .list_orders(query.page(page.page, page.per_page))
            .await?;
        Ok(records
            .into_iter()
            .filter_map(OrderRecord::into_customer)
            .collect())
    }

    async fn load_customer_order(&self, order: OrderId) -> Result<CustomerOrder> {
        self.lifecycle
            .load_order(order)
            .await?
            .into_customer()
            .ok_or(InventoryError::OrderNotFound(order))
    }
}

fn status_names(filter: fn(&OrderStatus) -> bool) -> Vec<&'static str> {
    [
        OrderStatus::InProgress,
        OrderStatus::Ordered,
        OrderStatus::Confirmed,
        OrderStatus::Delivered,
        OrderStatus::Rejected,
        OrderStatus::Completed,
    ]
    .into_iter()
    .filter(filter)
    .map(|s| s.as_str())
    .collect()
}
