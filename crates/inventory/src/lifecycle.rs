//! Order steps shared by the customer and stock workflows.

use std::sync::Arc;

use common::{LineItemId, OrderId, ProductId, UserId};
use domain::{
    AuthorProfile, HoldPolicy, LineItem, Money, OrderError, OrderLike, OrderRecord, Product,
};
use inventory_store::InventoryStore;
use serde::Serialize;

use crate::error::{InventoryError, Result};
use crate::ledger::HoldRequest;
use crate::quantity::QuantityEngine;
use crate::services::{
    Notification, NotificationKind, Notifier, OrderSubmission, StockService, SubmissionPosition,
    UserDirectory,
};

/// External systems the workflows call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub users: Arc<dyn UserDirectory>,
    pub stock_service: Arc<dyn StockService>,
    pub notifier: Arc<dyn Notifier>,
}

impl Collaborators {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        stock_service: Arc<dyn StockService>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            users,
            stock_service,
            notifier,
        }
    }
}

/// Tunables of the reservation core.
#[derive(Debug, Clone, Default)]
pub struct InventorySettings {
    pub hold_policy: HoldPolicy,
    /// Upstream buyer customer orders are submitted for.
    pub customer_counterparty_id: String,
}

/// 1-based page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub per_page: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItemView {
    #[serde(flatten)]
    pub item: LineItem,
    /// Units currently held for this item by its order.
    pub held_quantity: u32,
}

/// An order with its line items, as returned by the workflows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderView {
    pub order: OrderRecord,
    pub items: Vec<LineItemView>,
}

impl OrderView {
    pub fn item_for(&self, product: ProductId) -> Option<&LineItemView> {
        self.items.iter().find(|i| i.item.product == product)
    }
}

/// A line item before and after a multi-item step.
#[derive(Debug, Clone)]
pub(crate) struct ItemPlan {
    pub original: LineItem,
    pub target: LineItem,
}

impl ItemPlan {
    /// Re-reserves the item as it is.
    pub fn unchanged(item: LineItem) -> Self {
        Self {
            original: item.clone(),
            target: item,
        }
    }
}

/// Undo record of one item touched by [`OrderLifecycle::reserve_all`].
#[derive(Debug, Clone)]
pub(crate) struct HoldChange {
    original: LineItem,
    /// Quantity held before the step, `None` if there was no hold.
    prior: Option<u32>,
    reserved: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Reserved {
    pub items: Vec<LineItem>,
    pub changes: Vec<HoldChange>,
}

/// Outcome of [`OrderLifecycle::confirm`], written by
/// [`OrderLifecycle::save_confirmed`] once the order itself is saved.
#[derive(Debug, Default)]
pub(crate) struct Confirmation {
    priced: Vec<LineItem>,
    changes: Vec<HoldChange>,
    /// Upstream id obtained by this confirmation, if it submitted.
    submitted: Option<String>,
}

#[derive(Clone)]
pub(crate) struct OrderLifecycle<S> {
    pub store: S,
    pub engine: QuantityEngine<S>,
    pub collaborators: Collaborators,
    pub settings: InventorySettings,
}

impl<S> OrderLifecycle<S>
where
    S: InventoryStore + Clone,
{
    /// Loads the author and checks they may hold stock.
    pub async fn authorize(&self, author: UserId) -> Result<AuthorProfile> {
        let profile = self
            .collaborators
            .users
            .get_author(author)
            .await
            .ok_or(InventoryError::UserNotFound(author))?;
        profile
            .ensure_can_reserve()
            .map_err(|reason| InventoryError::AuthorNotAllowed { author, reason })?;
        Ok(profile)
    }

    pub async fn load_order(&self, id: OrderId) -> Result<OrderRecord> {
        self.store
            .get_order(id)
            .await?
            .ok_or(InventoryError::OrderNotFound(id))
    }

    pub async fn require_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or(InventoryError::ProductNotFound(id))
    }

    /// Loads a line item and checks it belongs to `order`.
    pub async fn find_item(&self, order: &OrderRecord, item: LineItemId) -> Result<LineItem> {
        self.store
            .get_line_item(item)
            .await?
            .filter(|i| i.order == order.id())
            .ok_or(InventoryError::OrderItemNotFound(item))
    }

    pub async fn view(&self, order: OrderRecord) -> Result<OrderView> {
        let holds = self.store.reservations_for_order(order.id()).await?;
        let items = self
            .store
            .line_items_for_order(order.id())
            .await?
            .into_iter()
            .map(|item| {
                let held_quantity = holds
                    .iter()
                    .find(|r| r.product == item.product)
                    .map_or(0, |r| r.quantity);
                LineItemView {
                    item,
                    held_quantity,
                }
            })
            .collect();
        Ok(OrderView { order, items })
    }

    /// Moves every item to its target and holds its quantity through the
    /// checked path. On the first failure all earlier items are put back.
    ///
    /// Each target is persisted before its hold is written, so a target with
    /// `in_progress == false` is never released by the sweeper mid-way.
    pub async fn reserve_all(&self, plans: Vec<ItemPlan>) -> Result<Reserved> {
        let mut reserved = Reserved::default();
        for plan in plans {
            if let Err(e) = self.reserve_one(plan, &mut reserved).await {
                self.undo(std::mem::take(&mut reserved.changes)).await;
                return Err(e);
            }
        }
        Ok(reserved)
    }

    async fn reserve_one(&self, plan: ItemPlan, reserved: &mut Reserved) -> Result<()> {
        let ItemPlan {
            original,
            mut target,
        } = plan;

        let prior = self
            .store
            .find_reservation(target.product, target.order)
            .await?
            .map(|r| r.quantity);

        self.store.save_line_item(target.clone()).await?;
        reserved.changes.push(HoldChange {
            original,
            prior,
            reserved: false,
        });

        let id = self
            .engine
            .reserve(
                target.product,
                target.author,
                target.item_count,
                target.order,
                target.for_stock,
            )
            .await?;
        if let Some(change) = reserved.changes.last_mut() {
            change.reserved = true;
        }

        target.reserved = Some(id);
        self.store.save_line_item(target.clone()).await?;
        reserved.items.push(target);
        Ok(())
    }

    /// Restores holds and items in reverse order. Failures are logged.
    pub async fn undo(&self, changes: Vec<HoldChange>) {
        if changes.is_empty() {
            return;
        }
        metrics::counter!("order_compensations_total").increment(1);

        for change in changes.into_iter().rev() {
            let item = change.original;
            if change.reserved {
                let request = HoldRequest {
                    product: item.product,
                    author: item.author,
                    quantity: item.item_count,
                    order: item.order,
                    for_stock: item.for_stock,
                };
                if let Err(e) = self
                    .engine
                    .ledger()
                    .restore_hold(request, change.prior)
                    .await
                {
                    tracing::warn!(error = %e, line_item = %item.id, "failed to restore hold");
                }
            }
            let id = item.id;
            if let Err(e) = self.store.save_line_item(item).await {
                tracing::warn!(error = %e, line_item = %id, "failed to restore line item");
            }
        }
    }

    /// Releases the holds of an order that was just saved as closed.
    ///
    /// The status is already persisted, so failures are logged.
    pub async fn release_closed(&self, order: OrderId, status: &str) {
        match self
            .engine
            .ledger()
            .remove_reservation_by_order_id(order)
            .await
        {
            Ok(released) => {
                tracing::info!(order_id = %order, released, status, "order holds released");
            }
            Err(e) => {
                tracing::error!(error = %e, order_id = %order, status, "failed to release holds of closed order");
            }
        }
    }

    /// Re-validates, prices and submits an order upstream.
    ///
    /// With `restore_holds` the holds released by an earlier rejection are
    /// re-created first. A failed submission puts them back and leaves the
    /// order untouched. Priced items are only written by
    /// [`Self::save_confirmed`].
    pub async fn confirm(
        &self,
        order: &mut OrderRecord,
        restore_holds: bool,
        counterparty_id: String,
        notes: String,
    ) -> Result<Confirmation> {
        let items = self.store.line_items_for_order(order.id()).await?;
        if items.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        let author = self
            .collaborators
            .users
            .get_author(order.author())
            .await
            .ok_or(InventoryError::UserNotFound(order.author()))?;

        let (items, changes) = if restore_holds {
            let reserved = self
                .reserve_all(items.into_iter().map(ItemPlan::unchanged).collect())
                .await?;
            (reserved.items, reserved.changes)
        } else {
            for item in &items {
                self.engine
                    .ensure_available(item.product, item.order, item.item_count)
                    .await?;
            }
            (items, Vec::new())
        };

        let had_external_id = order.external_order_id().is_some();
        match self
            .price_and_submit(order, &author, items, counterparty_id, notes)
            .await
        {
            Ok(priced) => Ok(Confirmation {
                priced,
                changes,
                submitted: if had_external_id {
                    None
                } else {
                    order.external_order_id().map(str::to_owned)
                },
            }),
            Err(e) => {
                self.undo(changes).await;
                Err(e)
            }
        }
    }

    /// Saves a confirmed order, then its priced items.
    ///
    /// If the order save loses a race the restored holds are undone and an
    /// upstream id obtained by the confirmation is still recorded on the
    /// stored order, so a retry does not submit twice.
    pub async fn save_confirmed(
        &self,
        order: OrderRecord,
        confirmation: Confirmation,
    ) -> Result<OrderRecord> {
        let id = order.id();
        let saved = match self.store.save_order(order).await {
            Ok(saved) => saved,
            Err(e) => {
                self.undo(confirmation.changes).await;
                if let Some(external_id) = confirmation.submitted {
                    self.keep_external_id(id, external_id).await;
                }
                return Err(e.into());
            }
        };

        for item in confirmation.priced {
            self.store.save_line_item(item).await?;
        }
        Ok(saved)
    }

    async fn keep_external_id(&self, order: OrderId, external_id: String) {
        let mut record = match self.store.get_order(order).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(order_id = %order, %external_id, "order vanished after upstream submission");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, order_id = %order, %external_id, "failed to reload order");
                return;
            }
        };

        if let Some(existing) = record.external_order_id() {
            if existing != external_id {
                tracing::warn!(order_id = %order, existing, %external_id, "order submitted upstream twice");
            }
            return;
        }

        record.set_external_order_id(external_id);
        if let Err(e) = self.store.save_order(record).await {
            tracing::warn!(error = %e, order_id = %order, "failed to record upstream order id");
        }
    }

    async fn price_and_submit(
        &self,
        order: &mut OrderRecord,
        author: &AuthorProfile,
        items: Vec<LineItem>,
        counterparty_id: String,
        notes: String,
    ) -> Result<Vec<LineItem>> {
        let profile = order.pricing_override().unwrap_or(author.pricing);

        let mut priced = Vec::with_capacity(items.len());
        let mut positions = Vec::with_capacity(items.len());
        for mut item in items {
            let product = self.require_product(item.product).await?;
            let unit_price = product.unit_price(profile);
            item.unit_price = Some(unit_price);
            item.in_progress = false;
            positions.push(SubmissionPosition {
                external_product_id: product.external_id,
                quantity: item.item_count,
                unit_price,
            });
            priced.push(item);
        }
        let total: Money = priced.iter().filter_map(LineItem::total_price).sum();

        if order.external_order_id().is_none() {
            let submission = OrderSubmission {
                order: order.id(),
                counterparty_id,
                name: order.id().to_string(),
                positions,
                notes,
            };
            let external_id = self
                .collaborators
                .stock_service
                .submit_order(submission)
                .await?;
            tracing::info!(order_id = %order.id(), %external_id, "order submitted upstream");
            metrics::counter!("upstream_submissions_total").increment(1);
            order.set_external_order_id(external_id);
        }

        order.set_total(total);
        Ok(priced)
    }

    /// Deletes a line item and its hold. Removing the last item deletes the
    /// order, in which case `None` is returned.
    pub async fn delete_item(
        &self,
        mut order: OrderRecord,
        item: LineItem,
    ) -> Result<Option<OrderRecord>> {
        self.store.delete_line_item(item.id).await?;

        if let Err(e) = self
            .engine
            .ledger()
            .remove_reservation(item.product, item.author, item.order)
            .await
        {
            tracing::warn!(error = %e, line_item = %item.id, "failed to release hold of deleted item");
        }

        order.remove_item(item.id);
        if order.is_empty() {
            self.store.delete_order(order.id()).await?;
            tracing::info!(order_id = %order.id(), "last item removed, order deleted");
            return Ok(None);
        }
        Ok(Some(self.store.save_order(order).await?))
    }

    pub async fn notify(&self, order: &OrderRecord, kind: NotificationKind) {
        self.collaborators
            .notifier
            .notify(Notification {
                recipient: order.author(),
                order: order.id(),
                kind,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use domain::{PriceList, StockOrder};
    use inventory_store::InMemoryInventoryStore;

    use super::*;
    use crate::ledger::ReservationLedger;
    use crate::services::{InMemoryNotifier, InMemoryStockService, InMemoryUserDirectory};

    fn lifecycle(store: InMemoryInventoryStore) -> OrderLifecycle<InMemoryInventoryStore> {
        let ledger = ReservationLedger::new(store.clone(), HoldPolicy::default());
        OrderLifecycle {
            engine: QuantityEngine::new(store.clone(), ledger),
            store,
            collaborators: Collaborators::new(
                Arc::new(InMemoryUserDirectory::new()),
                Arc::new(InMemoryStockService::new()),
                Arc::new(InMemoryNotifier::new()),
            ),
            settings: InventorySettings::default(),
        }
    }

    async fn product(store: &InMemoryInventoryStore, count: u32) -> ProductId {
        let p = Product::new("EXT", "Widget", count, PriceList::flat(Money::from_cents(100)));
        let id = p.id;
        store.save_product(p).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_reserve_all_compensates_earlier_items() {
        let store = InMemoryInventoryStore::new();
        let lc = lifecycle(store.clone());
        let plenty = product(&store, 10).await;
        let scarce = product(&store, 1).await;
        let order = StockOrder::new(UserId::new(), Utc::now());

        let mut first = LineItem::new(order.id, plenty, order.author, 2, true);
        first.reserved = Some(
            lc.engine
                .reserve(plenty, order.author, 2, order.id, true)
                .await
                .unwrap(),
        );
        store.save_line_item(first.clone()).await.unwrap();
        let second = LineItem::new(order.id, scarce, order.author, 1, true);
        store.save_line_item(second.clone()).await.unwrap();

        let grow = |item: &LineItem, count| {
            let mut target = item.clone();
            target.item_count = count;
            ItemPlan {
                original: item.clone(),
                target,
            }
        };

        let err = lc
            .reserve_all(vec![grow(&first, 8), grow(&second, 5)])
            .await
            .unwrap_err();
        assert!(matches!(err, InventoryError::InsufficientStock { .. }));

        let hold = store.find_reservation(plenty, order.id).await.unwrap().unwrap();
        assert_eq!(hold.quantity, 2);
        assert!(store.find_reservation(scarce, order.id).await.unwrap().is_none());
        assert_eq!(store.get_line_item(first.id).await.unwrap().unwrap().item_count, 2);
        assert_eq!(store.get_line_item(second.id).await.unwrap().unwrap().item_count, 1);
    }
}
