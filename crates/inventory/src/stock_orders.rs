//! Stock order workflow for staff-placed B2B orders.

use chrono::Utc;
use common::{LineItemId, OrderId, ProductId, UserId};
use domain::{
    Counterparty, LineItem, OrderError, OrderKind, OrderLike, OrderRecord, PricingProfile,
    StatusEffect, StockOrder, StockOrderStatus, validate_quantity,
};
use inventory_store::{InventoryStore, OrderQuery, StoreError};
use serde::Deserialize;

use crate::error::{InventoryError, Result};
use crate::lifecycle::{ItemPlan, OrderLifecycle, OrderView, Page};
use crate::services::NotificationKind;

/// New quantity for a product already in the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ItemQuantity {
    pub product: ProductId,
    pub quantity: u32,
}

/// Partial update of an in-progress stock order. Absent fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StockOrderUpdate {
    #[serde(default)]
    pub counterparty: Option<Counterparty>,
    #[serde(default)]
    pub necessary_notes: Option<String>,
    #[serde(default)]
    pub pricing: Option<PricingProfile>,
    #[serde(default)]
    pub items: Vec<ItemQuantity>,
}

#[derive(Clone)]
pub struct StockOrderService<S> {
    lifecycle: OrderLifecycle<S>,
}

impl<S> StockOrderService<S>
where
    S: InventoryStore + Clone,
{
    pub(crate) fn new(lifecycle: OrderLifecycle<S>) -> Self {
        Self { lifecycle }
    }

    /// Opens a new stock order. An author may keep several in progress, but
    /// only one of them empty.
    #[tracing::instrument(skip(self))]
    pub async fn create_empty_stock_order(&self, author: UserId) -> Result<StockOrder> {
        let lc = &self.lifecycle;
        lc.authorize(author).await?;

        let order = StockOrder::new(author, Utc::now());
        let id = order.id;
        let record = lc
            .store
            .insert_order(order.into())
            .await
            .map_err(|e| match e {
                StoreError::EmptyStockOrderExists(author) => {
                    InventoryError::EmptyStockOrderExists(author)
                }
                e => e.into(),
            })?;
        metrics::counter!("orders_created_total", "kind" => "stock").increment(1);
        record.into_stock().ok_or(InventoryError::OrderNotFound(id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_product_to_stock_order(
        &self,
        order: OrderId,
        product: ProductId,
        quantity: u32,
    ) -> Result<OrderView> {
        let lc = &self.lifecycle;
        let stock = self.load_stock_order(order).await?;
        stock.ensure_editable()?;
        validate_quantity(quantity)?;
        lc.authorize(stock.author).await?;
        lc.require_product(product).await?;

        if lc.store.find_line_item(order, product).await?.is_some() {
            return Err(OrderError::ItemAlreadyAdded { product }.into());
        }

        let reservation = lc
            .engine
            .reserve(product, stock.author, quantity, order, true)
            .await?;
        let mut item = LineItem::new(order, product, stock.author, quantity, true);
        item.reserved = Some(reservation);
        lc.store.save_line_item(item.clone()).await?;

        let mut record = OrderRecord::from(stock);
        record.add_item(item.id);
        match lc.store.save_order(record).await {
            Ok(record) => lc.view(record).await,
            Err(e) => {
                self.drop_item(&item).await;
                Err(e.into())
            }
        }
    }

    async fn drop_item(&self, item: &LineItem) {
        let lc = &self.lifecycle;
        if let Err(e) = lc.store.delete_line_item(item.id).await {
            tracing::warn!(error = %e, line_item = %item.id, "failed to drop line item");
        }
        if let Err(e) = lc
            .engine
            .ledger()
            .remove_reservation(item.product, item.author, item.order)
            .await
        {
            tracing::warn!(error = %e, line_item = %item.id, "failed to release hold");
        }
    }

    /// Applies counterparty, notes, pricing and item quantities at once.
    ///
    /// Item re-quantifies are all-or-nothing.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_stock_order(
        &self,
        order: OrderId,
        update: StockOrderUpdate,
    ) -> Result<OrderView> {
        let lc = &self.lifecycle;
        let mut stock = self.load_stock_order(order).await?;
        stock.ensure_editable()?;

        let mut plans = Vec::with_capacity(update.items.len());
        if !update.items.is_empty() {
            lc.authorize(stock.author).await?;
        }
        for change in &update.items {
            validate_quantity(change.quantity)?;
            let original = lc
                .store
                .find_line_item(order, change.product)
                .await?
                .ok_or(InventoryError::ProductNotInOrder {
                    order,
                    product: change.product,
                })?;
            let mut target = original.clone();
            target.item_count = change.quantity;
            plans.push(ItemPlan { original, target });
        }
        let reserved = lc.reserve_all(plans).await?;

        if let Some(counterparty) = update.counterparty {
            stock.counterparty = Some(counterparty);
        }
        if let Some(notes) = update.necessary_notes {
            stock.necessary_notes = notes;
        }
        if let Some(pricing) = update.pricing {
            stock.pricing = Some(pricing);
        }

        match lc.store.save_order(stock.into()).await {
            Ok(record) => lc.view(record).await,
            Err(e) => {
                lc.undo(reserved.changes).await;
                Err(e.into())
            }
        }
    }

    /// Prices the order and submits it upstream. Requires a counterparty.
    pub async fn confirm_stock_order(&self, order: OrderId) -> Result<OrderView> {
        self.change_stock_order_status(order, Some(StockOrderStatus::Confirmed))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn change_stock_order_status(
        &self,
        order: OrderId,
        target: Option<StockOrderStatus>,
    ) -> Result<OrderView> {
        let lc = &self.lifecycle;
        let mut stock = self.load_stock_order(order).await?;
        let (target, effect) = stock.plan_status_change(target)?;
        let now = Utc::now();

        let record = match effect {
            StatusEffect::None => return lc.view(stock.into()).await,
            StatusEffect::Confirm { restore_holds } => {
                let counterparty = stock.ensure_counterparty()?.id.clone();
                let notes = stock.necessary_notes.clone();
                let mut record = OrderRecord::from(stock);
                let confirmation = lc
                    .confirm(&mut record, restore_holds, counterparty, notes)
                    .await?;
                let mut stock = record
                    .into_stock()
                    .ok_or(InventoryError::OrderNotFound(order))?;
                stock.apply_status_change(target, effect, now);
                lc.save_confirmed(stock.into(), confirmation).await?
            }
            StatusEffect::Reject | StatusEffect::Complete => {
                stock.apply_status_change(target, effect, now);
                let record = lc.store.save_order(stock.into()).await?;
                lc.release_closed(order, target.as_str()).await;
                record
            }
            StatusEffect::CommitCart | StatusEffect::Deliver | StatusEffect::Reorder => {
                stock.apply_status_change(target, effect, now);
                lc.store.save_order(stock.into()).await?
            }
        };

        metrics::counter!("stock_order_status_changes_total", "status" => target.as_str())
            .increment(1);
        lc.notify(
            &record,
            NotificationKind::StatusChanged {
                status: target.to_string(),
            },
        )
        .await;
        lc.view(record).await
    }

    /// Returns `None` when the last item was removed and the order deleted.
    #[tracing::instrument(skip(self))]
    pub async fn delete_stock_order_item(
        &self,
        order: OrderId,
        item: LineItemId,
    ) -> Result<Option<OrderView>> {
        let lc = &self.lifecycle;
        let stock = self.load_stock_order(order).await?;
        stock.ensure_editable()?;

        let record = OrderRecord::from(stock);
        let item = lc.find_item(&record, item).await?;
        match lc.delete_item(record, item).await? {
            Some(record) => Ok(Some(lc.view(record).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_stock_order(&self, order: OrderId) -> Result<OrderView> {
        let stock = self.load_stock_order(order).await?;
        self.lifecycle.view(stock.into()).await
    }

    pub async fn list_stock_orders(
        &self,
        author: Option<UserId>,
        status: Option<StockOrderStatus>,
        page: Page,
    ) -> Result<Vec<StockOrder>> {
        let mut query = OrderQuery::for_kind(OrderKind::Stock);
        if let Some(author) = author {
            query = query.author(author);
        }
        if let Some(status) = status {
            query = query.statuses(vec![status.as_str()]);
        }
        let records = self
            .lifecycle
            .store
            .list_orders(query.page(page.page, page.per_page))
            .await?;
        Ok(records
            .into_iter()
            .filter_map(OrderRecord::into_stock)
            .collect())
    }

    async fn load_stock_order(&self, order: OrderId) -> Result<StockOrder> {
        self.lifecycle
            .load_order(order)
            .await?
            .into_stock()
            .ok_or(InventoryError::OrderNotFound(order))
    }
}
