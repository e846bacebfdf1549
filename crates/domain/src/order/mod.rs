//! Customer and stock orders.

mod customer;
mod state;
mod stock;

pub use customer::{CustomerOrder, Packaging};
pub use state::{OrderStatus, StatusEffect, StockOrderStatus};
pub use stock::{Counterparty, StockOrder};

use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId, ProductId, UserId, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ErrorKind, ReasonCode};
use crate::value_objects::{Money, PricingProfile};

/// Errors raised by order rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The target status is not reachable from the current one.
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: &'static str,
        to: &'static str,
    },

    /// A status change was requested without a target.
    #[error("Target status is required")]
    StatusRequired,

    /// The customer cart has been committed and is locked.
    #[error("Order has already been ordered")]
    AlreadyOrdered,

    /// The stock order has left the in-progress state.
    #[error("Order is not in progress (status: {status})")]
    NotInProgress { status: &'static str },

    /// Item quantities must be positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// The order has no items to commit or confirm.
    #[error("Order has no items")]
    NoItems,

    /// A stock order cannot be confirmed without a counterparty.
    #[error("Counterparty is required to confirm a stock order")]
    CounterpartyRequired,

    /// The product already has a line in this stock order.
    #[error("Product {product} is already in the order")]
    ItemAlreadyAdded { product: ProductId },
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::StatusRequired
            | OrderError::InvalidQuantity { .. }
            | OrderError::CounterpartyRequired => ErrorKind::BadRequest,
            OrderError::InvalidStatusTransition { .. }
            | OrderError::AlreadyOrdered
            | OrderError::NotInProgress { .. }
            | OrderError::NoItems
            | OrderError::ItemAlreadyAdded { .. } => ErrorKind::Conflict,
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            OrderError::InvalidStatusTransition { .. } => ReasonCode::InvalidStatusTransition,
            OrderError::StatusRequired => ReasonCode::StatusRequired,
            OrderError::AlreadyOrdered => ReasonCode::OrderAlreadyOrdered,
            OrderError::NotInProgress { .. } => ReasonCode::OrderNotInProgress,
            OrderError::InvalidQuantity { .. } => ReasonCode::InvalidQuantity,
            OrderError::NoItems => ReasonCode::OrderHasNoItems,
            OrderError::CounterpartyRequired => ReasonCode::CounterpartyRequired,
            OrderError::ItemAlreadyAdded { .. } => ReasonCode::OrderItemAlreadyAdded,
        }
    }
}

/// Rejects zero quantities.
pub fn validate_quantity(quantity: u32) -> Result<u32, OrderError> {
    if quantity == 0 {
        return Err(OrderError::InvalidQuantity { quantity });
    }
    Ok(quantity)
}

/// Which of the two order families a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Customer,
    Stock,
}

impl OrderKind {
    pub fn for_stock(&self) -> bool {
        matches!(self, OrderKind::Stock)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Customer => "customer",
            OrderKind::Stock => "stock",
        }
    }
}

/// Lifecycle timestamps stamped by status changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTimestamps {
    pub confirmed_time: Option<DateTime<Utc>>,
    pub accepted_time: Option<DateTime<Utc>>,
    pub delivered_time: Option<DateTime<Utc>>,
    pub rejected_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
}

/// Shape shared by customer and stock orders.
///
/// The workflow layer drives reservations, pricing and upstream submission
/// through this trait so both order families follow the same rules.
pub trait OrderLike {
    fn id(&self) -> OrderId;
    fn author(&self) -> UserId;
    fn kind(&self) -> OrderKind;
    fn items(&self) -> &[LineItemId];
    fn items_mut(&mut self) -> &mut Vec<LineItemId>;
    fn version(&self) -> Version;
    fn set_version(&mut self, version: Version);
    fn is_in_progress(&self) -> bool;
    fn status_str(&self) -> &'static str;
    fn external_order_id(&self) -> Option<&str>;
    fn set_external_order_id(&mut self, id: String);
    fn set_total(&mut self, total: Money);

    /// Pricing profile that overrides the author's, if any.
    fn pricing_override(&self) -> Option<PricingProfile> {
        None
    }

    fn add_item(&mut self, item: LineItemId) {
        let items = self.items_mut();
        if !items.contains(&item) {
            items.push(item);
        }
    }

    /// Removes the item id; returns false if it was not present.
    fn remove_item(&mut self, item: LineItemId) -> bool {
        let items = self.items_mut();
        let before = items.len();
        items.retain(|i| *i != item);
        items.len() != before
    }

    fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}

/// A stored order of either family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OrderRecord {
    Customer(CustomerOrder),
    Stock(StockOrder),
}

impl OrderRecord {
    pub fn as_customer(&self) -> Option<&CustomerOrder> {
        match self {
            OrderRecord::Customer(order) => Some(order),
            OrderRecord::Stock(_) => None,
        }
    }

    pub fn into_customer(self) -> Option<CustomerOrder> {
        match self {
            OrderRecord::Customer(order) => Some(order),
            OrderRecord::Stock(_) => None,
        }
    }

    pub fn as_stock(&self) -> Option<&StockOrder> {
        match self {
            OrderRecord::Stock(order) => Some(order),
            OrderRecord::Customer(_) => None,
        }
    }

    pub fn into_stock(self) -> Option<StockOrder> {
        match self {
            OrderRecord::Stock(order) => Some(order),
            OrderRecord::Customer(_) => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            OrderRecord::Customer(order) => order.created_at,
            OrderRecord::Stock(order) => order.created_at,
        }
    }

    fn inner(&self) -> &dyn OrderLike {
        match self {
            OrderRecord::Customer(order) => order,
            OrderRecord::Stock(order) => order,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn OrderLike {
        match self {
            OrderRecord::Customer(order) => order,
            OrderRecord::Stock(order) => order,
        }
    }
}

impl From<CustomerOrder> for OrderRecord {
    fn from(order: CustomerOrder) -> Self {
        OrderRecord::Customer(order)
    }
}

impl From<StockOrder> for OrderRecord {
    fn from(order: StockOrder) -> Self {
        OrderRecord::Stock(order)
    }
}

impl OrderLike for OrderRecord {
    fn id(&self) -> OrderId {
        self.inner().id()
    }

    fn author(&self) -> UserId {
        self.inner().author()
    }

    fn kind(&self) -> OrderKind {
        self.inner().kind()
    }

    fn items(&self) -> &[LineItemId] {
        self.inner().items()
    }

    fn items_mut(&mut self) -> &mut Vec<LineItemId> {
        self.inner_mut().items_mut()
    }

    fn version(&self) -> Version {
        self.inner().version()
    }

    fn set_version(&mut self, version: Version) {
        self.inner_mut().set_version(version);
    }

    fn is_in_progress(&self) -> bool {
        self.inner().is_in_progress()
    }

    fn status_str(&self) -> &'static str {
        self.inner().status_str()
    }

    fn external_order_id(&self) -> Option<&str> {
        self.inner().external_order_id()
    }

    fn set_external_order_id(&mut self, id: String) {
        self.inner_mut().set_external_order_id(id);
    }

    fn set_total(&mut self, total: Money) {
        self.inner_mut().set_total(total);
    }

    fn pricing_override(&self) -> Option<PricingProfile> {
        self.inner().pricing_override()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert_eq!(OrderError::AlreadyOrdered.kind(), ErrorKind::Conflict);
        assert_eq!(
            OrderError::AlreadyOrdered.reason(),
            ReasonCode::OrderAlreadyOrdered
        );
        assert_eq!(OrderError::StatusRequired.kind(), ErrorKind::BadRequest);
        assert_eq!(
            OrderError::CounterpartyRequired.reason(),
            ReasonCode::CounterpartyRequired
        );
        assert_eq!(OrderError::NoItems.reason(), ReasonCode::OrderHasNoItems);
    }

    #[test]
    fn test_validate_quantity() {
        assert_eq!(validate_quantity(3), Ok(3));
        assert_eq!(
            validate_quantity(0),
            Err(OrderError::InvalidQuantity { quantity: 0 })
        );
    }

    #[test]
    fn test_item_set_semantics() {
        let mut order: OrderRecord = CustomerOrder::new(UserId::new(), "Ann", Utc::now()).into();
        let item = LineItemId::new();
        order.add_item(item);
        order.add_item(item);
        assert_eq!(order.items().len(), 1);
        assert!(order.remove_item(item));
        assert!(!order.remove_item(item));
        assert!(order.is_empty());
    }

    #[test]
    fn test_record_accessors() {
        let stock: OrderRecord = StockOrder::new(UserId::new(), Utc::now()).into();
        assert_eq!(stock.kind(), OrderKind::Stock);
        assert!(stock.as_customer().is_none());
        assert!(stock.as_stock().is_some());
        assert!(stock.is_in_progress());
    }

    #[test]
    fn test_record_serializes_with_kind_tag() {
        let order: OrderRecord = CustomerOrder::new(UserId::new(), "Ann", Utc::now()).into();
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["kind"], "customer");
        let back: OrderRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
