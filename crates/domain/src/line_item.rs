//! Order line items.

use common::{LineItemId, OrderId, ProductId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

use crate::value_objects::Money;

/// One product entry of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub id: LineItemId,
    pub order: OrderId,
    pub product: ProductId,
    pub author: UserId,
    pub item_count: u32,

    /// Reservation currently covering this item, cleared when the hold is
    /// released without deleting the item.
    pub reserved: Option<ReservationId>,

    /// True while the owning order is still a mutable cart.
    pub in_progress: bool,

    pub for_stock: bool,

    /// Unit price fixed when the order is confirmed.
    #[serde(default)]
    pub unit_price: Option<Money>,
}

impl LineItem {
    pub fn new(
        order: OrderId,
        product: ProductId,
        author: UserId,
        item_count: u32,
        for_stock: bool,
    ) -> Self {
        Self {
            id: LineItemId::new(),
            order,
            product,
            author,
            item_count,
            reserved: None,
            in_progress: true,
            for_stock,
            unit_price: None,
        }
    }

    /// Line total once priced.
    pub fn total_price(&self) -> Option<Money> {
        self.unit_price.map(|p| p.multiply(self.item_count))
    }
}
