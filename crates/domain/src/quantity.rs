//! Available-quantity arithmetic.

use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::product::Product;
use crate::reservation::Reservation;

/// Physical count, reserved total and what is left for sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityDetails {
    pub current_count: u32,
    pub available_quantity: u32,
    pub total_reserved_quantity: u32,
}

impl QuantityDetails {
    /// Computes availability over every reservation on the product.
    pub fn compute(product: &Product, reservations: &[Reservation]) -> Self {
        let total_reserved_quantity = total_reserved(reservations.iter());
        Self {
            current_count: product.physical_count,
            available_quantity: product.physical_count.saturating_sub(total_reserved_quantity),
            total_reserved_quantity,
        }
    }
}

/// Units an order may hold: physical count minus holds of every *other*
/// order, floored at zero. The order's own current hold is not counted
/// against it, so re-quantifying replaces rather than stacks.
pub fn available_for_order(product: &Product, reservations: &[Reservation], order: OrderId) -> u32 {
    let held_by_others = total_reserved(reservations.iter().filter(|r| r.order != order));
    product.physical_count.saturating_sub(held_by_others)
}

fn total_reserved<'a>(reservations: impl Iterator<Item = &'a Reservation>) -> u32 {
    reservations.fold(0u32, |acc, r| acc.saturating_add(r.quantity))
}
