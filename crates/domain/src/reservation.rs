//! Reservation rows and hold durations.

use chrono::{DateTime, Duration, Utc};
use common::{OrderId, ProductId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

/// A timed hold of `quantity` units of a product against one order.
///
/// At most one reservation exists per `(product, order)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product: ProductId,
    pub order: OrderId,
    pub author: UserId,
    pub quantity: u32,
    pub for_stock: bool,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Returns true once `expires_at` has been reached.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Parameters of a reservation insert-or-update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationUpsert {
    pub product: ProductId,
    pub order: OrderId,
    pub author: UserId,
    pub quantity: u32,
    pub for_stock: bool,
    pub now: DateTime<Utc>,
    /// Hold length applied only when a new row is created.
    pub hold_for: Duration,
}

impl ReservationUpsert {
    /// Builds the row to insert when no reservation exists for the pair yet.
    pub fn new_reservation(&self) -> Reservation {
        Reservation {
            id: ReservationId::new(),
            product: self.product,
            order: self.order,
            author: self.author,
            quantity: self.quantity,
            for_stock: self.for_stock,
            reserved_at: self.now,
            expires_at: self.now + self.hold_for,
        }
    }

    /// Applies the re-quantify to an existing row in place.
    pub fn apply_to(&self, existing: &mut Reservation) {
        existing.quantity = self.quantity;
        existing.reserved_at = self.now;
    }
}

/// How long new holds last before the sweeper may release them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldPolicy {
    pub customer: Duration,
    pub stock: Duration,
}

impl HoldPolicy {
    pub fn hold_for(&self, for_stock: bool) -> Duration {
        if for_stock { self.stock } else { self.customer }
    }
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            customer: Duration::hours(1),
            stock: Duration::days(2),
        }
    }
}
