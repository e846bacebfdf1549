//! Product quantity ledger entry.

use common::{ProductId, ReservationId, Version};
use serde::{Deserialize, Serialize};

use crate::value_objects::{Money, PriceList, PricingProfile};

/// A catalog product as seen by the reservation core.
///
/// The catalog owns everything except `reservations` and
/// `reservation_version`, which the store maintains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,

    /// Identifier of the product in the upstream stock service.
    pub external_id: String,

    pub title: String,

    /// Physical units on hand.
    pub physical_count: u32,

    pub prices: PriceList,

    /// Ids of every outstanding reservation on this product.
    #[serde(default)]
    pub reservations: Vec<ReservationId>,

    /// Advanced on every change to `reservations` or `physical_count`; the
    /// compare-and-swap key for check-and-reserve.
    #[serde(default)]
    pub reservation_version: Version,
}

impl Product {
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        physical_count: u32,
        prices: PriceList,
    ) -> Self {
        Self {
            id: ProductId::new(),
            external_id: external_id.into(),
            title: title.into(),
            physical_count,
            prices,
            reservations: Vec::new(),
            reservation_version: Version::initial(),
        }
    }

    /// Returns the unit price under a pricing profile.
    pub fn unit_price(&self, profile: PricingProfile) -> Money {
        self.prices.for_tier(profile.tier).discounted(profile.discount)
    }

    /// Adds a reservation id to the set, ignoring duplicates.
    pub fn attach_reservation(&mut self, id: ReservationId) {
        if !self.reservations.contains(&id) {
            self.reservations.push(id);
        }
    }

    /// Pulls a reservation id from the set. Returns true if it was present.
    pub fn detach_reservation(&mut self, id: ReservationId) -> bool {
        let before = self.reservations.len();
        self.reservations.retain(|r| *r != id);
        before != self.reservations.len()
    }
}
