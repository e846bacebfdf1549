//! Availability reads and the checked reservation path.

use std::time::Instant;

use common::{OrderId, ProductId, ReservationId, UserId};
use domain::{QuantityDetails, available_for_order, validate_quantity};
use inventory_store::InventoryStore;

use crate::error::{InventoryError, Result};
use crate::ledger::{HoldRequest, ReservationLedger};

/// Computes availability and places holds only when stock allows.
#[derive(Debug, Clone)]
pub struct QuantityEngine<S> {
    store: S,
    ledger: ReservationLedger<S>,
}

impl<S> QuantityEngine<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, ledger: ReservationLedger<S>) -> Self {
        Self { store, ledger }
    }

    pub fn ledger(&self) -> &ReservationLedger<S> {
        &self.ledger
    }

    /// Physical count, total reserved and available units of a product.
    #[tracing::instrument(skip(self))]
    pub async fn get_product_quantity_details(&self, product: ProductId) -> Result<QuantityDetails> {
        let snapshot = self
            .store
            .product_snapshot(product)
            .await?
            .ok_or(InventoryError::ProductNotFound(product))?;
        Ok(QuantityDetails::compute(&snapshot.product, &snapshot.reservations))
    }

    /// Pre-flight check that `order` could hold `quantity` units right now.
    ///
    /// Does not reserve anything; the answer may be stale by the time a
    /// hold is written. Returns the units available to the order.
    pub async fn ensure_available(
        &self,
        product: ProductId,
        order: OrderId,
        quantity: u32,
    ) -> Result<u32> {
        let snapshot = self
            .store
            .product_snapshot(product)
            .await?
            .ok_or(InventoryError::ProductNotFound(product))?;
        let available = available_for_order(&snapshot.product, &snapshot.reservations, order);
        if quantity > available {
            return Err(InventoryError::InsufficientStock {
                product,
                requested: quantity,
                available,
            });
        }
        Ok(available)
    }

    /// Checks availability and writes the hold in one optimistic step.
    ///
    /// The write only lands if the product's reservation set is unchanged
    /// since the check; otherwise the check is repeated on fresh data.
    #[tracing::instrument(skip(self))]
    pub async fn reserve(
        &self,
        product: ProductId,
        author: UserId,
        quantity: u32,
        order: OrderId,
        for_stock: bool,
    ) -> Result<ReservationId> {
        let started = Instant::now();
        let request = HoldRequest {
            product,
            author,
            quantity: validate_quantity(quantity)?,
            order,
            for_stock,
        };

        let result = self
            .ledger
            .upsert_guarded(request, |snapshot| {
                let available =
                    available_for_order(&snapshot.product, &snapshot.reservations, order);
                if quantity > available {
                    return Err(InventoryError::InsufficientStock {
                        product,
                        requested: quantity,
                        available,
                    });
                }
                Ok(())
            })
            .await;

        metrics::histogram!("reserve_duration_seconds").record(started.elapsed().as_secs_f64());
        if let Err(InventoryError::InsufficientStock { .. }) = result {
            metrics::counter!("reservations_rejected_total").increment(1);
        }

        result.map(|outcome| outcome.reservation.id)
    }
}
