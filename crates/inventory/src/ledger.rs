//! Reservation ledger: the only writer of product holds.

use chrono::Utc;
use common::{OrderId, ProductId, ReservationId, UserId};
use domain::{HoldPolicy, Reservation, ReservationUpsert, validate_quantity};
use inventory_store::{InventoryStore, ProductSnapshot, UpsertOutcome};

use crate::error::{InventoryError, Result};

/// Attempts of the optimistic read-check-write loop before giving up.
pub const MAX_ATTEMPTS: u32 = 5;

/// What a hold write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldRequest {
    pub product: ProductId,
    pub author: UserId,
    pub quantity: u32,
    pub order: OrderId,
    pub for_stock: bool,
}

/// Creates, re-quantifies and releases reservations.
///
/// Every write goes through the store's atomic upsert or delete and is
/// guarded by the product's `reservation_version`.
#[derive(Debug, Clone)]
pub struct ReservationLedger<S> {
    store: S,
    policy: HoldPolicy,
}

impl<S> ReservationLedger<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S, policy: HoldPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> HoldPolicy {
        self.policy
    }

    /// Upserts the `(product, order)` hold without checking availability.
    #[tracing::instrument(skip(self))]
    pub async fn create_or_update_reservation(
        &self,
        product: ProductId,
        author: UserId,
        quantity: u32,
        order: OrderId,
        for_stock: bool,
    ) -> Result<ReservationId> {
        let request = HoldRequest {
            product,
            author,
            quantity: validate_quantity(quantity)?,
            order,
            for_stock,
        };
        let outcome = self.upsert_guarded(request, |_| Ok(())).await?;
        Ok(outcome.reservation.id)
    }

    /// Runs `check` against a fresh snapshot and writes the hold only if the
    /// product is still at the version the check saw. Retries on conflict.
    pub(crate) async fn upsert_guarded<F>(
        &self,
        request: HoldRequest,
        check: F,
    ) -> Result<UpsertOutcome>
    where
        F: Fn(&ProductSnapshot) -> Result<()> + Send + Sync,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            let snapshot = self
                .store
                .product_snapshot(request.product)
                .await?
                .ok_or(InventoryError::ProductNotFound(request.product))?;

            check(&snapshot)?;

            let upsert = ReservationUpsert {
                product: request.product,
                order: request.order,
                author: request.author,
                quantity: request.quantity,
                for_stock: request.for_stock,
                now: Utc::now(),
                hold_for: self.policy.hold_for(request.for_stock),
            };

            match self
                .store
                .upsert_reservation(upsert, Some(snapshot.version()))
                .await
            {
                Ok(outcome) => {
                    if outcome.created {
                        metrics::counter!("reservations_created_total").increment(1);
                    } else {
                        metrics::counter!("reservations_updated_total").increment(1);
                    }
                    return Ok(outcome);
                }
                Err(e) if e.is_conflict() => {
                    metrics::counter!("reservation_retries_total").increment(1);
                    tracing::debug!(attempt, product_id = %request.product, "reservation version moved, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(InventoryError::RetriesExhausted(request.product))
    }

    /// Releases the hold of `order` on `product`. Missing holds are logged, not errors.
    #[tracing::instrument(skip(self))]
    pub async fn remove_reservation(
        &self,
        product: ProductId,
        author: UserId,
        order: OrderId,
    ) -> Result<Option<Reservation>> {
        let found = self
            .store
            .find_reservation(product, order)
            .await?
            .filter(|r| r.author == author);

        let Some(reservation) = found else {
            tracing::warn!(%product, %order, "no reservation to remove");
            return Ok(None);
        };

        let removed = self.store.delete_reservation(reservation.id).await?;
        if removed.is_some() {
            metrics::counter!("reservations_released_total").increment(1);
        }
        Ok(removed)
    }

    /// Releases every hold of an order. Returns how many were removed.
    #[tracing::instrument(skip(self))]
    pub async fn remove_reservation_by_order_id(&self, order: OrderId) -> Result<usize> {
        let reservations = self.store.reservations_for_order(order).await?;
        self.release_all(reservations).await
    }

    /// Releases every hold of an author.
    #[tracing::instrument(skip(self))]
    pub async fn remove_all_user_reservations(&self, author: UserId) -> Result<usize> {
        let reservations = self.store.reservations_for_author(author).await?;
        if reservations.is_empty() {
            return Err(InventoryError::NoReservationsFound(author));
        }
        self.release_all(reservations).await
    }

    async fn release_all(&self, reservations: Vec<Reservation>) -> Result<usize> {
        let mut released = 0;
        for reservation in reservations {
            if self.store.delete_reservation(reservation.id).await?.is_some() {
                released += 1;
            }
        }
        metrics::counter!("reservations_released_total").increment(released as u64);
        Ok(released)
    }

    /// Puts a hold back to `prior` units, or releases it when there was none.
    pub(crate) async fn restore_hold(&self, request: HoldRequest, prior: Option<u32>) -> Result<()> {
        match prior {
            Some(quantity) => {
                let request = HoldRequest { quantity, ..request };
                self.upsert_guarded(request, |_| Ok(())).await?;
            }
            None => {
                if let Some(existing) = self
                    .store
                    .find_reservation(request.product, request.order)
                    .await?
                {
                    self.store.delete_reservation(existing.id).await?;
                    metrics::counter!("reservations_released_total").increment(1);
                }
            }
        }
        Ok(())
    }

    pub async fn get_reservation_by_product_and_order(
        &self,
        product: ProductId,
        order: OrderId,
    ) -> Result<Option<Reservation>> {
        let found = self.store.find_reservation(product, order).await?;
        if found.is_none() {
            tracing::debug!(%product, %order, "reservation not found");
        }
        Ok(found)
    }

    pub async fn get_reservations_by_product(&self, product: ProductId) -> Result<Vec<Reservation>> {
        let found = self.store.reservations_for_product(product).await?;
        if found.is_empty() {
            tracing::debug!(%product, "product has no reservations");
        }
        Ok(found)
    }

    pub async fn get_user_reservations(&self, author: UserId) -> Result<Vec<Reservation>> {
        Ok(self.store.reservations_for_author(author).await?)
    }
}
