//! Periodic release of expired, uncommitted holds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use inventory_store::{InventoryStore, SweepOutcome};
use tokio::sync::watch;

use crate::error::Result;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Counts of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub released: usize,
    pub skipped: usize,
}

/// Releases expired holds whose line item is still in progress.
///
/// Holds of committed items are kept: they are the record of stock
/// promised to an order.
#[derive(Debug, Clone)]
pub struct ExpirationSweeper<S> {
    store: S,
    interval: Duration,
    batch_size: usize,
}

impl<S> ExpirationSweeper<S>
where
    S: InventoryStore + Clone,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            interval: DEFAULT_SWEEP_INTERVAL,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Examines up to one batch of holds expired at `now`.
    #[tracing::instrument(skip(self))]
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let expired = self
            .store
            .expired_reservations(now, self.batch_size)
            .await?;

        let mut report = SweepReport {
            examined: expired.len(),
            ..Default::default()
        };

        for reservation in expired {
            match self
                .store
                .release_expired_reservation(reservation.id, now)
                .await
            {
                Ok(SweepOutcome::Released(_)) => report.released += 1,
                Ok(SweepOutcome::Committed) => {
                    tracing::debug!(reservation_id = %reservation.id, "line item committed, hold kept");
                    report.skipped += 1;
                }
                Ok(SweepOutcome::Orphaned) | Ok(SweepOutcome::Gone) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(error = %e, reservation_id = %reservation.id, "failed to release expired hold");
                    report.skipped += 1;
                }
            }
        }

        metrics::counter!("sweeper_released_total").increment(report.released as u64);
        metrics::counter!("sweeper_skipped_total").increment(report.skipped as u64);
        if report.examined > 0 {
            tracing::info!(
                examined = report.examined,
                released = report.released,
                skipped = report.skipped,
                "sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps on every tick until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(interval_secs = self.interval.as_secs(), batch_size = self.batch_size, "sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once(Utc::now()).await {
                        tracing::error!(error = %e, "sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use common::{OrderId, UserId};
    use domain::{HoldPolicy, LineItem, Money, PriceList, Product, ReservationUpsert};
    use inventory_store::InMemoryInventoryStore;

    use super::*;

    async fn hold(store: &InMemoryInventoryStore, in_progress: Option<bool>) -> DateTime<Utc> {
        let product = Product::new("EXT", "Widget", 10, PriceList::flat(Money::from_cents(100)));
        let product_id = product.id;
        store.save_product(product).await.unwrap();

        let order = OrderId::new();
        let author = UserId::new();
        let now = Utc::now();
        let outcome = store
            .upsert_reservation(
                ReservationUpsert {
                    product: product_id,
                    order,
                    author,
                    quantity: 2,
                    for_stock: false,
                    now,
                    hold_for: HoldPolicy::default().customer,
                },
                None,
            )
            .await
            .unwrap();

        if let Some(in_progress) = in_progress {
            let mut item = LineItem::new(order, product_id, author, 2, false);
            item.reserved = Some(outcome.reservation.id);
            item.in_progress = in_progress;
            store.save_line_item(item).await.unwrap();
        }
        outcome.reservation.expires_at
    }

    #[tokio::test]
    async fn test_sweep_releases_only_in_progress_items() {
        let store = InMemoryInventoryStore::new();
        let expires = hold(&store, Some(true)).await;
        hold(&store, Some(false)).await;
        hold(&store, None).await;

        let sweeper = ExpirationSweeper::new(store.clone());

        let early = sweeper.sweep_once(Utc::now()).await.unwrap();
        assert_eq!(early, SweepReport::default());

        let report = sweeper
            .sweep_once(expires + ChronoDuration::minutes(1))
            .await
            .unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.released, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(store.reservation_count().await, 2);
    }

    #[tokio::test]
    async fn test_sweep_is_batched() {
        let store = InMemoryInventoryStore::new();
        let mut latest = Utc::now();
        for _ in 0..3 {
            latest = hold(&store, Some(true)).await;
        }

        let sweeper = ExpirationSweeper::new(store.clone()).with_batch_size(2);
        let later = latest + ChronoDuration::minutes(1);

        assert_eq!(sweeper.sweep_once(later).await.unwrap().released, 2);
        assert_eq!(sweeper.sweep_once(later).await.unwrap().released, 1);
        assert_eq!(store.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = InMemoryInventoryStore::new();
        let sweeper =
            ExpirationSweeper::new(store).with_interval(std::time::Duration::from_millis(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(sweeper.run(rx));
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
