//! B2B stock order record.

use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId, UserId, Version};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderKind, OrderLike, StatusEffect, StatusTimestamps, StockOrderStatus};
use crate::value_objects::{Money, PricingProfile};

/// Buyer a stock order is placed for in the upstream system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: String,
    pub name: String,
}

/// A staff-placed order that holds stock for a counterparty.
///
/// Unlike customer carts an author may keep several of these in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockOrder {
    pub id: OrderId,
    pub author: UserId,
    status: StockOrderStatus,
    #[serde(default)]
    pub counterparty: Option<Counterparty>,
    /// Overrides the author's pricing profile when set.
    #[serde(default)]
    pub pricing: Option<PricingProfile>,
    #[serde(default)]
    pub necessary_notes: String,
    pub items: Vec<LineItemId>,
    #[serde(default)]
    pub timestamps: StatusTimestamps,
    #[serde(default)]
    pub external_order_id: Option<String>,
    #[serde(default)]
    pub total: Option<Money>,
    #[serde(default)]
    pub version: Version,
    pub created_at: DateTime<Utc>,
}

impl StockOrder {
    pub fn new(author: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            author,
            status: StockOrderStatus::InProgress,
            counterparty: None,
            pricing: None,
            necessary_notes: String::new(),
            items: Vec::new(),
            timestamps: StatusTimestamps::default(),
            external_order_id: None,
            total: None,
            version: Version::initial(),
            created_at: now,
        }
    }

    pub fn status(&self) -> StockOrderStatus {
        self.status
    }

    /// Fails unless items may still be changed.
    pub fn ensure_editable(&self) -> Result<(), OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::NotInProgress {
                status: self.status.as_str(),
            });
        }
        Ok(())
    }

    /// Fails unless a counterparty has been chosen.
    pub fn ensure_counterparty(&self) -> Result<&Counterparty, OrderError> {
        self.counterparty
            .as_ref()
            .ok_or(OrderError::CounterpartyRequired)
    }

    pub fn plan_status_change(
        &self,
        target: Option<StockOrderStatus>,
    ) -> Result<(StockOrderStatus, StatusEffect), OrderError> {
        let target = target.ok_or(OrderError::StatusRequired)?;
        let effect = self.status.effect_of(target)?;
        Ok((target, effect))
    }

    pub fn apply_status_change(
        &mut self,
        target: StockOrderStatus,
        effect: StatusEffect,
        now: DateTime<Utc>,
    ) {
        let ts = &mut self.timestamps;
        match effect {
            StatusEffect::None => return,
            StatusEffect::Confirm { .. } => {
                ts.confirmed_time = Some(now);
                ts.rejected_time = None;
            }
            StatusEffect::Reject => ts.rejected_time = Some(now),
            StatusEffect::Complete => ts.completed_time = Some(now),
            // Not produced by the stock order machine.
            StatusEffect::CommitCart | StatusEffect::Deliver | StatusEffect::Reorder => {}
        }
        self.status = target;
    }
}

impl OrderLike for StockOrder {
    fn id(&self) -> OrderId {
        self.id
    }

    fn author(&self) -> UserId {
        self.author
    }

    fn kind(&self) -> OrderKind {
        OrderKind::Stock
    }

    fn items(&self) -> &[LineItemId] {
        &self.items
    }

    fn items_mut(&mut self) -> &mut Vec<LineItemId> {
        &mut self.items
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn is_in_progress(&self) -> bool {
        self.status == StockOrderStatus::InProgress
    }

    fn status_str(&self) -> &'static str {
        self.status.as_str()
    }

    fn external_order_id(&self) -> Option<&str> {
        self.external_order_id.as_deref()
    }

    fn set_external_order_id(&mut self, id: String) {
        self.external_order_id = Some(id);
    }

    fn set_total(&mut self, total: Money) {
        self.total = Some(total);
    }

    fn pricing_override(&self) -> Option<PricingProfile> {
        self.pricing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_objects::{DiscountPercent, PriceTier};

    #[test]
    fn test_new_stock_order_is_editable() {
        let order = StockOrder::new(UserId::new(), Utc::now());
        assert!(order.ensure_editable().is_ok());
        assert_eq!(order.kind(), OrderKind::Stock);
        assert_eq!(
            order.ensure_counterparty(),
            Err(OrderError::CounterpartyRequired)
        );
    }

    #[test]
    fn test_confirmed_stock_order_is_locked() {
        let mut order = StockOrder::new(UserId::new(), Utc::now());
        let (to, effect) = order
            .plan_status_change(Some(StockOrderStatus::Confirmed))
            .unwrap();
        order.apply_status_change(to, effect, Utc::now());

        assert_eq!(order.status(), StockOrderStatus::Confirmed);
        assert!(order.timestamps.confirmed_time.is_some());
        assert_eq!(
            order.ensure_editable(),
            Err(OrderError::NotInProgress {
                status: "confirmed"
            })
        );
    }

    #[test]
    fn test_pricing_override() {
        let mut order = StockOrder::new(UserId::new(), Utc::now());
        assert!(order.pricing_override().is_none());
        let profile = PricingProfile::new(PriceTier::Wholesale, DiscountPercent::new(5));
        order.pricing = Some(profile);
        assert_eq!(order.pricing_override(), Some(profile));
    }
}
