//! Customer order (cart) record.

use chrono::{DateTime, Utc};
use common::{LineItemId, OrderId, UserId, Version};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderKind, OrderLike, OrderStatus, StatusEffect, StatusTimestamps};
use crate::value_objects::Money;

/// How a committed order is to be packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Packaging {
    #[default]
    Box,
    Bag,
}

/// A customer's order. While in progress it acts as the author's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerOrder {
    pub id: OrderId,
    pub author: UserId,
    pub author_name: String,
    status: OrderStatus,
    #[serde(default)]
    pub packaging: Packaging,
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

impl CustomerOrder {
    /// Creates an empty in-progress cart.
    pub fn new(author: UserId, author_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            author,
            author_name: author_name.into(),
            status: OrderStatus::InProgress,
            packaging: Packaging::default(),
            necessary_notes: String::new(),
            items: Vec::new(),
            timestamps: StatusTimestamps::default(),
            external_order_id: None,
            total: None,
            version: Version::initial(),
            created_at: now,
        }
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Fails unless the cart can still be edited.
    pub fn ensure_cart_open(&self) -> Result<(), OrderError> {
        if !self.status.can_modify_items() {
            return Err(OrderError::AlreadyOrdered);
        }
        Ok(())
    }

    /// Fails unless line items may be deleted.
    pub fn ensure_items_deletable(&self) -> Result<(), OrderError> {
        if !self.status.can_delete_items() {
            return Err(OrderError::AlreadyOrdered);
        }
        Ok(())
    }

    /// Resolves the effect of a requested status change without applying it.
    pub fn plan_status_change(
        &self,
        target: Option<OrderStatus>,
    ) -> Result<(OrderStatus, StatusEffect), OrderError> {
        let target = target.ok_or(OrderError::StatusRequired)?;
        let effect = self.status.effect_of(target)?;
        Ok((target, effect))
    }

    /// Moves to `target` and stamps the matching timestamps.
    ///
    /// Callers must have resolved `effect` through [`Self::plan_status_change`].
    pub fn apply_status_change(
        &mut self,
        target: OrderStatus,
        effect: StatusEffect,
        now: DateTime<Utc>,
    ) {
        let ts = &mut self.timestamps;
        match effect {
            StatusEffect::None => return,
            StatusEffect::CommitCart => {
                ts.confirmed_time = Some(now);
            }
            StatusEffect::Confirm { .. } => {
                ts.confirmed_time = Some(now);
                ts.accepted_time = Some(now);
                ts.delivered_time = None;
                ts.rejected_time = None;
            }
            StatusEffect::Deliver => {
                ts.delivered_time = Some(now);
                ts.rejected_time = None;
            }
            StatusEffect::Reject => {
                ts.rejected_time = Some(now);
            }
            StatusEffect::Complete => {
                ts.completed_time = Some(now);
            }
            StatusEffect::Reorder => {
                ts.confirmed_time = Some(now);
                ts.accepted_time = None;
                ts.delivered_time = None;
                ts.rejected_time = None;
            }
        }
        self.status = target;
    }

    /// Records checkout details given when the cart is committed.
    pub fn set_checkout(&mut self, packaging: Packaging, notes: impl Into<String>) {
        self.packaging = packaging;
        self.necessary_notes = notes.into();
    }
}

impl OrderLike for CustomerOrder {
    fn id(&self) -> OrderId {
        self.id
    }

    fn author(&self) -> UserId {
        self.author
    }

    fn kind(&self) -> OrderKind {
        OrderKind::Customer
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
        self.status == OrderStatus::InProgress
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
}
