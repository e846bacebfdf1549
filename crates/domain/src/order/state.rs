//! Order status state machines.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// Side effect a status change requires from the workflow layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEffect {
    /// Target equals the current status; nothing to do.
    None,
    /// Lock the cart: re-validate and freeze in-progress items.
    CommitCart,
    /// Re-validate, price and submit upstream. `restore_holds` is set when
    /// the order comes back from rejection and its holds must be re-created.
    Confirm { restore_holds: bool },
    /// Stamp delivery; stock was committed at confirmation.
    Deliver,
    /// Release every hold of the order.
    Reject,
    /// Stock is settled externally; release the remaining holds.
    Complete,
    /// Back from rejection to ordered; holds are re-created.
    Reorder,
}

/// Status of a customer order.
///
/// ```text
/// InProgress ──► Ordered ──► Confirmed ──► Delivered ──► Completed
///                   │            │             │
///                   └────────────┴─────────────┴──► Rejected
///                   ▲            ▲                     │
///                   └────────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Cart, still editable by its author.
    #[default]
    InProgress,

    /// Cart committed, quantities locked, awaiting approval.
    Ordered,

    /// Approved and submitted to the stock service.
    #[serde(alias = "accepted")]
    Confirmed,

    Delivered,

    Rejected,

    /// Terminal; holds released after external settlement.
    Completed,
}

impl OrderStatus {
    /// Returns true if the cart may still be edited.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, OrderStatus::InProgress)
    }

    /// Returns true if line items may be deleted in this status.
    pub fn can_delete_items(&self) -> bool {
        matches!(self, OrderStatus::InProgress | OrderStatus::Ordered)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    /// Returns true for orders awaiting processing by staff.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::Ordered | OrderStatus::Confirmed)
    }

    /// Returns true for orders that belong to history.
    pub fn is_history(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Rejected | OrderStatus::Completed
        )
    }

    /// Resolves the effect of moving from `self` to `target`.
    pub fn effect_of(&self, target: OrderStatus) -> Result<StatusEffect, OrderError> {
        use OrderStatus::*;

        if *self == target {
            return Ok(StatusEffect::None);
        }

        let effect = match (*self, target) {
            (InProgress, Ordered) => StatusEffect::CommitCart,
            (Ordered, Confirmed) => StatusEffect::Confirm {
                restore_holds: false,
            },
            (Rejected, Confirmed) => StatusEffect::Confirm {
                restore_holds: true,
            },
            (Confirmed, Delivered) => StatusEffect::Deliver,
            (Delivered, Completed) => StatusEffect::Complete,
            (Ordered | Confirmed | Delivered, Rejected) => StatusEffect::Reject,
            (Rejected, Ordered) => StatusEffect::Reorder,
            (from, to) => {
                return Err(OrderError::InvalidStatusTransition {
                    from: from.as_str(),
                    to: to.as_str(),
                });
            }
        };
        Ok(effect)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Ordered => "ordered",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Rejected => "rejected",
            OrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a B2B stock order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockOrderStatus {
    #[default]
    InProgress,
    Confirmed,
    Rejected,
    Completed,
}

impl StockOrderStatus {
    /// Returns true if items may be added, re-quantified or deleted.
    pub fn can_modify_items(&self) -> bool {
        matches!(self, StockOrderStatus::InProgress)
    }

    /// Returns true if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StockOrderStatus::Completed)
    }

    /// Resolves the effect of moving from `self` to `target`.
    pub fn effect_of(&self, target: StockOrderStatus) -> Result<StatusEffect, OrderError> {
        use StockOrderStatus::*;

        if *self == target {
            return Ok(StatusEffect::None);
        }

        let effect = match (*self, target) {
            (InProgress, Confirmed) => StatusEffect::Confirm {
                restore_holds: false,
            },
            (Rejected, Confirmed) => StatusEffect::Confirm {
                restore_holds: true,
            },
            (Confirmed, Rejected) => StatusEffect::Reject,
            (Confirmed, Completed) => StatusEffect::Complete,
            (from, to) => {
                return Err(OrderError::InvalidStatusTransition {
                    from: from.as_str(),
                    to: to.as_str(),
                });
            }
        };
        Ok(effect)
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StockOrderStatus::InProgress => "in_progress",
            StockOrderStatus::Confirmed => "confirmed",
            StockOrderStatus::Rejected => "rejected",
            StockOrderStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for StockOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
