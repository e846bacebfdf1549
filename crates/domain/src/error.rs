//! Error classification shared by every layer.
//!
//! Each rejected operation maps to an [`ErrorKind`] (how the caller should
//! treat it) and a [`ReasonCode`] (a stable machine-readable string clients
//! can localize or branch on).

use serde::{Deserialize, Serialize};

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A required entity is absent.
    NotFound,
    /// The request collides with current state (stock, duplicates, status).
    Conflict,
    /// The author is not allowed to perform the operation.
    Forbidden,
    /// Credentials towards the upstream stock service were refused.
    Unauthorized,
    /// The request itself is malformed.
    BadRequest,
    /// The upstream stock service rejected the submission.
    UpstreamFailure,
    /// Storage or other infrastructure fault.
    Internal,
}

/// Stable reason code attached to every rejected mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    ProductNotFound,
    OrderNotFound,
    OrderItemNotFound,
    UserNotFound,
    NoReservationsFound,
    NotEnoughProductQuantityInStock,
    OrderAlreadyOrdered,
    OrderNotInProgress,
    OrderItemAlreadyAdded,
    EmptyStockOrderAlreadyExists,
    InvalidStatusTransition,
    InvalidQuantity,
    OrderHasNoItems,
    CounterpartyRequired,
    UserNotConfirmed,
    UserBanned,
    StatusRequired,
    InvalidUpstreamToken,
    UpstreamSubmissionFailed,
    ConcurrencyConflict,
    InternalError,
}

impl ReasonCode {
    /// Returns the wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::ProductNotFound => "product_not_found",
            ReasonCode::OrderNotFound => "order_not_found",
            ReasonCode::OrderItemNotFound => "order_item_not_found",
            ReasonCode::UserNotFound => "user_not_found",
            ReasonCode::NoReservationsFound => "no_reservations_found",
            ReasonCode::NotEnoughProductQuantityInStock => "not_enough_product_quantity_in_stock",
            ReasonCode::OrderAlreadyOrdered => "order_already_ordered",
            ReasonCode::OrderNotInProgress => "order_not_in_progress",
            ReasonCode::OrderItemAlreadyAdded => "order_item_already_added",
            ReasonCode::EmptyStockOrderAlreadyExists => "empty_stock_order_already_exists",
            ReasonCode::InvalidStatusTransition => "invalid_status_transition",
            ReasonCode::InvalidQuantity => "invalid_quantity",
            ReasonCode::OrderHasNoItems => "order_has_no_items",
            ReasonCode::CounterpartyRequired => "counterparty_required",
            ReasonCode::UserNotConfirmed => "user_not_confirmed",
            ReasonCode::UserBanned => "user_banned",
            ReasonCode::StatusRequired => "status_required",
            ReasonCode::InvalidUpstreamToken => "invalid_upstream_token",
            ReasonCode::UpstreamSubmissionFailed => "upstream_submission_failed",
            ReasonCode::ConcurrencyConflict => "concurrency_conflict",
            ReasonCode::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
