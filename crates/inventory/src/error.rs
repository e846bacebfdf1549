//! Service-level error type.

use common::{LineItemId, OrderId, ProductId, UserId};
use domain::{ErrorKind, OrderError, ReasonCode};
use inventory_store::StoreError;
use thiserror::Error;

use crate::services::StockServiceError;

/// Errors returned by the inventory services.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The author has no cart.
    #[error("No order in progress for user {0}")]
    NoOrderInProgress(UserId),

    #[error("Order item not found: {0}")]
    OrderItemNotFound(LineItemId),

    #[error("Product {product} is not part of order {order}")]
    ProductNotInOrder { order: OrderId, product: ProductId },

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("User {0} holds no reservations")]
    NoReservationsFound(UserId),

    /// Availability check failed.
    #[error("Not enough stock for product {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: ProductId,
        requested: u32,
        available: u32,
    },

    /// The author is unconfirmed or banned.
    #[error("User {author} may not reserve stock ({reason})")]
    AuthorNotAllowed { author: UserId, reason: ReasonCode },

    #[error("User {0} already has an empty stock order")]
    EmptyStockOrderExists(UserId),

    /// The optimistic retry loop gave up.
    #[error("Too many concurrent updates on product {0}")]
    RetriesExhausted(ProductId),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Stock service error: {0}")]
    StockService(#[from] StockServiceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl InventoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InventoryError::ProductNotFound(_)
            | InventoryError::OrderNotFound(_)
            | InventoryError::NoOrderInProgress(_)
            | InventoryError::OrderItemNotFound(_)
            | InventoryError::ProductNotInOrder { .. }
            | InventoryError::UserNotFound(_)
            | InventoryError::NoReservationsFound(_) => ErrorKind::NotFound,
            InventoryError::InsufficientStock { .. }
            | InventoryError::EmptyStockOrderExists(_)
            | InventoryError::RetriesExhausted(_) => ErrorKind::Conflict,
            InventoryError::AuthorNotAllowed { .. } => ErrorKind::Forbidden,
            InventoryError::Order(e) => e.kind(),
            InventoryError::StockService(StockServiceError::InvalidToken) => ErrorKind::Unauthorized,
            InventoryError::StockService(_) => ErrorKind::UpstreamFailure,
            InventoryError::Store(e) => match e {
                StoreError::ProductNotFound(_) | StoreError::OrderNotFound(_) => {
                    ErrorKind::NotFound
                }
                StoreError::ConcurrencyConflict { .. }
                | StoreError::OrderVersionConflict { .. }
                | StoreError::DuplicateInProgressOrder(_)
                | StoreError::EmptyStockOrderExists(_) => ErrorKind::Conflict,
                _ => ErrorKind::Internal,
            },
        }
    }

    pub fn reason(&self) -> ReasonCode {
        match self {
            InventoryError::ProductNotFound(_) => ReasonCode::ProductNotFound,
            InventoryError::OrderNotFound(_) | InventoryError::NoOrderInProgress(_) => {
                ReasonCode::OrderNotFound
            }
            InventoryError::OrderItemNotFound(_) | InventoryError::ProductNotInOrder { .. } => {
                ReasonCode::OrderItemNotFound
            }
            InventoryError::UserNotFound(_) => ReasonCode::UserNotFound,
            InventoryError::NoReservationsFound(_) => ReasonCode::NoReservationsFound,
            InventoryError::InsufficientStock { .. } => ReasonCode::NotEnoughProductQuantityInStock,
            InventoryError::AuthorNotAllowed { reason, .. } => *reason,
            InventoryError::EmptyStockOrderExists(_) => ReasonCode::EmptyStockOrderAlreadyExists,
            InventoryError::RetriesExhausted(_) => ReasonCode::ConcurrencyConflict,
            InventoryError::Order(e) => e.reason(),
            InventoryError::StockService(StockServiceError::InvalidToken) => {
                ReasonCode::InvalidUpstreamToken
            }
            InventoryError::StockService(_) => ReasonCode::UpstreamSubmissionFailed,
            InventoryError::Store(e) => match e {
                StoreError::ProductNotFound(_) => ReasonCode::ProductNotFound,
                StoreError::OrderNotFound(_) => ReasonCode::OrderNotFound,
                StoreError::DuplicateInProgressOrder(_) => ReasonCode::OrderAlreadyOrdered,
                StoreError::EmptyStockOrderExists(_) => ReasonCode::EmptyStockOrderAlreadyExists,
                e if e.is_conflict() => ReasonCode::ConcurrencyConflict,
                _ => ReasonCode::InternalError,
            },
        }
    }
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, InventoryError>;
