use common::{OrderId, ProductId, UserId, Version};
use thiserror::Error;

/// Errors that can occur when interacting with the inventory store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product's reservation set changed since it was read.
    #[error(
        "Concurrency conflict for product {product}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        product: ProductId,
        expected: Version,
        actual: Version,
    },

    /// The order was saved by someone else since it was read.
    #[error("Order {order} was modified concurrently: expected version {expected}, found {actual}")]
    OrderVersionConflict {
        order: OrderId,
        expected: Version,
        actual: Version,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The author already has an in-progress customer order.
    #[error("Author {0} already has an order in progress")]
    DuplicateInProgressOrder(UserId),

    /// The author already has an in-progress stock order without items.
    #[error("Author {0} already has an empty stock order")]
    EmptyStockOrderExists(UserId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true for optimistic concurrency failures that a caller may retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::OrderVersionConflict { .. }
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
