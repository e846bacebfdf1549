//! Collaborator ports and their implementations.

pub mod http_stock;
pub mod notifier;
pub mod stock_service;
pub mod users;

pub use http_stock::{HttpStockService, HttpStockServiceConfig};
pub use notifier::{InMemoryNotifier, Notification, NotificationKind, Notifier, TracingNotifier};
pub use stock_service::{
    InMemoryStockService, OrderSubmission, StockService, StockServiceError, SubmissionPosition,
};
pub use users::{InMemoryUserDirectory, UserDirectory};
