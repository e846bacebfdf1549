//! External stock-service port and in-memory implementation.

use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// One line of an order submitted upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPosition {
    /// Product id in the upstream system.
    pub external_product_id: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A consolidated order handed to the stock service at confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmission {
    pub order: OrderId,
    pub counterparty_id: String,
    pub name: String,
    pub positions: Vec<SubmissionPosition>,
    pub notes: String,
}

/// Errors returned by the stock service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StockServiceError {
    /// Credentials were refused (HTTP 401).
    #[error("Stock service rejected the access token")]
    InvalidToken,

    /// The service answered with a non-success status.
    #[error("Stock service rejected the order (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The request could not be completed, including timeouts.
    #[error("Stock service unreachable: {0}")]
    Transport(String),
}

/// Sink for confirmed orders in the external stock system.
#[async_trait]
pub trait StockService: Send + Sync {
    /// Submits an order and returns the id assigned upstream.
    async fn submit_order(&self, submission: OrderSubmission) -> Result<String, StockServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryStockState {
    submissions: Vec<OrderSubmission>,
    next_id: u32,
    fail_with: Option<StockServiceError>,
}

/// In-memory stock service for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStockService {
    state: Arc<RwLock<InMemoryStockState>>,
}

impl InMemoryStockService {
    /// Creates a new in-memory stock service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following submission fail with `error`, or succeed again with `None`.
    pub async fn set_failure(&self, error: Option<StockServiceError>) {
        self.state.write().await.fail_with = error;
    }

    /// Returns the number of accepted submissions.
    pub async fn submission_count(&self) -> usize {
        self.state.read().await.submissions.len()
    }

    /// Returns every accepted submission in order.
    pub async fn submissions(&self) -> Vec<OrderSubmission> {
        self.state.read().await.submissions.clone()
    }
}

#[async_trait]
impl StockService for InMemoryStockService {
    async fn submit_order(&self, submission: OrderSubmission) -> Result<String, StockServiceError> {
        let mut state = self.state.write().await;

        if let Some(error) = state.fail_with.clone() {
            return Err(error);
        }

        state.next_id += 1;
        let external_id = format!("EXT-{:04}", state.next_id);
        state.submissions.push(submission);

        Ok(external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> OrderSubmission {
        OrderSubmission {
            order: OrderId::new(),
            counterparty_id: "cp-1".to_string(),
            name: "Order".to_string(),
            positions: vec![SubmissionPosition {
                external_product_id: "SKU-001".to_string(),
                quantity: 2,
                unit_price: Money::from_cents(1000),
            }],
            notes: String::new(),
        }
    }

    #[tokio::test]
    async fn test_sequential_external_ids() {
        let service = InMemoryStockService::new();

        let first = service.submit_order(submission()).await.unwrap();
        let second = service.submit_order(submission()).await.unwrap();

        assert_eq!(first, "EXT-0001");
        assert_eq!(second, "EXT-0002");
        assert_eq!(service.submission_count().await, 2);
    }

    #[tokio::test]
    async fn test_configured_failure() {
        let service = InMemoryStockService::new();
        service
            .set_failure(Some(StockServiceError::InvalidToken))
            .await;

        let result = service.submit_order(submission()).await;
        assert_eq!(result, Err(StockServiceError::InvalidToken));
        assert_eq!(service.submission_count().await, 0);

        service.set_failure(None).await;
        assert!(service.submit_order(submission()).await.is_ok());
    }
}
