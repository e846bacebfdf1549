//! HTTP adapter for the external stock service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::stock_service::{OrderSubmission, StockService, StockServiceError};

/// Connection settings of the upstream stock service.
#[derive(Debug, Clone)]
pub struct HttpStockServiceConfig {
    pub base_url: String,
    pub token: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct EntityRef<'a> {
    id: &'a str,
}

#[derive(Serialize)]
struct PositionBody<'a> {
    assortment: EntityRef<'a>,
    quantity: u32,
    /// Minor units.
    price: i64,
}

#[derive(Serialize)]
struct CustomerOrderBody<'a> {
    agent: EntityRef<'a>,
    name: &'a str,
    description: &'a str,
    positions: Vec<PositionBody<'a>>,
}

#[derive(Deserialize)]
struct CreatedEntity {
    id: String,
}

/// Submits confirmed orders as `customerorder` entities over HTTP.
#[derive(Debug, Clone)]
pub struct HttpStockService {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpStockService {
    /// Builds the client. Fails only if the TLS backend cannot be initialised.
    pub fn new(config: HttpStockServiceConfig) -> Result<Self, StockServiceError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StockServiceError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url,
            token: config.token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn handle_response(response: reqwest::Response) -> Result<String, StockServiceError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return match status {
                StatusCode::UNAUTHORIZED => Err(StockServiceError::InvalidToken),
                _ => Err(StockServiceError::Rejected {
                    status: status.as_u16(),
                    body,
                }),
            };
        }

        let created: CreatedEntity = response
            .json()
            .await
            .map_err(|e| StockServiceError::Transport(e.to_string()))?;
        Ok(created.id)
    }
}

#[async_trait]
impl StockService for HttpStockService {
    #[tracing::instrument(skip(self, submission), fields(order_id = %submission.order))]
    async fn submit_order(&self, submission: OrderSubmission) -> Result<String, StockServiceError> {
        let body = CustomerOrderBody {
            agent: EntityRef {
                id: &submission.counterparty_id,
            },
            name: &submission.name,
            description: &submission.notes,
            positions: submission
                .positions
                .iter()
                .map(|p| PositionBody {
                    assortment: EntityRef {
                        id: &p.external_product_id,
                    },
                    quantity: p.quantity,
                    price: p.unit_price.cents(),
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.url("entity/customerorder"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StockServiceError::Transport(e.to_string()))?;

        Self::handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, http::HeaderMap, http::StatusCode as AxumStatus, routing::post};
    use common::OrderId;
    use domain::Money;
    use serde_json::{Value, json};

    use super::*;
    use crate::services::stock_service::SubmissionPosition;

    async fn fake_upstream(
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Result<Json<Value>, (AxumStatus, String)> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if auth != "Bearer good-token" {
            return Err((AxumStatus::UNAUTHORIZED, "bad token".to_string()));
        }
        if body["positions"].as_array().is_none_or(|p| p.is_empty()) {
            return Err((AxumStatus::BAD_REQUEST, "no positions".to_string()));
        }
        assert_eq!(body["agent"]["id"], "cp-1");
        assert_eq!(body["positions"][0]["assortment"]["id"], "SKU-001");
        assert_eq!(body["positions"][0]["price"], 1250);
        Ok(Json(json!({ "id": "upstream-42" })))
    }

    async fn spawn_upstream() -> String {
        let app = Router::new().route("/entity/customerorder", post(fake_upstream));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn service(base_url: String, token: &str) -> HttpStockService {
        HttpStockService::new(HttpStockServiceConfig {
            base_url,
            token: token.to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn submission(positions: Vec<SubmissionPosition>) -> OrderSubmission {
        OrderSubmission {
            order: OrderId::new(),
            counterparty_id: "cp-1".to_string(),
            name: "Order".to_string(),
            positions,
            notes: "notes".to_string(),
        }
    }

    fn position() -> SubmissionPosition {
        SubmissionPosition {
            external_product_id: "SKU-001".to_string(),
            quantity: 3,
            unit_price: Money::from_cents(1250),
        }
    }

    #[tokio::test]
    async fn test_submit_returns_upstream_id() {
        let base = spawn_upstream().await;
        let id = service(base, "good-token")
            .submit_order(submission(vec![position()]))
            .await
            .unwrap();
        assert_eq!(id, "upstream-42");
    }

    #[tokio::test]
    async fn test_unauthorized_maps_to_invalid_token() {
        let base = spawn_upstream().await;
        let result = service(base, "wrong")
            .submit_order(submission(vec![position()]))
            .await;
        assert_eq!(result, Err(StockServiceError::InvalidToken));
    }

    #[tokio::test]
    async fn test_other_failures_are_rejections() {
        let base = spawn_upstream().await;
        let result = service(base, "good-token")
            .submit_order(submission(vec![]))
            .await;
        assert!(matches!(
            result,
            Err(StockServiceError::Rejected { status: 400, .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_transport_error() {
        let result = service("http://127.0.0.1:1".to_string(), "good-token")
            .submit_order(submission(vec![position()]))
            .await;
        assert!(matches!(result, Err(StockServiceError::Transport(_))));
    }
}
