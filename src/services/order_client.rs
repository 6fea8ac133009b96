// src/services/order_client.rs
use async_trait::async_trait;
use reqwest::{RequestBuilder, Url};
use std::time::Duration;
use tracing;

use crate::{
    errors::{LifecycleError, LifecycleResult},
    models::{
        api::{ApiResponse, CodCollectRequest, OtpVerifyRequest, StatusUpdateRequest},
        order::{OrderId, OrderStatus, OrderType},
    },
    utils::id_generator::generate_request_id,
};

/// The rider endpoints of the order backend.
#[async_trait]
pub trait OrderApi: Send + Sync {
    async fn fetch_status(&self, order_id: &OrderId, order_type: OrderType) -> LifecycleResult<OrderStatus>;

    /// Returns the status echoed by the backend, when it sends one back.
    async fn update_status(
        &self,
        order_id: &OrderId,
        request: &StatusUpdateRequest,
    ) -> LifecycleResult<Option<OrderStatus>>;

    async fn verify_otp(&self, order_id: &OrderId, request: &OtpVerifyRequest) -> LifecycleResult<()>;

    async fn collect_cod(&self, order_id: &OrderId, request: &CodCollectRequest) -> LifecycleResult<()>;
}

#[derive(Debug, Clone)]
pub struct HttpOrderApi {
    client: reqwest::Client,
    base_url: Url,
    api_token: Option<String>,
}

impl HttpOrderApi {
    pub fn new(base_url: &str, api_token: Option<String>, timeout: Duration) -> LifecycleResult<Self> {
        let base_url = Url::parse(base_url).map_err(|e| LifecycleError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(LifecycleError::InvalidUrl(base_url.to_string()));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client, base_url, api_token })
    }

    /// `{base}/api/riders/orders/{id}/{action}`, with the id percent-encoded.
    fn order_url(&self, order_id: &OrderId, action: &str) -> LifecycleResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LifecycleError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "riders", "orders", order_id.as_str(), action]);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> LifecycleResult<ApiResponse> {
        let request_id = generate_request_id();
        let mut request = request
            .header("X-Request-Id", &request_id)
            .header("Accept", "application/json");
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        tracing::debug!("Backend responded {} for request {}", status, request_id);

        let body: Option<ApiResponse> = if text.trim().is_empty() {
            Some(ApiResponse::default())
        } else {
            serde_json::from_str(&text).ok()
        };

        if !status.is_success() {
            let message = body
                .as_ref()
                .and_then(|b| b.message().map(str::to_string))
                .filter(|m| !m.is_empty())
                .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()))
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

            return Err(if status.is_server_error() {
                LifecycleError::BackendUnavailable { status: status.as_u16(), message }
            } else {
                LifecycleError::Rejected { status: status.as_u16(), message }
            });
        }

        body.ok_or_else(|| LifecycleError::UnexpectedResponse(format!("not JSON: {}", text)))
    }

    fn rejection_message(body: &ApiResponse, fallback: &str) -> String {
        body.message().unwrap_or(fallback).to_string()
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    async fn fetch_status(&self, order_id: &OrderId, order_type: OrderType) -> LifecycleResult<OrderStatus> {
        let url = self.order_url(order_id, "status")?;
        tracing::debug!("Polling status for order {}", order_id);

        let body = self
            .send(self.client.get(url).query(&[("order_type", order_type.as_str())]))
            .await?;

        if body.is_rejection() {
            return Err(LifecycleError::Rejected {
                status: 200,
                message: Self::rejection_message(&body, "status lookup failed"),
            });
        }

        body.status_str()
            .ok_or_else(|| LifecycleError::UnexpectedResponse("response carries no status".to_string()))?
            .parse()
    }

    async fn update_status(
        &self,
        order_id: &OrderId,
        request: &StatusUpdateRequest,
    ) -> LifecycleResult<Option<OrderStatus>> {
        let url = self.order_url(order_id, "status")?;
        tracing::info!("Updating order {} to {}", order_id, request.status);

        let body = self.send(self.client.patch(url).json(request)).await?;

        if body.is_rejection() {
            return Err(LifecycleError::Rejected {
                status: 200,
                message: Self::rejection_message(&body, "status update rejected"),
            });
        }

        // Some endpoints reply with `"status": "success"`; only a real order status counts.
        Ok(body.status_str().and_then(|s| s.parse().ok()))
    }

    async fn verify_otp(&self, order_id: &OrderId, request: &OtpVerifyRequest) -> LifecycleResult<()> {
        let url = self.order_url(order_id, "verify-otp")?;
        tracing::info!("Verifying {} OTP for order {}", request.stage, order_id);

        let body = match self.send(self.client.post(url).json(request)).await {
            Ok(body) => body,
            Err(LifecycleError::Rejected { message, .. }) => return Err(LifecycleError::OtpRejected(message)),
            Err(err) => return Err(err),
        };

        if body.is_rejection() {
            return Err(LifecycleError::OtpRejected(Self::rejection_message(&body, "Invalid OTP")));
        }
        Ok(())
    }

    async fn collect_cod(&self, order_id: &OrderId, request: &CodCollectRequest) -> LifecycleResult<()> {
        let url = self.order_url(order_id, "collect-cod")?;
        tracing::info!("Collecting COD of {:.2} for order {}", request.amount, order_id);

        let body = self.send(self.client.post(url).json(request)).await?;

        if body.is_rejection() {
            return Err(LifecycleError::Rejected {
                status: 200,
                message: Self::rejection_message(&body, "COD collection rejected"),
            });
        }
        Ok(())
    }
}
