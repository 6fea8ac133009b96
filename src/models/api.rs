// src/models/api.rs
// Request/response bodies for the rider order endpoints
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::OtpStage;
use crate::models::order::{OrderStatus, OrderType};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusUpdateRequest {
    pub status: OrderStatus,
    pub order_type: OrderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>, // Required by the backend for cancellations
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OtpVerifyRequest {
    pub otp: String,
    pub order_type: OrderType,
    pub stage: OtpStage,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodCollectRequest {
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// Loose envelope covering the response shapes the backend uses.
///
/// Different endpoints return the status at the top level, under `data`, or
/// as `order_status`; failures come back as `success: false` or
/// `verified: false` with a `message` or `error` string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default)]
    pub data: Option<ApiData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiData {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
}

impl ApiResponse {
    /// The order status carried by the response, most specific field first.
    pub fn status_str(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|d| d.status.as_deref().or(d.order_status.as_deref()))
            .or(self.order_status.as_deref())
            .or(self.status.as_deref())
    }

    pub fn is_rejection(&self) -> bool {
        self.success == Some(false) || self.verified == Some(false)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref().or(self.error.as_deref())
    }
}
