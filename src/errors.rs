use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lifecycle::GuardError;

/// Main error type for the order lifecycle client
#[derive(Debug)]
pub enum LifecycleError {
    // Transition gate errors
    Guard(GuardError),
    InvalidStatus(String),
    InvalidOrderType(String),
    InvalidPaymentMethod(String),
    OrderNotTracked(String),
    AlreadyTracked(String),

    // OTP errors
    InvalidOtpFormat,
    OtpRejected(String),

    // Backend responses
    Rejected { status: u16, message: String },
    BackendUnavailable { status: u16, message: String },
    UnexpectedResponse(String),

    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),
    JsonSerialization(String),

    // Local persistence
    Storage(String),

    // Side effects
    NotificationFailed(String),
    ChannelClosed,

    // Validation errors
    ValidationFailed(Vec<ValidationError>),

    // Configuration errors
    ConfigurationError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::Guard(err) => write!(f, "Transition rejected: {}", err),
            LifecycleError::InvalidStatus(status) => write!(f, "Invalid order status: {}", status),
            LifecycleError::InvalidOrderType(value) => write!(f, "Invalid order type: {}", value),
            LifecycleError::InvalidPaymentMethod(value) => write!(f, "Invalid payment method: {}", value),
            LifecycleError::OrderNotTracked(id) => write!(f, "Order is not tracked: {}", id),
            LifecycleError::AlreadyTracked(id) => write!(f, "Order is already tracked: {}", id),

            LifecycleError::InvalidOtpFormat => write!(f, "OTP must be exactly 6 digits"),
            LifecycleError::OtpRejected(msg) => write!(f, "OTP verification failed: {}", msg),

            LifecycleError::Rejected { status, message } => {
                write!(f, "Request rejected ({}): {}", status, message)
            }
            LifecycleError::BackendUnavailable { status, message } => {
                write!(f, "Backend unavailable ({}): {}", status, message)
            }
            LifecycleError::UnexpectedResponse(msg) => write!(f, "Unexpected response: {}", msg),

            LifecycleError::NetworkTimeout => write!(f, "Network request timed out"),
            LifecycleError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            LifecycleError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            LifecycleError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            LifecycleError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            LifecycleError::JsonSerialization(msg) => write!(f, "JSON serialization error: {}", msg),

            LifecycleError::Storage(msg) => write!(f, "Storage error: {}", msg),

            LifecycleError::NotificationFailed(msg) => write!(f, "Notification failed: {}", msg),
            LifecycleError::ChannelClosed => write!(f, "Notification channel closed"),

            LifecycleError::ValidationFailed(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }

            LifecycleError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for LifecycleError {}

// Convenience type alias for Results
pub type LifecycleResult<T> = Result<T, LifecycleError>;

impl From<GuardError> for LifecycleError {
    fn from(err: GuardError) -> Self {
        LifecycleError::Guard(err)
    }
}

impl From<reqwest::Error> for LifecycleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LifecycleError::NetworkTimeout
        } else if err.is_connect() {
            LifecycleError::NetworkConnection(err.to_string())
        } else if err.is_decode() {
            LifecycleError::JsonParsing(err.to_string())
        } else {
            LifecycleError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LifecycleError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() {
            LifecycleError::JsonParsing(err.to_string())
        } else {
            LifecycleError::JsonSerialization(err.to_string())
        }
    }
}

impl From<std::io::Error> for LifecycleError {
    fn from(err: std::io::Error) -> Self {
        LifecycleError::Storage(err.to_string())
    }
}

impl LifecycleError {
    pub fn not_tracked(order_id: impl Into<String>) -> Self {
        LifecycleError::OrderNotTracked(order_id.into())
    }

    /// Whether retrying the same request later could succeed.
    ///
    /// Rejections (4xx, guard failures, wrong OTP) are permanent for the
    /// current state; network failures and 5xx responses are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecycleError::NetworkTimeout
                | LifecycleError::NetworkConnection(_)
                | LifecycleError::HttpClient(_)
                | LifecycleError::BackendUnavailable { .. }
        )
    }

    /// Short text suitable for a toast shown to the rider.
    ///
    /// Backend rejections are passed through verbatim.
    pub fn user_message(&self) -> String {
        match self {
            LifecycleError::Guard(err) => err.to_string(),
            LifecycleError::Rejected { message, .. } => message.clone(),
            LifecycleError::OtpRejected(message) => message.clone(),
            LifecycleError::InvalidOtpFormat => "Please enter the 6-digit OTP".to_string(),
            LifecycleError::NetworkTimeout | LifecycleError::NetworkConnection(_) => {
                "Network error, please try again".to_string()
            }
            LifecycleError::BackendUnavailable { .. } => {
                "Service is temporarily unavailable".to_string()
            }
            LifecycleError::ValidationFailed(errors) => errors
                .first()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| "Invalid input".to_string()),
            other => other.to_string(),
        }
    }
}
