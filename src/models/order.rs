// src/models/order.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{LifecycleError, LifecycleResult, ValidationError};

/// Opaque order/ride identifier issued by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Taxi,      // Passenger ride
    Porter,    // Parcel pickup and drop
    Food,      // Restaurant delivery
    Grocery,   // Grocery delivery
    Ecommerce, // Marketplace order delivery
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Taxi => "taxi",
            OrderType::Porter => "porter",
            OrderType::Food => "food",
            OrderType::Grocery => "grocery",
            OrderType::Ecommerce => "ecommerce",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "taxi" | "ride" => Ok(OrderType::Taxi),
            "porter" | "parcel" => Ok(OrderType::Porter),
            "food" => Ok(OrderType::Food),
            "grocery" => Ok(OrderType::Grocery),
            "ecommerce" | "e-commerce" | "clothes" => Ok(OrderType::Ecommerce),
            _ => Err(LifecycleError::InvalidOrderType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,   // Paid to the driver at the end of a ride
    Cod,    // Cash on delivery, needs an explicit collection step
    Card,
    Upi,
    Wallet,
}

impl PaymentMethod {
    pub fn requires_cod_collection(&self) -> bool {
        matches!(self, PaymentMethod::Cod)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Cod => "cod",
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::Wallet => "wallet",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "cod" | "cash_on_delivery" => Ok(PaymentMethod::Cod),
            "card" => Ok(PaymentMethod::Card),
            "upi" => Ok(PaymentMethod::Upi),
            "wallet" => Ok(PaymentMethod::Wallet),
            _ => Err(LifecycleError::InvalidPaymentMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,        // Placed by the customer, waiting for a rider
    Accepted,       // Rider accepted, heading to pickup
    OutForDelivery, // Picked up / ride started
    Delivered,      // Handed over to the customer
    Completed,      // Closed by the backend
    Cancelled,      // Cancelled by either side
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Accepted => "accepted",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Cancelled
        )
    }

    /// Position along the forward path. All terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::Pending => 0,
            OrderStatus::Accepted => 1,
            OrderStatus::OutForDelivery => 2,
            OrderStatus::Delivered | OrderStatus::Completed | OrderStatus::Cancelled => 3,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = LifecycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        match normalized.as_str() {
            "pending" | "placed" | "new" | "created" => Ok(OrderStatus::Pending),
            "accepted" | "confirmed" | "assigned" => Ok(OrderStatus::Accepted),
            "out_for_delivery" | "picked_up" | "in_transit" | "ride_started" | "started" => {
                Ok(OrderStatus::OutForDelivery)
            }
            "delivered" => Ok(OrderStatus::Delivered),
            "completed" => Ok(OrderStatus::Completed),
            "cancelled" | "canceled" => Ok(OrderStatus::Cancelled),
            _ => Err(LifecycleError::InvalidStatus(s.to_string())),
        }
    }
}

/// Client-side mirror of a remote order.
///
/// The backend owns the real record; this only holds what the rider app needs
/// to gate its own actions. OTP codes are never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub id: OrderId,
    pub order_type: OrderType,
    pub payment_method: PaymentMethod,
    pub status: OrderStatus,
    pub cod_amount: Option<f64>, // Amount to collect for COD orders

    #[serde(default)]
    pub pickup_otp_verified: bool,
    #[serde(default)]
    pub delivery_otp_verified: bool,
    #[serde(default)]
    pub cod_collected: bool,

    pub cancel_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl OrderSnapshot {
    pub fn new(id: impl Into<OrderId>, order_type: OrderType, payment_method: PaymentMethod) -> Self {
        Self {
            id: id.into(),
            order_type,
            payment_method,
            status: OrderStatus::Pending,
            cod_amount: None,
            pickup_otp_verified: false,
            delivery_otp_verified: false,
            cod_collected: false,
            cancel_reason: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_cod_amount(mut self, amount: f64) -> Self {
        self.cod_amount = Some(amount);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Reject snapshots that could never be acted on.
    pub fn validate(&self) -> LifecycleResult<()> {
        let mut errors = Vec::new();
        if self.id.as_str().trim().is_empty() {
            errors.push(ValidationError { field: "id".to_string(), message: "order id is required".to_string() });
        }
        if let Some(amount) = self.cod_amount {
            if !amount.is_finite() || amount < 0.0 {
                errors.push(ValidationError {
                    field: "cod_amount".to_string(),
                    message: format!("COD amount must be a non-negative number, got {}", amount),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::ValidationFailed(errors))
        }
    }
}
