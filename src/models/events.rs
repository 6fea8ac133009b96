// src/models/events.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::order::{OrderId, OrderStatus, OrderType};
use crate::utils::id_generator::{IdGenerator, IdType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Poll,   // Observed on the backend by the status poller
    Action, // Caused by a rider action issued from this client
}

/// Side effects emitted by the tracker, one per observable change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    StatusChanged {
        event_id: String,
        order_id: OrderId,
        order_type: OrderType,
        from: OrderStatus,
        to: OrderStatus,
        source: ChangeSource,
        at: DateTime<Utc>,
    },
    ActionFailed {
        event_id: String,
        order_id: OrderId,
        message: String,
        transient: bool,
        at: DateTime<Utc>,
    },
    TrackingStopped {
        event_id: String,
        order_id: OrderId,
        final_status: OrderStatus,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn status_changed(
        order_id: OrderId,
        order_type: OrderType,
        from: OrderStatus,
        to: OrderStatus,
        source: ChangeSource,
    ) -> Self {
        LifecycleEvent::StatusChanged {
            event_id: IdGenerator::generate(IdType::Event),
            order_id,
            order_type,
            from,
            to,
            source,
            at: Utc::now(),
        }
    }

    pub fn action_failed(order_id: OrderId, message: impl Into<String>, transient: bool) -> Self {
        LifecycleEvent::ActionFailed {
            event_id: IdGenerator::generate(IdType::Event),
            order_id,
            message: message.into(),
            transient,
            at: Utc::now(),
        }
    }

    pub fn tracking_stopped(order_id: OrderId, final_status: OrderStatus) -> Self {
        LifecycleEvent::TrackingStopped {
            event_id: IdGenerator::generate(IdType::Event),
            order_id,
            final_status,
            at: Utc::now(),
        }
    }

    pub fn order_id(&self) -> &OrderId {
        match self {
            LifecycleEvent::StatusChanged { order_id, .. }
            | LifecycleEvent::ActionFailed { order_id, .. }
            | LifecycleEvent::TrackingStopped { order_id, .. } => order_id,
        }
    }

    /// Title and body for a toast or push message.
    pub fn headline(&self) -> (String, String) {
        match self {
            LifecycleEvent::StatusChanged { order_type, to, .. } => match (order_type, to) {
                (_, OrderStatus::Accepted) => (
                    "Order Accepted".to_string(),
                    "A rider is on the way to the pickup point".to_string(),
                ),
                (OrderType::Taxi, OrderStatus::OutForDelivery) => (
                    "Ride Started".to_string(),
                    "Your ride is in progress".to_string(),
                ),
                (_, OrderStatus::OutForDelivery) => (
                    "Out For Delivery".to_string(),
                    "Your order has been picked up".to_string(),
                ),
                (_, OrderStatus::Delivered) | (_, OrderStatus::Completed) => (
                    "Completed".to_string(),
                    "Your order has been completed".to_string(),
                ),
                (_, OrderStatus::Cancelled) => (
                    "Order Cancelled".to_string(),
                    "This order has been cancelled".to_string(),
                ),
                (_, status) => ("Status Updated".to_string(), format!("Order status: {}", status)),
            },
            LifecycleEvent::ActionFailed { message, .. } => ("Action Failed".to_string(), message.clone()),
            LifecycleEvent::TrackingStopped { final_status, .. } => (
                "Tracking Stopped".to_string(),
                format!("Final status: {}", final_status),
            ),
        }
    }
}
