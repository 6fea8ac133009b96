//! # Order Lifecycle State Machine
//!
//! ```text
//! pending ──accept──▶ accepted ──pick up──▶ out_for_delivery ──deliver──▶ delivered
//!    │                   │                     │    ▲
//!    │                   │                     └────┘ collect COD
//!    └───────────────────┴─────────cancel──────┴──────────────▶ cancelled
//! ```
//!
//! `completed` is terminal as well but is only ever observed from the backend.
//!
//! [`TransitionGate::plan`] is pure: it decides which remote command an action
//! maps to, or why it is not allowed. The caller issues the command and only
//! then records the outcome with [`OrderSnapshot::apply`]. A guard failure
//! therefore never leaves anything to roll back.

use std::collections::HashSet;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::order::{OrderSnapshot, OrderStatus, OrderType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtpStage {
    Pickup,
    Delivery,
}

impl fmt::Display for OtpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtpStage::Pickup => f.write_str("pickup"),
            OtpStage::Delivery => f.write_str("delivery"),
        }
    }
}

/// Which order types need an OTP at which stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpPolicy {
    pub pickup: HashSet<OrderType>,
    pub delivery: HashSet<OrderType>,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            pickup: [OrderType::Taxi, OrderType::Porter].into_iter().collect(),
            delivery: [OrderType::Porter, OrderType::Grocery, OrderType::Ecommerce]
                .into_iter()
                .collect(),
        }
    }
}

impl OtpPolicy {
    /// A policy that never asks for an OTP.
    pub fn none() -> Self {
        Self { pickup: HashSet::new(), delivery: HashSet::new() }
    }

    pub fn requires(&self, order_type: OrderType, stage: OtpStage) -> bool {
        match stage {
            OtpStage::Pickup => self.pickup.contains(&order_type),
            OtpStage::Delivery => self.delivery.contains(&order_type),
        }
    }
}

/// Rider actions that mutate the remote order.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Accept,
    MarkPickedUp,
    CollectCod,
    MarkDelivered,
    Cancel { reason: String },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::MarkPickedUp => "mark picked up",
            Action::CollectCod => "collect COD",
            Action::MarkDelivered => "mark delivered",
            Action::Cancel { .. } => "cancel",
        }
    }

    /// The OTP stage this action is gated on, if any.
    pub fn otp_stage(&self) -> Option<OtpStage> {
        match self {
            Action::MarkPickedUp => Some(OtpStage::Pickup),
            Action::MarkDelivered => Some(OtpStage::Delivery),
            _ => None,
        }
    }
}

/// The remote call an allowed action translates to.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    UpdateStatus { to: OrderStatus, reason: Option<String> },
    CollectCod { amount: f64 },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GuardError {
    #[error("order is already {0}")]
    Terminal(OrderStatus),

    #[error("cannot {action} while order is {from}")]
    InvalidTransition { action: &'static str, from: OrderStatus },

    #[error("{0} OTP must be verified first")]
    OtpRequired(OtpStage),

    #[error("{0} OTP is not required for this order")]
    OtpNotRequired(OtpStage),

    #[error("cash must be collected before delivery")]
    CodRequired,

    #[error("order is not cash on delivery")]
    CodNotApplicable,

    #[error("cash has already been collected")]
    CodAlreadyCollected,

    #[error("COD amount is unknown for this order")]
    MissingCodAmount,

    #[error("a cancellation reason is required")]
    CancelReasonRequired,
}

/// Result of comparing a remote status with the local mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Unchanged,
    Changed { from: OrderStatus, to: OrderStatus },
    /// Remote went backwards or moved after a terminal state; ignored.
    Stale { local: OrderStatus, remote: OrderStatus },
}

#[derive(Debug, Clone, Default)]
pub struct TransitionGate {
    policy: OtpPolicy,
}

impl TransitionGate {
    pub fn new(policy: OtpPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    pub fn requires_otp(&self, order: &OrderSnapshot, stage: OtpStage) -> bool {
        self.policy.requires(order.order_type, stage)
    }

    /// Decide what `action` means for `order` without touching it.
    ///
    /// `otp_pending` is true when the caller is about to verify an OTP for
    /// the action's stage right before mutating, which satisfies the OTP guard.
    pub fn plan(&self, order: &OrderSnapshot, action: &Action, otp_pending: bool) -> Result<Command, GuardError> {
        if order.status.is_terminal() {
            return Err(GuardError::Terminal(order.status));
        }

        let invalid = || GuardError::InvalidTransition { action: action.name(), from: order.status };

        match action {
            Action::Accept => match order.status {
                OrderStatus::Pending => Ok(Command::UpdateStatus { to: OrderStatus::Accepted, reason: None }),
                _ => Err(invalid()),
            },
            Action::MarkPickedUp => {
                if order.status != OrderStatus::Accepted {
                    return Err(invalid());
                }
                self.check_otp_gate(order, OtpStage::Pickup, otp_pending)?;
                Ok(Command::UpdateStatus { to: OrderStatus::OutForDelivery, reason: None })
            }
            Action::CollectCod => {
                if order.status != OrderStatus::OutForDelivery {
                    return Err(invalid());
                }
                if !order.payment_method.requires_cod_collection() {
                    return Err(GuardError::CodNotApplicable);
                }
                if order.cod_collected {
                    return Err(GuardError::CodAlreadyCollected);
                }
                let amount = order.cod_amount.ok_or(GuardError::MissingCodAmount)?;
                Ok(Command::CollectCod { amount })
            }
            Action::MarkDelivered => {
                if order.status != OrderStatus::OutForDelivery {
                    return Err(invalid());
                }
                self.check_otp_gate(order, OtpStage::Delivery, otp_pending)?;
                if order.payment_method.requires_cod_collection() && !order.cod_collected {
                    return Err(GuardError::CodRequired);
                }
                Ok(Command::UpdateStatus { to: OrderStatus::Delivered, reason: None })
            }
            Action::Cancel { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(GuardError::CancelReasonRequired);
                }
                Ok(Command::UpdateStatus { to: OrderStatus::Cancelled, reason: Some(reason.to_string()) })
            }
        }
    }

    /// Whether an OTP for `stage` may be submitted right now.
    pub fn check_otp(&self, order: &OrderSnapshot, stage: OtpStage) -> Result<(), GuardError> {
        if order.status.is_terminal() {
            return Err(GuardError::Terminal(order.status));
        }
        let expected = match stage {
            OtpStage::Pickup => OrderStatus::Accepted,
            OtpStage::Delivery => OrderStatus::OutForDelivery,
        };
        if order.status != expected {
            return Err(GuardError::InvalidTransition {
                action: match stage {
                    OtpStage::Pickup => "verify pickup OTP",
                    OtpStage::Delivery => "verify delivery OTP",
                },
                from: order.status,
            });
        }
        if !self.requires_otp(order, stage) {
            return Err(GuardError::OtpNotRequired(stage));
        }
        Ok(())
    }

    fn check_otp_gate(&self, order: &OrderSnapshot, stage: OtpStage, otp_pending: bool) -> Result<(), GuardError> {
        if self.requires_otp(order, stage) && !order.otp_verified(stage) && !otp_pending {
            return Err(GuardError::OtpRequired(stage));
        }
        Ok(())
    }
}

impl OrderSnapshot {
    pub fn otp_verified(&self, stage: OtpStage) -> bool {
        match stage {
            OtpStage::Pickup => self.pickup_otp_verified,
            OtpStage::Delivery => self.delivery_otp_verified,
        }
    }

    pub fn record_otp_verified(&mut self, stage: OtpStage) {
        match stage {
            OtpStage::Pickup => self.pickup_otp_verified = true,
            OtpStage::Delivery => self.delivery_otp_verified = true,
        }
        self.updated_at = Utc::now();
    }

    /// Record a command the backend has accepted.
    ///
    /// The status write obeys the same rule as [`OrderSnapshot::observe`]: a
    /// mirror that went terminal or further forward while the command was in
    /// flight keeps its status and the result is `Stale`.
    pub fn apply(&mut self, command: &Command) -> Observation {
        let observation = match command {
            Command::UpdateStatus { to, reason } => {
                let observation = self.observe(*to);
                if matches!(observation, Observation::Changed { to: OrderStatus::Cancelled, .. }) {
                    self.cancel_reason = reason.clone();
                }
                observation
            }
            Command::CollectCod { .. } => {
                self.cod_collected = true;
                Observation::Unchanged
            }
        };
        self.updated_at = Utc::now();
        observation
    }

    /// Fold a status reported by the backend into the mirror.
    ///
    /// Terminal states are sticky and the forward rank never decreases, so a
    /// slow response that raced a local action cannot undo it.
    pub fn observe(&mut self, remote: OrderStatus) -> Observation {
        let local = self.status;
        if remote == local {
            return Observation::Unchanged;
        }
        if local.is_terminal() || remote.rank() < local.rank() {
            return Observation::Stale { local, remote };
        }
        self.status = remote;
        self.updated_at = Utc::now();
        Observation::Changed { from: local, to: remote }
    }
}
