// src/services/lifecycle_service.rs
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing;

use crate::{
    errors::{LifecycleError, LifecycleResult},
    lifecycle::{Action, Command, Observation, OtpStage, TransitionGate},
    models::{
        api::{CodCollectRequest, OtpVerifyRequest, StatusUpdateRequest},
        events::{ChangeSource, LifecycleEvent},
        order::{OrderId, OrderSnapshot},
    },
    services::{
        notification_service::{publish_quietly, NotificationService},
        order_cache::OrderCache,
        order_client::OrderApi,
        status_poller::{sync_status, StatusPoller},
    },
};

pub const OTP_LENGTH: usize = 6;

/// Rider-side operations on a tracked order.
///
/// Every mutating call follows the same order: check the gate against the
/// mirror, verify an OTP if one was supplied, issue the backend call, and
/// only then update the mirror. Failures are published as `ActionFailed`
/// events and returned unchanged.
#[async_trait]
pub trait LifecycleOperations: Send + Sync {
    async fn track(&self, snapshot: OrderSnapshot) -> LifecycleResult<String>;
    async fn untrack(&self, order_id: &OrderId) -> bool;
    async fn snapshot(&self, order_id: &OrderId) -> LifecycleResult<OrderSnapshot>;
    async fn refresh(&self, order_id: &OrderId) -> LifecycleResult<OrderSnapshot>;
    async fn accept(&self, order_id: &OrderId) -> LifecycleResult<OrderSnapshot>;
    async fn verify_otp(&self, order_id: &OrderId, stage: OtpStage, otp: &str) -> LifecycleResult<OrderSnapshot>;
    async fn mark_picked_up(&self, order_id: &OrderId, otp: Option<&str>) -> LifecycleResult<OrderSnapshot>;
    async fn collect_cod(&self, order_id: &OrderId, otp: Option<&str>) -> LifecycleResult<OrderSnapshot>;
    async fn mark_delivered(&self, order_id: &OrderId, otp: Option<&str>) -> LifecycleResult<OrderSnapshot>;
    async fn cancel(&self, order_id: &OrderId, reason: &str) -> LifecycleResult<OrderSnapshot>;
}

pub struct LifecycleService {
    api: Arc<dyn OrderApi>,
    cache: Arc<OrderCache>,
    notifier: Arc<dyn NotificationService>,
    poller: Arc<StatusPoller>,
    gate: TransitionGate,
}

/// Check that `otp` is exactly six digits. Surrounding whitespace is ignored.
pub fn validate_otp(otp: &str) -> LifecycleResult<String> {
    let otp = otp.trim();
    if otp.len() != OTP_LENGTH || !otp.bytes().all(|b| b.is_ascii_digit()) {
        return Err(LifecycleError::InvalidOtpFormat);
    }
    Ok(otp.to_string())
}

impl LifecycleService {
    pub fn new(
        api: Arc<dyn OrderApi>,
        cache: Arc<OrderCache>,
        notifier: Arc<dyn NotificationService>,
        poller: Arc<StatusPoller>,
        gate: TransitionGate,
    ) -> Self {
        Self { api, cache, notifier, poller, gate }
    }

    pub fn gate(&self) -> &TransitionGate {
        &self.gate
    }

    async fn report<T>(&self, order_id: &OrderId, result: LifecycleResult<T>) -> LifecycleResult<T> {
        if let Err(err) = &result {
            tracing::warn!("Action on order {} failed: {}", order_id, err);
            publish_quietly(
                self.notifier.as_ref(),
                LifecycleEvent::action_failed(order_id.clone(), err.user_message(), err.is_transient()),
            )
            .await;
        }
        result
    }

    async fn cached(&self, order_id: &OrderId) -> LifecycleResult<OrderSnapshot> {
        self.cache
            .get(order_id)
            .await
            .ok_or_else(|| LifecycleError::not_tracked(order_id.as_str()))
    }

    async fn confirm_otp(&self, snapshot: &OrderSnapshot, stage: OtpStage, otp: String) -> LifecycleResult<()> {
        let request = OtpVerifyRequest { otp, order_type: snapshot.order_type, stage };
        self.api.verify_otp(&snapshot.id, &request).await?;
        self.cache.update(&snapshot.id, |s| s.record_otp_verified(stage)).await?;
        tracing::info!("{} OTP verified for order {}", stage, snapshot.id);
        Ok(())
    }

    async fn perform(&self, order_id: &OrderId, action: Action, otp: Option<&str>) -> LifecycleResult<OrderSnapshot> {
        let snapshot = self.cached(order_id).await?;

        // An inline OTP is only sent when the gate still needs it.
        let gating_otp = match (action.otp_stage(), otp) {
            (Some(stage), Some(code)) if self.gate.requires_otp(&snapshot, stage) && !snapshot.otp_verified(stage) => {
                Some((stage, code))
            }
            _ => None,
        };

        let command = self.gate.plan(&snapshot, &action, gating_otp.is_some())?;
        tracing::info!("Order {}: {} planned as {:?}", order_id, action.name(), command);

        let gating_otp = match gating_otp {
            Some((stage, code)) => Some((stage, validate_otp(code)?)),
            None => None,
        };
        let cod_otp = match (&action, otp) {
            (Action::CollectCod, Some(code)) => Some(validate_otp(code)?),
            _ => None,
        };

        if let Some((stage, code)) = gating_otp {
            self.confirm_otp(&snapshot, stage, code).await?;
        }

        let echoed = match &command {
            Command::UpdateStatus { to, reason } => {
                let request = StatusUpdateRequest {
                    status: *to,
                    order_type: snapshot.order_type,
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                };
                self.api.update_status(order_id, &request).await?
            }
            Command::CollectCod { amount } => {
                let request = CodCollectRequest { amount: *amount, otp: cod_otp };
                self.api.collect_cod(order_id, &request).await?;
                None
            }
        };

        let (from, applied, updated) = self
            .cache
            .update(order_id, |s| {
                let from = s.status;
                let applied = s.apply(&command);
                if let Some(remote) = echoed {
                    s.observe(remote);
                }
                (from, applied, s.clone())
            })
            .await?;

        if let Observation::Stale { local, remote } = applied {
            tracing::info!(
                "Order {} reached {} while {} was in flight, keeping it over {}",
                order_id,
                local,
                action.name(),
                remote
            );
        }

        if updated.status != from {
            tracing::info!("Order {} moved {} -> {}", order_id, from, updated.status);
            publish_quietly(
                self.notifier.as_ref(),
                LifecycleEvent::status_changed(
                    order_id.clone(),
                    updated.order_type,
                    from,
                    updated.status,
                    ChangeSource::Action,
                ),
            )
            .await;
        }

        Ok(updated)
    }

    async fn verify_standalone(&self, order_id: &OrderId, stage: OtpStage, otp: &str) -> LifecycleResult<OrderSnapshot> {
        let snapshot = self.cached(order_id).await?;
        self.gate.check_otp(&snapshot, stage)?;
        let code = validate_otp(otp)?;

        if snapshot.otp_verified(stage) {
            tracing::debug!("{} OTP for order {} already verified", stage, order_id);
            return Ok(snapshot);
        }

        self.confirm_otp(&snapshot, stage, code).await?;
        self.cached(order_id).await
    }
}

#[async_trait]
impl LifecycleOperations for LifecycleService {
    async fn track(&self, snapshot: OrderSnapshot) -> LifecycleResult<String> {
        self.poller.track(snapshot).await
    }

    async fn untrack(&self, order_id: &OrderId) -> bool {
        self.poller.untrack(order_id).await
    }

    async fn snapshot(&self, order_id: &OrderId) -> LifecycleResult<OrderSnapshot> {
        self.cached(order_id).await
    }

    async fn refresh(&self, order_id: &OrderId) -> LifecycleResult<OrderSnapshot> {
        let result = sync_status(self.api.as_ref(), &self.cache, self.notifier.as_ref(), order_id).await;
        self.report(order_id, result).await?;
        self.cached(order_id).await
    }

    async fn accept(&self, order_id: &OrderId) -> LifecycleResult<OrderSnapshot> {
        let result = self.perform(order_id, Action::Accept, None).await;
        self.report(order_id, result).await
    }

    async fn verify_otp(&self, order_id: &OrderId, stage: OtpStage, otp: &str) -> LifecycleResult<OrderSnapshot> {
        let result = self.verify_standalone(order_id, stage, otp).await;
        self.report(order_id, result).await
    }

    async fn mark_picked_up(&self, order_id: &OrderId, otp: Option<&str>) -> LifecycleResult<OrderSnapshot> {
        let result = self.perform(order_id, Action::MarkPickedUp, otp).await;
        self.report(order_id, result).await
    }

    async fn collect_cod(&self, order_id: &OrderId, otp: Option<&str>) -> LifecycleResult<OrderSnapshot> {
        let result = self.perform(order_id, Action::CollectCod, otp).await;
        self.report(order_id, result).await
    }

    async fn mark_delivered(&self, order_id: &OrderId, otp: Option<&str>) -> LifecycleResult<OrderSnapshot> {
        let result = self.perform(order_id, Action::MarkDelivered, otp).await;
        self.report(order_id, result).await
    }

    async fn cancel(&self, order_id: &OrderId, reason: &str) -> LifecycleResult<OrderSnapshot> {
        let action = Action::Cancel { reason: reason.to_string() };
        let result = self.perform(order_id, action, None).await;
        self.report(order_id, result).await
    }
}
