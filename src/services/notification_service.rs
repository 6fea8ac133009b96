// src/services/notification_service.rs
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing;

use crate::{
    errors::{LifecycleError, LifecycleResult},
    models::events::LifecycleEvent,
};

/// Where lifecycle side effects go: toasts, push messages, UI state.
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn publish(&self, event: LifecycleEvent) -> LifecycleResult<()>;
}

/// Writes every event to the log.
#[derive(Debug, Default)]
pub struct LogNotificationService;

#[async_trait]
impl NotificationService for LogNotificationService {
    async fn publish(&self, event: LifecycleEvent) -> LifecycleResult<()> {
        let (title, body) = event.headline();
        match &event {
            LifecycleEvent::ActionFailed { order_id, .. } => {
                tracing::warn!("[{}] {} - {}", order_id, title, body);
            }
            _ => {
                tracing::info!("[{}] {} - {}", event.order_id(), title, body);
            }
        }
        Ok(())
    }
}

/// Forwards events into a channel so an embedding UI can react to them.
#[derive(Debug, Clone)]
pub struct ChannelNotificationService {
    sender: mpsc::UnboundedSender<LifecycleEvent>,
}

impl ChannelNotificationService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl NotificationService for ChannelNotificationService {
    async fn publish(&self, event: LifecycleEvent) -> LifecycleResult<()> {
        self.sender.send(event).map_err(|_| LifecycleError::ChannelClosed)
    }
}

/// POSTs each event as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotificationService {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotificationService {
    pub fn new(url: impl Into<String>, timeout: Duration) -> LifecycleResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl NotificationService for WebhookNotificationService {
    async fn publish(&self, event: LifecycleEvent) -> LifecycleResult<()> {
        let (title, body) = event.headline();
        let payload = json!({
            "title": title,
            "body": body,
            "event": event,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| LifecycleError::NotificationFailed(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("Webhook delivery failed: {}", error_text);
            return Err(LifecycleError::NotificationFailed(error_text));
        }

        tracing::debug!("Webhook notified for order {}", event.order_id());
        Ok(())
    }
}

/// Publish and swallow failures; a lost toast must never fail a transition.
pub async fn publish_quietly(notifier: &dyn NotificationService, event: LifecycleEvent) {
    if let Err(err) = notifier.publish(event).await {
        tracing::warn!("Dropping lifecycle notification: {}", err);
    }
}
