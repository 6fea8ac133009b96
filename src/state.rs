// src/state.rs
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing;

use crate::{
    errors::{LifecycleError, LifecycleResult},
    lifecycle::{OtpPolicy, TransitionGate},
    models::order::OrderType,
    services::{
        lifecycle_service::LifecycleService,
        notification_service::{LogNotificationService, NotificationService, WebhookNotificationService},
        order_cache::OrderCache,
        order_client::{HttpOrderApi, OrderApi},
        status_poller::{StatusPoller, DEFAULT_POLL_INTERVAL},
    },
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    InvalidValue { var: String, value: String, reason: String },
}

impl From<ConfigError> for LifecycleError {
    fn from(err: ConfigError) -> Self {
        LifecycleError::ConfigurationError(err.to_string())
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub api_url: String,
    pub api_token: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub webhook_url: Option<String>,
    pub cache_path: Option<PathBuf>, // Where the order mirror survives restarts
    pub otp_policy: OtpPolicy,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .field("webhook_url", &self.webhook_url)
            .field("cache_path", &self.cache_path)
            .field("otp_policy", &self.otp_policy)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000".to_string(),
            api_token: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            request_timeout: Duration::from_secs(10),
            webhook_url: None,
            cache_path: None,
            otp_policy: OtpPolicy::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// - `LIFECYCLE_API_URL` (default `http://localhost:5000`)
    /// - `LIFECYCLE_API_TOKEN`
    /// - `LIFECYCLE_POLL_INTERVAL_MS` (default 3000)
    /// - `LIFECYCLE_TIMEOUT_SECS` (default 10)
    /// - `LIFECYCLE_WEBHOOK_URL`
    /// - `LIFECYCLE_CACHE_PATH`
    /// - `LIFECYCLE_PICKUP_OTP_TYPES`, `LIFECYCLE_DELIVERY_OTP_TYPES`: comma separated order types
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let poll_interval = match non_empty("LIFECYCLE_POLL_INTERVAL_MS") {
            Some(value) => Duration::from_millis(parse_positive("LIFECYCLE_POLL_INTERVAL_MS", &value)?),
            None => defaults.poll_interval,
        };
        let request_timeout = match non_empty("LIFECYCLE_TIMEOUT_SECS") {
            Some(value) => Duration::from_secs(parse_positive("LIFECYCLE_TIMEOUT_SECS", &value)?),
            None => defaults.request_timeout,
        };

        let mut otp_policy = defaults.otp_policy;
        if let Some(value) = non_empty("LIFECYCLE_PICKUP_OTP_TYPES") {
            otp_policy.pickup = parse_order_types("LIFECYCLE_PICKUP_OTP_TYPES", &value)?;
        }
        if let Some(value) = non_empty("LIFECYCLE_DELIVERY_OTP_TYPES") {
            otp_policy.delivery = parse_order_types("LIFECYCLE_DELIVERY_OTP_TYPES", &value)?;
        }

        Ok(Self {
            api_url: non_empty("LIFECYCLE_API_URL").unwrap_or(defaults.api_url),
            api_token: non_empty("LIFECYCLE_API_TOKEN"),
            poll_interval,
            request_timeout,
            webhook_url: non_empty("LIFECYCLE_WEBHOOK_URL"),
            cache_path: non_empty("LIFECYCLE_CACHE_PATH").map(PathBuf::from),
            otp_policy,
        })
    }
}

fn parse_positive(var: &str, value: &str) -> Result<u64, ConfigError> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            value: value.to_string(),
            reason: "expected a positive integer".to_string(),
        }),
    }
}

fn parse_order_types(var: &str, value: &str) -> Result<std::collections::HashSet<OrderType>, ConfigError> {
    // "none" switches the gate off for that stage.
    if value.eq_ignore_ascii_case("none") {
        return Ok(Default::default());
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<OrderType>().map_err(|_| ConfigError::InvalidValue {
                var: var.to_string(),
                value: s.to_string(),
                reason: "unknown order type".to_string(),
            })
        })
        .collect()
}

pub struct AppState {
    pub cache: Arc<OrderCache>,
    pub poller: Arc<StatusPoller>,
    pub lifecycle_service: Arc<LifecycleService>,
    pub notification_service: Arc<dyn NotificationService>,
    pub config: AppConfig,
}

impl AppState {
    pub async fn new(config: AppConfig) -> LifecycleResult<Self> {
        let api: Arc<dyn OrderApi> = Arc::new(HttpOrderApi::new(
            &config.api_url,
            config.api_token.clone(),
            config.request_timeout,
        )?);

        let notification_service: Arc<dyn NotificationService> = match &config.webhook_url {
            Some(url) => Arc::new(WebhookNotificationService::new(url.clone(), config.request_timeout)?),
            None => {
                tracing::warn!("LIFECYCLE_WEBHOOK_URL not set, notifications go to the log only");
                Arc::new(LogNotificationService)
            }
        };

        Self::with_services(config, api, notification_service).await
    }

    /// Wire the services around an existing backend client and notifier.
    pub async fn with_services(
        config: AppConfig,
        api: Arc<dyn OrderApi>,
        notification_service: Arc<dyn NotificationService>,
    ) -> LifecycleResult<Self> {
        let cache = Arc::new(match &config.cache_path {
            Some(path) => OrderCache::load_from(path).await?,
            None => OrderCache::new(),
        });

        let poller = Arc::new(StatusPoller::new(
            api.clone(),
            cache.clone(),
            notification_service.clone(),
            config.poll_interval,
        ));

        let lifecycle_service = Arc::new(LifecycleService::new(
            api,
            cache.clone(),
            notification_service.clone(),
            poller.clone(),
            TransitionGate::new(config.otp_policy.clone()),
        ));

        Ok(Self {
            cache,
            poller,
            lifecycle_service,
            notification_service,
            config,
        })
    }

    /// Stop all polling and persist the mirror if a cache path is configured.
    /// Finished orders are pruned first so the saved mirror only holds live ones.
    pub async fn shutdown(&self) -> LifecycleResult<()> {
        self.poller.shutdown().await;
        if let Some(path) = &self.config.cache_path {
            self.cache.prune_terminal().await;
            self.cache.save_to(path).await?;
        }
        Ok(())
    }
}
