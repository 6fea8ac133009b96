#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

use order_lifecycle::{
    models::api::{CodCollectRequest, OtpVerifyRequest, StatusUpdateRequest},
    services::{notification_service::ChannelNotificationService, order_client::OrderApi},
    AppConfig, AppState, LifecycleError, LifecycleEvent, LifecycleResult, OrderId, OrderStatus, OrderType,
};

/// In-memory stand-in for the rider backend.
///
/// `fetch_status` replays the scripted responses first, then keeps returning
/// the backend's current status.
pub struct FakeOrderApi {
    script: Mutex<VecDeque<Result<OrderStatus, String>>>,
    remote_status: Mutex<OrderStatus>,
    valid_otp: Mutex<Option<String>>,
    update_rejection: Mutex<Option<(u16, String)>>,
    fetch_delay: Mutex<Option<Duration>>,
    update_delay: Mutex<Option<Duration>>,
    pub updates: Mutex<Vec<StatusUpdateRequest>>,
    pub otp_requests: Mutex<Vec<OtpVerifyRequest>>,
    pub cod_requests: Mutex<Vec<CodCollectRequest>>,
    fetch_calls: AtomicUsize,
}

impl FakeOrderApi {
    pub fn new(remote_status: OrderStatus) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            remote_status: Mutex::new(remote_status),
            valid_otp: Mutex::new(None),
            update_rejection: Mutex::new(None),
            fetch_delay: Mutex::new(None),
            update_delay: Mutex::new(None),
            updates: Mutex::new(Vec::new()),
            otp_requests: Mutex::new(Vec::new()),
            cod_requests: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    pub fn script(&self, responses: Vec<Result<OrderStatus, String>>) {
        self.script.lock().unwrap().extend(responses);
    }

    pub fn set_otp(&self, otp: &str) {
        *self.valid_otp.lock().unwrap() = Some(otp.to_string());
    }

    pub fn reject_updates(&self, status: u16, message: &str) {
        *self.update_rejection.lock().unwrap() = Some((status, message.to_string()));
    }

    /// Make every status fetch take `delay` before answering.
    pub fn slow_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    /// Make every status update take `delay` before the backend applies it.
    pub fn slow_updates(&self, delay: Duration) {
        *self.update_delay.lock().unwrap() = Some(delay);
    }

    pub fn remote_status(&self) -> OrderStatus {
        *self.remote_status.lock().unwrap()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    pub fn otp_calls(&self) -> usize {
        self.otp_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderApi for FakeOrderApi {
    async fn fetch_status(&self, _order_id: &OrderId, _order_type: OrderType) -> LifecycleResult<OrderStatus> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(LifecycleError::NetworkConnection(message)),
            None => Ok(self.remote_status()),
        }
    }

    async fn update_status(
        &self,
        _order_id: &OrderId,
        request: &StatusUpdateRequest,
    ) -> LifecycleResult<Option<OrderStatus>> {
        self.updates.lock().unwrap().push(request.clone());
        let delay = *self.update_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((status, message)) = self.update_rejection.lock().unwrap().clone() {
            return Err(LifecycleError::Rejected { status, message });
        }
        *self.remote_status.lock().unwrap() = request.status;
        Ok(Some(request.status))
    }

    async fn verify_otp(&self, _order_id: &OrderId, request: &OtpVerifyRequest) -> LifecycleResult<()> {
        self.otp_requests.lock().unwrap().push(request.clone());
        match self.valid_otp.lock().unwrap().as_deref() {
            Some(code) if code == request.otp => Ok(()),
            _ => Err(LifecycleError::OtpRejected("Invalid OTP".to_string())),
        }
    }

    async fn collect_cod(&self, _order_id: &OrderId, request: &CodCollectRequest) -> LifecycleResult<()> {
        self.cod_requests.lock().unwrap().push(request.clone());
        Ok(())
    }
}

pub async fn app_with(
    api: Arc<FakeOrderApi>,
    poll_interval: Duration,
) -> (AppState, UnboundedReceiver<LifecycleEvent>) {
    let (notifier, events) = ChannelNotificationService::new();
    let config = AppConfig { poll_interval, ..AppConfig::default() };
    let state = AppState::with_services(config, api, Arc::new(notifier))
        .await
        .expect("wiring with in-memory services cannot fail");
    (state, events)
}

pub fn drain(events: &mut UnboundedReceiver<LifecycleEvent>) -> Vec<LifecycleEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

pub fn status_changes(events: &[LifecycleEvent]) -> Vec<(OrderStatus, OrderStatus)> {
    events
        .iter()
        .filter_map(|event| match event {
            LifecycleEvent::StatusChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

pub fn failures(events: &[LifecycleEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            LifecycleEvent::ActionFailed { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}
