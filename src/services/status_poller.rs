// src/services/status_poller.rs
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing;

use crate::{
    errors::{LifecycleError, LifecycleResult},
    lifecycle::{GuardError, Observation},
    models::{
        events::{ChangeSource, LifecycleEvent},
        order::{OrderId, OrderSnapshot},
    },
    services::{
        notification_service::{publish_quietly, NotificationService},
        order_cache::OrderCache,
        order_client::OrderApi,
    },
    utils::id_generator::generate_session_id,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Fetch the remote status of one cached order and fold it into the mirror.
///
/// Publishes a `StatusChanged` event only when the mirror actually moved, so
/// repeated identical responses are silent.
pub async fn sync_status(
    api: &dyn OrderApi,
    cache: &OrderCache,
    notifier: &dyn NotificationService,
    order_id: &OrderId,
) -> LifecycleResult<Observation> {
    let snapshot = cache
        .get(order_id)
        .await
        .ok_or_else(|| LifecycleError::not_tracked(order_id.as_str()))?;

    let remote = api.fetch_status(order_id, snapshot.order_type).await?;
    let observation = cache.update(order_id, |s| s.observe(remote)).await?;

    match observation {
        Observation::Changed { from, to } => {
            tracing::info!("Order {} moved {} -> {}", order_id, from, to);
            publish_quietly(
                notifier,
                LifecycleEvent::status_changed(order_id.clone(), snapshot.order_type, from, to, ChangeSource::Poll),
            )
            .await;
        }
        Observation::Unchanged => {
            tracing::debug!("Order {} still {}", order_id, remote);
        }
        Observation::Stale { local, remote } => {
            tracing::debug!("Ignoring stale status {} for order {} (local {})", remote, order_id, local);
        }
    }

    Ok(observation)
}

struct Session {
    session_id: String,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

type Sessions = Arc<Mutex<HashMap<OrderId, Session>>>;

/// Polls every tracked order on its own fixed-interval task.
pub struct StatusPoller {
    api: Arc<dyn OrderApi>,
    cache: Arc<OrderCache>,
    notifier: Arc<dyn NotificationService>,
    interval: Duration,
    sessions: Sessions,
}

impl StatusPoller {
    pub fn new(
        api: Arc<dyn OrderApi>,
        cache: Arc<OrderCache>,
        notifier: Arc<dyn NotificationService>,
        interval: Duration,
    ) -> Self {
        Self {
            api,
            cache,
            notifier,
            interval,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `snapshot`. An order already in the mirror keeps its
    /// cached state; the snapshot only seeds unknown orders.
    ///
    /// Returns the tracking session id.
    pub async fn track(&self, snapshot: OrderSnapshot) -> LifecycleResult<String> {
        snapshot.validate()?;
        let order_id = snapshot.id.clone();
        self.cache.insert_if_absent(snapshot).await;

        let current = self
            .cache
            .get(&order_id)
            .await
            .ok_or_else(|| LifecycleError::not_tracked(order_id.as_str()))?;
        if current.is_terminal() {
            return Err(GuardError::Terminal(current.status).into());
        }

        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(&order_id) {
            if !existing.handle.is_finished() {
                return Err(LifecycleError::AlreadyTracked(order_id.to_string()));
            }
        }

        let session_id = generate_session_id();
        let (stop, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(poll_loop(
            PollContext {
                api: self.api.clone(),
                cache: self.cache.clone(),
                notifier: self.notifier.clone(),
                sessions: self.sessions.clone(),
                interval: self.interval,
                order_id: order_id.clone(),
                session_id: session_id.clone(),
            },
            stop_rx,
        ));

        tracing::info!("Tracking order {} every {:?} (session {})", order_id, self.interval, session_id);
        sessions.insert(order_id, Session { session_id: session_id.clone(), stop, handle });

        Ok(session_id)
    }

    /// Stop polling an order. Once this returns no response for it will be
    /// applied any more. Returns false if it was not being tracked.
    pub async fn untrack(&self, order_id: &OrderId) -> bool {
        let session = self.sessions.lock().await.remove(order_id);
        match session {
            Some(session) => {
                let _ = session.stop.send(true);
                let _ = session.handle.await;
                tracing::info!("Stopped tracking order {} (session {})", order_id, session.session_id);
                true
            }
            None => false,
        }
    }

    pub async fn is_tracking(&self, order_id: &OrderId) -> bool {
        self.sessions
            .lock()
            .await
            .get(order_id)
            .is_some_and(|session| !session.handle.is_finished())
    }

    pub async fn tracked_ids(&self) -> Vec<OrderId> {
        let sessions = self.sessions.lock().await;
        let mut ids: Vec<OrderId> = sessions
            .iter()
            .filter(|(_, session)| !session.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Stop every polling task and wait for all of them to exit.
    pub async fn shutdown(&self) {
        let drained: Vec<Session> = self.sessions.lock().await.drain().map(|(_, s)| s).collect();
        tracing::info!("Shutting down {} polling sessions", drained.len());

        let handles: Vec<JoinHandle<()>> = drained
            .into_iter()
            .map(|session| {
                let _ = session.stop.send(true);
                session.handle
            })
            .collect();
        join_all(handles).await;
    }
}

struct PollContext {
    api: Arc<dyn OrderApi>,
    cache: Arc<OrderCache>,
    notifier: Arc<dyn NotificationService>,
    sessions: Sessions,
    interval: Duration,
    order_id: OrderId,
    session_id: String,
}

impl PollContext {
    async fn finish(&self, snapshot: Option<OrderSnapshot>) {
        if let Some(snapshot) = snapshot {
            tracing::info!("Order {} reached {}, stopping poller", self.order_id, snapshot.status);
            publish_quietly(
                self.notifier.as_ref(),
                LifecycleEvent::tracking_stopped(self.order_id.clone(), snapshot.status),
            )
            .await;
        }

        let mut sessions = self.sessions.lock().await;
        if sessions.get(&self.order_id).is_some_and(|s| s.session_id == self.session_id) {
            sessions.remove(&self.order_id);
        }
    }
}

async fn poll_loop(ctx: PollContext, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(ctx.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut failures: u32 = 0;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = ticker.tick() => {}
        }

        let snapshot = match ctx.cache.get(&ctx.order_id).await {
            Some(snapshot) => snapshot,
            None => {
                tracing::debug!("Order {} left the cache, stopping poller", ctx.order_id);
                ctx.finish(None).await;
                break;
            }
        };
        if snapshot.is_terminal() {
            ctx.finish(Some(snapshot)).await;
            break;
        }

        // Dropping the in-flight request on stop keeps late responses out of the mirror.
        let result = tokio::select! {
            _ = stop.changed() => break,
            result = sync_status(ctx.api.as_ref(), &ctx.cache, ctx.notifier.as_ref(), &ctx.order_id) => result,
        };

        match result {
            Ok(Observation::Changed { to, .. }) if to.is_terminal() => {
                let final_snapshot = ctx.cache.get(&ctx.order_id).await;
                ctx.finish(final_snapshot).await;
                break;
            }
            Ok(_) => failures = 0,
            Err(LifecycleError::OrderNotTracked(_)) => {
                ctx.finish(None).await;
                break;
            }
            Err(err) => {
                failures += 1;
                tracing::warn!("Polling order {} failed ({} in a row): {}", ctx.order_id, failures, err);
                if failures == 1 {
                    publish_quietly(
                        ctx.notifier.as_ref(),
                        LifecycleEvent::action_failed(ctx.order_id.clone(), err.user_message(), err.is_transient()),
                    )
                    .await;
                }
            }
        }
    }
}
