// src/services/order_cache.rs
use std::collections::HashMap;
use std::path::Path;

use tokio::sync::RwLock;
use tracing;

use crate::{
    errors::{LifecycleError, LifecycleResult},
    models::order::{OrderId, OrderSnapshot},
};

/// Local mirror of every order this client knows about.
///
/// Shared by the lifecycle service and the status poller; the mirror's status
/// is the "last known" value both of them diff against.
#[derive(Debug, Default)]
pub struct OrderCache {
    orders: RwLock<HashMap<OrderId, OrderSnapshot>>,
}

impl OrderCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace, returning the previous snapshot.
    pub async fn insert(&self, snapshot: OrderSnapshot) -> Option<OrderSnapshot> {
        tracing::debug!("Caching order {} ({})", snapshot.id, snapshot.status);
        self.orders.write().await.insert(snapshot.id.clone(), snapshot)
    }

    /// Insert only when the order is unknown. Returns whether it was inserted.
    pub async fn insert_if_absent(&self, snapshot: OrderSnapshot) -> bool {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&snapshot.id) {
            return false;
        }
        orders.insert(snapshot.id.clone(), snapshot);
        true
    }

    pub async fn get(&self, order_id: &OrderId) -> Option<OrderSnapshot> {
        self.orders.read().await.get(order_id).cloned()
    }

    /// Read-modify-write a single order under the write lock.
    pub async fn update<F, R>(&self, order_id: &OrderId, f: F) -> LifecycleResult<R>
    where
        F: FnOnce(&mut OrderSnapshot) -> R,
    {
        let mut orders = self.orders.write().await;
        let snapshot = orders
            .get_mut(order_id)
            .ok_or_else(|| LifecycleError::not_tracked(order_id.as_str()))?;
        Ok(f(snapshot))
    }

    pub async fn remove(&self, order_id: &OrderId) -> Option<OrderSnapshot> {
        self.orders.write().await.remove(order_id)
    }

    /// Drop every order that reached a terminal status. Returns the dropped ids, sorted.
    pub async fn prune_terminal(&self) -> Vec<OrderId> {
        let mut orders = self.orders.write().await;
        let mut pruned: Vec<OrderId> = orders
            .values()
            .filter(|snapshot| snapshot.is_terminal())
            .map(|snapshot| snapshot.id.clone())
            .collect();
        for id in &pruned {
            orders.remove(id);
        }
        pruned.sort();

        if !pruned.is_empty() {
            tracing::debug!("Pruned {} finished orders", pruned.len());
        }
        pruned
    }

    pub async fn ids(&self) -> Vec<OrderId> {
        let mut ids: Vec<OrderId> = self.orders.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Write the mirror to `path` as a JSON array.
    pub async fn save_to(&self, path: &Path) -> LifecycleResult<()> {
        let mut snapshots: Vec<OrderSnapshot> = self.orders.read().await.values().cloned().collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));

        let json = serde_json::to_vec_pretty(&snapshots)?;
        tokio::fs::write(path, json).await?;

        tracing::info!("Saved {} orders to {}", snapshots.len(), path.display());
        Ok(())
    }

    /// Load a mirror written by [`OrderCache::save_to`]. A missing file is an empty mirror.
    pub async fn load_from(path: &Path) -> LifecycleResult<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No saved orders at {}", path.display());
                return Ok(Self::new());
            }
            Err(err) => return Err(err.into()),
        };

        let snapshots: Vec<OrderSnapshot> = serde_json::from_slice(&bytes)?;
        tracing::info!("Loaded {} orders from {}", snapshots.len(), path.display());

        let orders = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.id.clone(), snapshot))
            .collect();
        Ok(Self { orders: RwLock::new(orders) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{OrderStatus, OrderType, PaymentMethod};

    fn ride(id: &str) -> OrderSnapshot {
        OrderSnapshot::new(id, OrderType::Taxi, PaymentMethod::Cash)
    }

    #[tokio::test]
    async fn test_insert_if_absent_keeps_existing() {
        let cache = OrderCache::new();
        assert!(cache.insert_if_absent(ride("42").with_status(OrderStatus::Accepted)).await);
        assert!(!cache.insert_if_absent(ride("42")).await);

        let cached = cache.get(&OrderId::new("42")).await.unwrap();
        assert_eq!(cached.status, OrderStatus::Accepted);
    }

    #[tokio::test]
    async fn test_update_unknown_order() {
        let cache = OrderCache::new();
        let result = cache.update(&OrderId::new("missing"), |s| s.status).await;
        assert!(matches!(result, Err(LifecycleError::OrderNotTracked(_))));
    }

    #[tokio::test]
    async fn test_update_mutates_in_place() {
        let cache = OrderCache::new();
        cache.insert(ride("7")).await;
        cache
            .update(&OrderId::new("7"), |s| s.status = OrderStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(cache.get(&OrderId::new("7")).await.unwrap().status, OrderStatus::Accepted);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.json");

        let cache = OrderCache::new();
        cache.insert(ride("b")).await;
        cache.insert(ride("a").with_status(OrderStatus::OutForDelivery)).await;
        cache.save_to(&path).await.unwrap();

        let loaded = OrderCache::load_from(&path).await.unwrap();
        assert_eq!(loaded.ids().await, vec![OrderId::new("a"), OrderId::new("b")]);
        assert_eq!(
            loaded.get(&OrderId::new("a")).await.unwrap().status,
            OrderStatus::OutForDelivery
        );
    }

    #[tokio::test]
    async fn test_prune_terminal_keeps_live_orders() {
        let cache = OrderCache::new();
        cache.insert(ride("live").with_status(OrderStatus::Accepted)).await;
        cache.insert(ride("done").with_status(OrderStatus::Delivered)).await;
        cache.insert(ride("gone").with_status(OrderStatus::Cancelled)).await;

        let pruned = cache.prune_terminal().await;
        assert_eq!(pruned, vec![OrderId::new("done"), OrderId::new("gone")]);
        assert_eq!(cache.ids().await, vec![OrderId::new("live")]);
        assert!(cache.prune_terminal().await.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = OrderCache::load_from(&dir.path().join("nope.json")).await.unwrap();
        assert!(loaded.is_empty().await);
    }
}
