// src/services/mod.rs
pub mod lifecycle_service;
pub mod notification_service;
pub mod order_cache;
pub mod order_client;
pub mod status_poller;
