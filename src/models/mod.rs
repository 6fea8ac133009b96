// src/models/mod.rs
pub mod api;
pub mod events;
pub mod order;

pub use events::*;
pub use order::*;
