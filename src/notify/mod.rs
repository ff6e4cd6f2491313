//! Notification service core (spec §4.2): tracks per-instance block-head
//! assertions and invalidates them on block-update, re-expressed as a small
//! Tokio task tree instead of a fiber-per-instance scheduler.

pub mod assertion;
pub mod connection;
pub mod context;
pub mod dispatch;
pub mod instance;
pub mod wire;
