//! firmlink-core: Event bus and wire frames for the firmlink device link
//!
//! This crate provides the foundational pieces the RPC client and the console
//! are built on:
//!
//! - **Event bus** - [`EventBus`], a topic-keyed publish/subscribe registry
//! - **Wire frames** - [`frame::Request`] and helpers for inbound frames
//! - **Topics** - [`topic`], the well-known topic names the link publishes
//!
//! # Quick Start
//!
//! ```
//! use firmlink_core::EventBus;
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//! let id = bus.subscribe("online", |payload| {
//!     println!("device is online: {payload}");
//! });
//! bus.publish("online", json!(null));
//! bus.unsubscribe("online", id);
//! ```

pub mod bus;
pub mod frame;
pub mod topic;

// Re-export key types for convenience
pub use bus::{EventBus, SubscriptionId};
pub use frame::Request;
