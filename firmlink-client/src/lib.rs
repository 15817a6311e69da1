//! firmlink-client: JSON-RPC over WebSocket for firmlink devices
//!
//! One [`Connection`] wraps one live socket. Calls are correlated with their
//! replies through the shared [`EventBus`](firmlink_core::EventBus): every
//! request id gets its own `rpc-<id>` topic, and the same bus carries the
//! `online`/`offline` connection state and every inbound frame on `ws`, so
//! "wait for one specific reply" and "listen to all device pushes" are the
//! same mechanism.
//!
//! # Quick Start
//!
//! ```no_run
//! use firmlink_client::Connection;
//! use firmlink_core::{EventBus, frame, topic};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), firmlink_client::ClientError> {
//! let bus = EventBus::new();
//! bus.subscribe(topic::WS, |msg| {
//!     if let Some(line) = frame::decode_log(&msg) {
//!         print!("{line}");
//!     }
//! });
//!
//! let conn = Connection::connect("10.0.0.5:80", bus.clone()).await?;
//! let reply = conn.call("exec", json!({"code": "1+1"})).await?;
//! println!("{reply}");
//! conn.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod connection;
mod error;

pub use connection::{Connection, DEFAULT_CALL_TIMEOUT};
pub use error::ClientError;
