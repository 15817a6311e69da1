//! Error types for the device link

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by [`Connection`](crate::Connection) operations
///
/// Every failure is local to the operation that caused it: a failed call
/// does not affect other pending calls or the connection itself, and a
/// failed connect never yields a partial handle.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("call {method:?} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },

    #[error("connection is closed")]
    Closed,

    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
}
