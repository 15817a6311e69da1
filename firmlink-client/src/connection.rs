//! WebSocket connection handling for the device link
//!
//! `connect` opens the socket and spawns a reader and a writer task; the
//! handle it returns is the only way to talk to the device. Inbound frames
//! are demultiplexed onto the bus by the reader: every parsed frame goes out
//! on `ws`, and frames that carry an `id` additionally go out on `rpc-<id>`,
//! which is what completes a pending call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use firmlink_core::bus::EventBus;
use firmlink_core::frame::{self, Request};
use firmlink_core::topic;

use crate::error::ClientError;

/// Timeout applied by [`Connection::call`], and by
/// [`Connection::call_with_timeout`] when given [`Duration::ZERO`].
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_millis(3000);

/// What the writer task is asked to do next.
enum Outgoing {
    Frame(String),
    Close,
}

/// Handle to one live device connection
///
/// Wraps exactly one socket. Once the connection goes offline the handle is
/// spent; reconnecting means calling [`Connection::connect`] again. Request
/// ids start at 0 and increase strictly for the lifetime of the handle.
pub struct Connection {
    bus: EventBus,
    outgoing: mpsc::Sender<Outgoing>,
    next_id: AtomicU64,
    online: Arc<AtomicBool>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("next_id", &self.next_id)
            .field("online", &self.online)
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Open a connection to `address` and publish `online` on success
    ///
    /// A bare `host:port` address is expanded to `ws://host:port/ws`; an
    /// address that already carries a scheme is used verbatim. On any open
    /// failure `offline` is published and the error is returned; no partial
    /// handle exists. A connection that drops after opening is reported via
    /// the `offline` topic, not through this function.
    pub async fn connect(address: &str, bus: EventBus) -> Result<Connection, ClientError> {
        let url = if address.contains("://") {
            address.to_string()
        } else {
            format!("ws://{address}/ws")
        };

        let (ws, _response) = match connect_async(&url).await {
            Ok(ok) => ok,
            Err(source) => {
                bus.publish(topic::OFFLINE, Value::Null);
                return Err(ClientError::Connect { url, source });
            }
        };
        debug!(%url, "device link established");

        let (ws_tx, ws_rx) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(32);
        let online = Arc::new(AtomicBool::new(true));

        tokio::spawn(write_loop(outgoing_rx, ws_tx));
        tokio::spawn(read_loop(ws_rx, bus.clone(), Arc::clone(&online)));

        bus.publish(topic::ONLINE, Value::Null);
        Ok(Connection {
            bus,
            outgoing: outgoing_tx,
            next_id: AtomicU64::new(0),
            online,
        })
    }

    /// Whether the socket is still believed to be open
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// Invoke `method` on the device with the default timeout
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        self.call_with_timeout(method, params, DEFAULT_CALL_TIMEOUT).await
    }

    /// Invoke `method` on the device, waiting at most `timeout` for the reply
    ///
    /// Resolves with the full reply frame. [`Duration::ZERO`] means the
    /// default timeout. Reply arrival and timeout expiry are mutually
    /// exclusive: whichever happens first settles the call, and the loser
    /// finds the reply slot already taken and does nothing. Every exit path
    /// removes the correlation subscription, so a timed-out call leaves
    /// nothing behind on the bus.
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ClientError> {
        let timeout = if timeout.is_zero() { DEFAULT_CALL_TIMEOUT } else { timeout };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let reply_topic = topic::rpc(id);

        let (reply_tx, reply_rx) = oneshot::channel();
        let slot = Mutex::new(Some(reply_tx));
        let subscription = self.bus.subscribe(&reply_topic, move |msg| {
            if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(msg);
            }
        });

        let request = Request { id, method: method.to_string(), params };
        let frame = match serde_json::to_string(&request) {
            Ok(frame) => frame,
            Err(e) => {
                self.bus.unsubscribe(&reply_topic, subscription);
                return Err(ClientError::Serialize(e));
            }
        };

        debug!(id, method, "call");
        if self.outgoing.send(Outgoing::Frame(frame)).await.is_err() {
            // Writer task is gone; the connection closed under us.
            self.bus.unsubscribe(&reply_topic, subscription);
            return Err(ClientError::Closed);
        }

        let outcome = tokio::time::timeout(timeout, reply_rx).await;
        self.bus.unsubscribe(&reply_topic, subscription);
        match outcome {
            Ok(Ok(reply)) => Ok(reply),
            // The sender lives in the subscription we still hold here, so the
            // channel cannot close early; treat it as the connection dying.
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                debug!(id, method, "call timed out");
                Err(ClientError::Timeout { method: method.to_string(), timeout })
            }
        }
    }

    /// Close the connection
    ///
    /// Resolves once the close has been handed to the writer task. Calls
    /// still in flight are not cancelled; each surfaces through its own
    /// timeout, and listeners see `offline` once the socket actually closes.
    pub async fn disconnect(&self) {
        self.online.store(false, Ordering::Relaxed);
        let _ = self.outgoing.send(Outgoing::Close).await;
    }
}

/// Forward queued frames to the socket until asked to close
async fn write_loop<S>(mut outgoing: mpsc::Receiver<Outgoing>, mut sink: S)
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(next) = outgoing.recv().await {
        match next {
            Outgoing::Frame(frame) => {
                if let Err(e) = sink.send(Message::Text(frame.into())).await {
                    warn!("failed to send frame: {e}");
                    break;
                }
            }
            Outgoing::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Demultiplex inbound traffic onto the bus until the socket goes away
///
/// Frames are processed strictly in arrival order, and all bus publishes for
/// one frame finish before the next frame is read.
async fn read_loop<S, E>(mut stream: S, bus: EventBus, online: Arc<AtomicBool>)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => dispatch_frame(&bus, text.as_str()),
            Ok(Message::Close(_)) => {
                debug!("device closed the connection");
                break;
            }
            // Pings are answered by the transport; binary frames carry
            // nothing in this protocol.
            Ok(_) => {}
            Err(e) => {
                warn!("websocket error: {e}");
                break;
            }
        }
    }
    online.store(false, Ordering::Relaxed);
    bus.publish(topic::OFFLINE, Value::Null);
}

/// Publish one raw inbound frame: `ws` always, `rpc-<id>` when it is a reply
///
/// A frame that fails to parse is logged and dropped; the connection stays
/// up and no call is affected.
fn dispatch_frame(bus: &EventBus, raw: &str) {
    match serde_json::from_str::<Value>(raw) {
        Ok(msg) => {
            bus.publish(topic::WS, msg.clone());
            if let Some(id) = frame::correlation_id(&msg) {
                bus.publish(&topic::rpc(id), msg);
            }
        }
        Err(e) => warn!("malformed frame: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tokio_tungstenite::tungstenite;

    use super::*;

    /// A connection wired to an in-memory writer channel instead of a socket.
    fn test_connection(bus: EventBus) -> (Connection, mpsc::Receiver<Outgoing>) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel(8);
        let connection = Connection {
            bus,
            outgoing: outgoing_tx,
            next_id: AtomicU64::new(0),
            online: Arc::new(AtomicBool::new(true)),
        };
        (connection, outgoing_rx)
    }

    fn sent_frame(next: Option<Outgoing>) -> Value {
        match next {
            Some(Outgoing::Frame(frame)) => serde_json::from_str(&frame).unwrap(),
            _ => panic!("expected an outgoing frame"),
        }
    }

    // ==================== call ====================

    #[tokio::test]
    async fn call_resolves_with_the_correlated_reply() {
        let bus = EventBus::new();
        let (connection, mut sent) = test_connection(bus.clone());

        let responder = async {
            let request = sent_frame(sent.recv().await);
            assert_eq!(request, json!({"id": 0, "method": "exec", "params": {"code": "1+1"}}));
            bus.publish(&topic::rpc(0), json!({"id": 0, "result": 2}));
        };
        let (result, ()) = tokio::join!(
            connection.call("exec", json!({"code": "1+1"})),
            responder,
        );

        assert_eq!(result.unwrap(), json!({"id": 0, "result": 2}));
        // No leaked correlation subscription.
        assert_eq!(bus.subscriber_count(&topic::rpc(0)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn call_times_out_after_exactly_the_configured_timeout() {
        let bus = EventBus::new();
        let (connection, _sent) = test_connection(bus.clone());

        let started = tokio::time::Instant::now();
        let error = connection
            .call_with_timeout("exec", json!({}), Duration::from_millis(250))
            .await
            .unwrap_err();

        assert!(matches!(error, ClientError::Timeout { .. }));
        assert_eq!(started.elapsed(), Duration::from_millis(250));
        assert_eq!(bus.subscriber_count(&topic::rpc(0)), 0);

        // A reply arriving after the timeout settles nothing and panics nothing.
        bus.publish(&topic::rpc(0), json!({"id": 0, "result": 1}));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_timeout_falls_back_to_the_default() {
        let bus = EventBus::new();
        let (connection, _sent) = test_connection(bus);

        let started = tokio::time::Instant::now();
        let error = connection
            .call_with_timeout("status", json!(null), Duration::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(error, ClientError::Timeout { .. }));
        assert_eq!(started.elapsed(), DEFAULT_CALL_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_correlate_independently() {
        let bus = EventBus::new();
        let (connection, mut sent) = test_connection(bus.clone());

        let responder = async {
            let first = sent_frame(sent.recv().await);
            let second = sent_frame(sent.recv().await);
            assert_eq!(first["id"], 0);
            assert_eq!(second["id"], 1);
            // Only the second call gets an answer; a reply for id 1 must
            // never settle the call with id 0.
            bus.publish(&topic::rpc(1), json!({"id": 1, "result": "second"}));
        };
        let (first, second, ()) = tokio::join!(
            connection.call_with_timeout("a", Value::Null, Duration::from_millis(100)),
            connection.call("b", Value::Null),
            responder,
        );

        assert!(matches!(first.unwrap_err(), ClientError::Timeout { .. }));
        assert_eq!(second.unwrap()["result"], "second");
        assert_eq!(bus.subscriber_count(&topic::rpc(0)), 0);
        assert_eq!(bus.subscriber_count(&topic::rpc(1)), 0);
    }

    #[tokio::test]
    async fn call_after_disconnect_fails_fast() {
        let bus = EventBus::new();
        let (connection, mut sent) = test_connection(bus.clone());

        connection.disconnect().await;
        assert!(!connection.is_online());
        assert!(matches!(sent.recv().await, Some(Outgoing::Close)));
        // Writer task has exited.
        drop(sent);

        let error = connection.call("exec", Value::Null).await.unwrap_err();
        assert!(matches!(error, ClientError::Closed));
        assert_eq!(bus.subscriber_count(&topic::rpc(0)), 0);
    }

    // ==================== read loop ====================

    fn text(raw: &str) -> Result<Message, tungstenite::Error> {
        Ok(Message::Text(raw.into()))
    }

    #[tokio::test]
    async fn read_loop_demultiplexes_inbound_frames() {
        let bus = EventBus::new();
        let ws_seen = Arc::new(Mutex::new(Vec::new()));
        {
            let ws_seen = Arc::clone(&ws_seen);
            bus.subscribe(topic::WS, move |msg| {
                ws_seen.lock().unwrap().push(msg);
            });
        }
        let reply_seen = Arc::new(Mutex::new(Vec::new()));
        {
            let reply_seen = Arc::clone(&reply_seen);
            bus.subscribe(&topic::rpc(7), move |msg| {
                reply_seen.lock().unwrap().push(msg);
            });
        }
        let offline = Arc::new(Mutex::new(0));
        {
            let offline = Arc::clone(&offline);
            bus.subscribe(topic::OFFLINE, move |_| {
                *offline.lock().unwrap() += 1;
            });
        }

        let online = Arc::new(AtomicBool::new(true));
        let inbound = futures_util::stream::iter(vec![
            text(r#"{"id": 7, "result": 2}"#),
            text(r#"{"name": "log", "data": "aGVsbG8="}"#),
            // Malformed frame: logged and skipped, the loop keeps going.
            text("not json"),
            Ok(Message::Ping(Vec::new().into())),
            text(r#"{"name": "telemetry"}"#),
        ]);
        read_loop(inbound, bus.clone(), Arc::clone(&online)).await;

        // Replies also appear on `ws`; only the id-carrying frame appears on
        // its correlation topic.
        let ws_seen = ws_seen.lock().unwrap();
        assert_eq!(ws_seen.len(), 3);
        assert_eq!(ws_seen[0], json!({"id": 7, "result": 2}));
        assert_eq!(reply_seen.lock().unwrap().as_slice(), [json!({"id": 7, "result": 2})]);

        // Stream end means the socket is gone: offline exactly once.
        assert_eq!(*offline.lock().unwrap(), 1);
        assert!(!online.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn read_loop_stops_at_close_frame_and_publishes_offline() {
        let bus = EventBus::new();
        let after_close = Arc::new(Mutex::new(0));
        {
            let after_close = Arc::clone(&after_close);
            bus.subscribe(topic::WS, move |_| {
                *after_close.lock().unwrap() += 1;
            });
        }
        let offline = Arc::new(Mutex::new(0));
        {
            let offline = Arc::clone(&offline);
            bus.subscribe(topic::OFFLINE, move |_| {
                *offline.lock().unwrap() += 1;
            });
        }

        let online = Arc::new(AtomicBool::new(true));
        let inbound = futures_util::stream::iter(vec![
            Ok(Message::Close(None)),
            // Never reached.
            text(r#"{"name": "log", "data": "aGVsbG8="}"#),
        ]);
        read_loop(inbound, bus, Arc::clone(&online)).await;

        assert_eq!(*after_close.lock().unwrap(), 0);
        assert_eq!(*offline.lock().unwrap(), 1);
        assert!(!online.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn read_loop_treats_transport_errors_as_disconnection() {
        let bus = EventBus::new();
        let offline = Arc::new(Mutex::new(0));
        {
            let offline = Arc::clone(&offline);
            bus.subscribe(topic::OFFLINE, move |_| {
                *offline.lock().unwrap() += 1;
            });
        }

        let online = Arc::new(AtomicBool::new(true));
        let inbound = futures_util::stream::iter(vec![
            text(r#"{"id": 0, "result": 1}"#),
            Err(tungstenite::Error::ConnectionClosed),
        ]);
        read_loop(inbound, bus, Arc::clone(&online)).await;

        assert_eq!(*offline.lock().unwrap(), 1);
        assert!(!online.load(Ordering::Relaxed));
    }
}
