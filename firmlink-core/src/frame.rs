//! Wire frames for the device link
//!
//! One frame is one JSON document over the WebSocket. Outbound frames are
//! always requests; inbound frames are either replies (they carry the `id`
//! of the request they answer) or unsolicited events such as log lines.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_json::Value;

/// Outbound request frame: `{"id": …, "method": …, "params": …}`
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

/// Extract the correlation id from an inbound frame, if it carries one
///
/// Frames without an `id` field (or with a non-integer one) are unsolicited
/// events, not replies.
pub fn correlation_id(frame: &Value) -> Option<u64> {
    frame.get("id").and_then(Value::as_u64)
}

/// Decode the text of a device log event
///
/// The firmware pushes `{"name": "log", "data": "<base64>"}` frames with no
/// id; the payload is base64-encoded console output. Returns `None` for any
/// other frame shape or for undecodable data. Non-UTF-8 bytes are replaced
/// rather than rejected; this feeds a log view, not a parser.
pub fn decode_log(frame: &Value) -> Option<String> {
    if frame.get("name").and_then(Value::as_str) != Some("log") {
        return None;
    }
    let data = frame.get("data").and_then(Value::as_str)?;
    let bytes = BASE64.decode(data).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
