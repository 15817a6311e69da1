//! Well-known topics published by the link layer

/// Published once when a connection opens; no payload.
pub const ONLINE: &str = "online";

/// Published when a connection attempt fails or an open connection drops.
pub const OFFLINE: &str = "offline";

/// Every successfully parsed inbound frame, replies included.
pub const WS: &str = "ws";

/// Correlation topic for the reply to request `id`.
pub fn rpc(id: u64) -> String {
    format!("rpc-{id}")
}

#[cfg(test)]
mod tests {
    #[test]
    fn rpc_topic_embeds_the_request_id() {
        assert_eq!(super::rpc(0), "rpc-0");
        assert_eq!(super::rpc(42), "rpc-42");
    }
}
