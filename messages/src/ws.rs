//! WebSocket frame protocol.
//!
//! Every frame is a JSON text message `{type, data?, timestamp}`. The `type`
//! tag and `data` payload are modeled as adjacently tagged enums; the
//! timestamp rides in [`WsEnvelope`].

use serde::{Deserialize, Serialize};

/// The only archival subscription event currently defined.
pub const EVENT_BLOCK: &str = "BLOCK";

/// WebSocket endpoint for a node's base URL.
///
/// `https://host` → `wss://host/ws`, `http://host` → `ws://host/ws`.
pub fn ws_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let converted = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{converted}/ws")
}

/// Outer frame shape: tagged payload plus a sender-side timestamp (millis).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WsEnvelope<T> {
    #[serde(flatten)]
    pub payload: T,
    pub timestamp: u64,
}

impl<T> WsEnvelope<T> {
    pub fn new(payload: T, timestamp: u64) -> Self {
        Self { payload, timestamp }
    }
}

/// One filter inside a downstream subscription, `{type, value?}` on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum SubscribeFilter {
    /// Match transactions whose category equals the value.
    #[serde(rename = "CATEGORY")]
    Category(String),
    /// Match transactions sent from the given CAIP address.
    #[serde(rename = "FROM")]
    From(String),
    /// Match transactions with any of the given CAIP addresses as recipient.
    #[serde(rename = "RECIPIENTS")]
    Recipients(Vec<String>),
    /// Match every transaction. Must be the only filter in its subscription.
    #[serde(rename = "WILDCARD")]
    Wildcard,
}

impl SubscribeFilter {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard)
    }
}

/// A confirmed block as carried in `BLOCK` frames: the hash plus the
/// transactions relevant to the receiver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdate {
    pub block_hash: String,
    pub txs: Vec<TxUpdate>,
}

/// One transaction inside a [`BlockUpdate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxUpdate {
    pub tx_hash: String,
    pub category: String,
    pub sender: String,
    pub recipients: Vec<String>,
    /// Hex-encoded payload bytes.
    pub data: String,
}

/// Frames on the downstream subscription socket (validator ↔ subscriber).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriberFrame {
    // Client → server
    Handshake {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    Subscribe {
        filters: Vec<SubscribeFilter>,
    },
    Unsubscribe {
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
    },
    Ping,

    // Server → client
    Welcome {
        #[serde(rename = "clientId")]
        client_id: String,
    },
    HandshakeAck {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    SubscribeAck {
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
        filters: Vec<SubscribeFilter>,
    },
    SubscribeError {
        error: String,
    },
    UnsubscribeAck,
    Pong,
    Error {
        error: String,
    },
    Block {
        block: BlockUpdate,
        #[serde(rename = "subscriptionId")]
        subscription_id: String,
        /// Only the filters that actually matched — never the client's full set.
        #[serde(rename = "matchedFilter")]
        matched_filter: Vec<SubscribeFilter>,
    },
}

/// Frames on the validator ↔ archival block feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchivalFrame {
    AuthChallenge {
        /// Hex-encoded random nonce the validator must sign.
        nonce: String,
    },
    AuthResponse {
        nonce: String,
        /// Hex-encoded Ed25519 signature over the nonce bytes.
        signature: String,
        #[serde(rename = "validatorAddress")]
        validator_address: String,
    },
    AuthSuccess,
    Subscribe {
        events: Vec<String>,
    },
    HealthCheck {
        timestamp: u64,
    },
    HealthCheckResponse {
        timestamp: u64,
    },
    Block {
        block: BlockUpdate,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_endpoint_conversion() {
        assert_eq!(ws_endpoint("https://a.example"), "wss://a.example/ws");
        assert_eq!(ws_endpoint("http://a.example/"), "ws://a.example/ws");
        assert_eq!(ws_endpoint("ws://a.example"), "ws://a.example/ws");
    }

    #[test]
    fn frame_wire_shape() {
        let frame = WsEnvelope::new(
            SubscriberFrame::Handshake {
                client_id: "client-1".into(),
            },
            42,
        );
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "HANDSHAKE");
        assert_eq!(json["data"]["clientId"], "client-1");
        assert_eq!(json["timestamp"], 42);
    }

    #[test]
    fn unit_frames_omit_data() {
        let json =
            serde_json::to_value(WsEnvelope::new(SubscriberFrame::Pong, 1)).unwrap();
        assert_eq!(json["type"], "PONG");
        assert!(json.get("data").is_none());
    }

    #[test]
    fn filter_wire_shape() {
        let json = serde_json::to_value(SubscribeFilter::Category("CUSTOM:chat".into())).unwrap();
        assert_eq!(json["type"], "CATEGORY");
        assert_eq!(json["value"], "CUSTOM:chat");

        let wildcard = serde_json::to_value(SubscribeFilter::Wildcard).unwrap();
        assert_eq!(wildcard["type"], "WILDCARD");
    }

    #[test]
    fn subscriber_frame_round_trip() {
        let frame = WsEnvelope::new(
            SubscriberFrame::Block {
                block: BlockUpdate {
                    block_hash: "ab".repeat(32),
                    txs: vec![TxUpdate {
                        tx_hash: "cd".repeat(32),
                        category: "CUSTOM:chat".into(),
                        sender: "eip155:1:0xAA".into(),
                        recipients: vec!["eip155:1:0xBB".into()],
                        data: "00ff".into(),
                    }],
                },
                subscription_id: "sub-1".into(),
                matched_filter: vec![SubscribeFilter::Category("CUSTOM:chat".into())],
            },
            7,
        );
        let text = serde_json::to_string(&frame).unwrap();
        let back: WsEnvelope<SubscriberFrame> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn archival_frame_round_trip() {
        let frame = WsEnvelope::new(
            ArchivalFrame::AuthResponse {
                nonce: "0011".into(),
                signature: "ff".repeat(64),
                validator_address: "push_00".into(),
            },
            9,
        );
        let text = serde_json::to_string(&frame).unwrap();
        let back: WsEnvelope<ArchivalFrame> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, frame);
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "AUTH_RESPONSE");
    }
}
