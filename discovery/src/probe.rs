//! Archival health probing over a short-lived WebSocket.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use push_crypto::sign_message;
use push_messages::{ws_endpoint, ArchivalFrame, WsEnvelope};
use push_types::{NodeAddress, PrivateKey};
use push_utils::now_millis;

/// Ability to decide whether a candidate archival node is healthy.
///
/// The service is generic over this so tests can substitute a deterministic
/// probe for the real WebSocket round trip.
pub trait HealthProbe: Send + Sync + 'static {
    fn check(&self, url: &str) -> impl std::future::Future<Output = bool> + Send;
}

/// The production probe: open a WebSocket, complete the auth challenge and a
/// health-check round trip within the timeout, then close.
///
/// Any failure — timeout, transport error, malformed or out-of-order frame —
/// excludes the node for this cycle.
pub struct WsHealthProbe {
    validator_address: NodeAddress,
    signing_key: PrivateKey,
    timeout: Duration,
}

impl WsHealthProbe {
    pub fn new(validator_address: NodeAddress, signing_key: PrivateKey, timeout: Duration) -> Self {
        Self {
            validator_address,
            signing_key,
            timeout,
        }
    }

    async fn run_probe(&self, base_url: &str) -> Result<(), String> {
        let url = ws_endpoint(base_url);
        let (mut socket, _) = connect_async(url.as_str()).await.map_err(|e| e.to_string())?;

        // 1. Expect the auth challenge.
        let nonce = match read_frame(&mut socket).await? {
            ArchivalFrame::AuthChallenge { nonce } => nonce,
            other => return Err(format!("expected AUTH_CHALLENGE, got {other:?}")),
        };

        // 2. Sign the nonce and answer.
        let nonce_bytes = hex::decode(&nonce).map_err(|e| format!("bad nonce hex: {e}"))?;
        let signature = sign_message(&nonce_bytes, &self.signing_key);
        send_frame(
            &mut socket,
            ArchivalFrame::AuthResponse {
                nonce,
                signature: hex::encode(signature.as_bytes()),
                validator_address: self.validator_address.to_string(),
            },
        )
        .await?;

        match read_frame(&mut socket).await? {
            ArchivalFrame::AuthSuccess => {}
            other => return Err(format!("expected AUTH_SUCCESS, got {other:?}")),
        }

        // 3. Health-check round trip.
        let sent_ts = now_millis();
        send_frame(&mut socket, ArchivalFrame::HealthCheck { timestamp: sent_ts }).await?;
        match read_frame(&mut socket).await? {
            ArchivalFrame::HealthCheckResponse { .. } => {}
            other => return Err(format!("expected HEALTH_CHECK_RESPONSE, got {other:?}")),
        }

        let _ = socket.close(None).await;
        Ok(())
    }
}

impl HealthProbe for WsHealthProbe {
    async fn check(&self, url: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.run_probe(url)).await {
            Ok(Ok(())) => true,
            Ok(Err(reason)) => {
                tracing::debug!(url, reason = %reason, "health check failed");
                false
            }
            Err(_) => {
                tracing::debug!(url, "health check timed out");
                false
            }
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn send_frame(socket: &mut WsStream, frame: ArchivalFrame) -> Result<(), String> {
    let envelope = WsEnvelope::new(frame, now_millis());
    let text = serde_json::to_string(&envelope).map_err(|e| e.to_string())?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| e.to_string())
}

/// Read the next JSON text frame, skipping transport ping/pong.
async fn read_frame(socket: &mut WsStream) -> Result<ArchivalFrame, String> {
    loop {
        let message = socket
            .next()
            .await
            .ok_or_else(|| "socket closed".to_string())?
            .map_err(|e| e.to_string())?;
        match message {
            Message::Text(text) => {
                let envelope: WsEnvelope<ArchivalFrame> =
                    serde_json::from_str(&text).map_err(|e| format!("malformed frame: {e}"))?;
                return Ok(envelope.payload);
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return Err("peer closed during probe".into()),
            _ => return Err("unexpected binary frame".into()),
        }
    }
}
