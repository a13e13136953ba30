//! Outbound archival subscriber — the validator's side of the block feed.
//!
//! Per archival node: connect, answer the auth challenge, subscribe to
//! `BLOCK` events, and keep the connection alive with transport-level
//! ping/pong. Unexpected closes reconnect with capped exponential backoff;
//! after the attempt budget is exhausted the client gives up on that node
//! and asks discovery for a different healthy one.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use push_crypto::sign_message;
use push_discovery::{DiscoveryService, HealthProbe};
use push_messages::{ws_endpoint, ArchivalFrame, BlockUpdate, WsEnvelope, EVENT_BLOCK};
use push_types::{NodeAddress, PrivateKey};
use push_utils::now_millis;

use crate::error::WsError;

/// Client tunables.
#[derive(Clone, Debug)]
pub struct WsClientConfig {
    /// No pong within this window marks the connection stale.
    pub connection_timeout: Duration,
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// First reconnect delay; doubles per attempt.
    pub reconnect_base_delay: Duration,
    /// Ceiling for the reconnect delay.
    pub reconnect_max_delay: Duration,
    /// Reconnect attempts before giving up on a node.
    pub max_reconnect_attempts: u32,
    /// How long to wait for a clean close on shutdown.
    pub close_timeout: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(60),
            max_reconnect_attempts: 5,
            close_timeout: Duration::from_secs(5),
        }
    }
}

/// Backoff for the `attempt`-th reconnect: `min(base * 2^attempt, max)`.
pub fn reconnect_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |delay| delay.min(max))
}

/// Outcome of one connection session.
enum SessionEnd {
    /// Shutdown requested; do not reconnect.
    Shutdown,
    /// Connection failed or closed unexpectedly; candidate for reconnect.
    Abnormal(String),
}

/// The archival block-feed client.
pub struct ArchivalClient<P: HealthProbe> {
    config: WsClientConfig,
    validator_address: NodeAddress,
    signing_key: PrivateKey,
    discovery: Arc<DiscoveryService<P>>,
    /// Confirmations flow out here, tagged with the confirming node.
    blocks_tx: mpsc::Sender<(NodeAddress, BlockUpdate)>,
}

impl<P: HealthProbe> ArchivalClient<P> {
    pub fn new(
        config: WsClientConfig,
        validator_address: NodeAddress,
        signing_key: PrivateKey,
        discovery: Arc<DiscoveryService<P>>,
        blocks_tx: mpsc::Sender<(NodeAddress, BlockUpdate)>,
    ) -> Self {
        Self {
            config,
            validator_address,
            signing_key,
            discovery,
            blocks_tx,
        }
    }

    /// Maintain one subscription against `node`, reconnecting on failure and
    /// substituting a different healthy node once the budget is exhausted.
    /// Returns when shutdown fires or no candidate nodes remain.
    pub async fn run(
        &self,
        mut node: NodeAddress,
        mut url: String,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut tried: Vec<NodeAddress> = vec![node.clone()];
        let mut attempt: u32 = 0;

        loop {
            match self.run_session(&node, &url, &mut shutdown).await {
                SessionEnd::Shutdown => return,
                SessionEnd::Abnormal(reason) => {
                    tracing::warn!(%node, reason = %reason, attempt, "archival connection lost");
                }
            }

            attempt += 1;
            if attempt >= self.config.max_reconnect_attempts {
                // Give up on this node; move to another healthy one.
                match self.discovery.pick_untried(&tried).await {
                    Some((next_node, next_url)) => {
                        tracing::info!(old = %node, new = %next_node, "switching archival node");
                        node = next_node;
                        url = next_url;
                        tried.push(node.clone());
                        attempt = 0;
                    }
                    None => {
                        tracing::warn!("no healthy archival nodes left to try");
                        return;
                    }
                }
                continue;
            }

            let delay = reconnect_delay(
                attempt,
                self.config.reconnect_base_delay,
                self.config.reconnect_max_delay,
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => return,
            }
        }
    }

    /// One connect-auth-subscribe-read session.
    async fn run_session(
        &self,
        node: &NodeAddress,
        url: &str,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> SessionEnd {
        let endpoint = ws_endpoint(url);
        let mut socket = match connect_async(endpoint.as_str()).await {
            Ok((socket, _)) => socket,
            Err(e) => return SessionEnd::Abnormal(format!("connect: {e}")),
        };

        if let Err(e) = self.authenticate(&mut socket).await {
            return SessionEnd::Abnormal(format!("auth: {e}"));
        }
        if let Err(e) = send_frame(
            &mut socket,
            ArchivalFrame::Subscribe {
                events: vec![EVENT_BLOCK.to_string()],
            },
        )
        .await
        {
            return SessionEnd::Abnormal(format!("subscribe: {e}"));
        }
        tracing::info!(%node, "subscribed to archival block feed");

        let mut last_seen_ms = now_millis();
        let mut heartbeat = tokio::time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                message = socket.next() => {
                    let message = match message {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return SessionEnd::Abnormal(format!("receive: {e}")),
                        None => return SessionEnd::Abnormal("stream ended".into()),
                    };
                    last_seen_ms = now_millis();
                    match message {
                        Message::Text(text) => {
                            if let Some(reply) = self.handle_frame(node, &text).await {
                                if let Err(e) = send_frame(&mut socket, reply).await {
                                    return SessionEnd::Abnormal(format!("send reply: {e}"));
                                }
                            }
                        }
                        Message::Pong(_) | Message::Ping(_) => {}
                        Message::Close(frame) => {
                            return SessionEnd::Abnormal(close_reason(frame));
                        }
                        _ => {}
                    }
                }
                _ = heartbeat.tick() => {
                    // Stale connection: no traffic within the timeout.
                    if now_millis().saturating_sub(last_seen_ms)
                        > self.config.connection_timeout.as_millis() as u64
                    {
                        let _ = socket.close(None).await;
                        return SessionEnd::Abnormal("heartbeat timeout".into());
                    }
                    if socket.send(Message::Ping(Vec::new())).await.is_err() {
                        return SessionEnd::Abnormal("ping failed".into());
                    }
                }
                _ = shutdown.recv() => {
                    self.close_cleanly(&mut socket).await;
                    return SessionEnd::Shutdown;
                }
            }
        }
    }

    /// Answer the node's auth challenge and wait for success.
    async fn authenticate(&self, socket: &mut WsStream) -> Result<(), WsError> {
        let nonce = match read_frame(socket).await? {
            ArchivalFrame::AuthChallenge { nonce } => nonce,
            other => {
                return Err(WsError::Protocol(format!(
                    "expected AUTH_CHALLENGE, got {other:?}"
                )));
            }
        };
        let nonce_bytes =
            hex::decode(&nonce).map_err(|e| WsError::Auth(format!("bad nonce hex: {e}")))?;
        let signature = sign_message(&nonce_bytes, &self.signing_key);
        send_frame(
            socket,
            ArchivalFrame::AuthResponse {
                nonce,
                signature: hex::encode(signature.as_bytes()),
                validator_address: self.validator_address.to_string(),
            },
        )
        .await?;
        match read_frame(socket).await? {
            ArchivalFrame::AuthSuccess => Ok(()),
            other => Err(WsError::Auth(format!(
                "expected AUTH_SUCCESS, got {other:?}"
            ))),
        }
    }

    /// Route one inbound frame; returns a frame to send back, if any.
    async fn handle_frame(&self, node: &NodeAddress, text: &str) -> Option<ArchivalFrame> {
        let envelope: WsEnvelope<ArchivalFrame> = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(%node, error = %e, "malformed archival frame");
                return None;
            }
        };
        match envelope.payload {
            ArchivalFrame::Block { block } => {
                if self.blocks_tx.send((node.clone(), block)).await.is_err() {
                    tracing::debug!("confirmation channel closed");
                }
                None
            }
            ArchivalFrame::HealthCheck { timestamp } => {
                Some(ArchivalFrame::HealthCheckResponse { timestamp })
            }
            other => {
                tracing::debug!(%node, frame = ?other, "unexpected archival frame");
                None
            }
        }
    }

    /// Close with a normal code and wait (bounded) for the acknowledgement.
    async fn close_cleanly(&self, socket: &mut WsStream) {
        let _ = socket.close(None).await;
        let drain = async {
            while let Some(Ok(message)) = socket.next().await {
                if matches!(message, Message::Close(_)) {
                    break;
                }
            }
        };
        if tokio::time::timeout(self.config.close_timeout, drain)
            .await
            .is_err()
        {
            tracing::debug!("close acknowledgement timed out");
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

fn close_reason(frame: Option<CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) => format!("closed: {} {}", u16::from(frame.code), frame.reason),
        None => "closed without a close frame".into(),
    }
}

async fn send_frame(socket: &mut WsStream, frame: ArchivalFrame) -> Result<(), WsError> {
    let envelope = WsEnvelope::new(frame, now_millis());
    let text = serde_json::to_string(&envelope)
        .map_err(|e| WsError::Protocol(format!("serialize frame: {e}")))?;
    socket
        .send(Message::Text(text))
        .await
        .map_err(|e| WsError::Connect(e.to_string()))
}

/// Read the next protocol frame, skipping transport ping/pong.
async fn read_frame(socket: &mut WsStream) -> Result<ArchivalFrame, WsError> {
    loop {
        let message = socket
            .next()
            .await
            .ok_or_else(|| WsError::Connect("socket closed".into()))?
            .map_err(|e| WsError::Connect(e.to_string()))?;
        match message {
            Message::Text(text) => {
                let envelope: WsEnvelope<ArchivalFrame> = serde_json::from_str(&text)
                    .map_err(|e| WsError::Protocol(format!("malformed frame: {e}")))?;
                return Ok(envelope.payload);
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(frame) => {
                return Err(WsError::Connect(close_reason(frame)));
            }
            _ => return Err(WsError::Protocol("unexpected binary frame".into())),
        }
    }
}
