//! Downstream subscription fan-out server.
//!
//! Accepts WebSocket connections at `/ws`. A client must identify itself
//! with a `HANDSHAKE` frame within the handshake timeout (or the connection
//! is closed with code 1008), then manages subscriptions with `SUBSCRIBE` /
//! `UNSUBSCRIBE`. Confirmed blocks are pushed to every subscription they
//! match, carrying only the matching transactions and the filters that
//! actually matched.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex};

use push_messages::{BlockUpdate, SubscriberFrame, WsEnvelope};
use push_utils::now_millis;

use crate::error::WsError;
use crate::subscriptions::{validate_filters, ClientSubscriptions, SubscribeRateLimiter};

/// Close code sent when a client misbehaves (policy violation).
const CLOSE_POLICY_VIOLATION: u16 = 1008;
/// Per-client outbound queue depth.
const OUTBOUND_QUEUE: usize = 64;

/// Server tunables.
#[derive(Clone, Debug)]
pub struct WsServerConfig {
    /// How long a new connection may wait before sending `HANDSHAKE`.
    pub handshake_timeout: Duration,
    /// Minimum spacing between subscribe requests on one connection.
    pub subscribe_min_interval: Duration,
    /// How long a disconnected client's subscriptions are retained after an
    /// abnormal close.
    pub reconnect_grace: Duration,
}

impl Default for WsServerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            subscribe_min_interval: Duration::from_millis(500),
            reconnect_grace: Duration::from_secs(60),
        }
    }
}

/// One known client, connected or within its reconnect grace window.
struct ClientRecord {
    subscriptions: ClientSubscriptions,
    limiter: SubscribeRateLimiter,
    /// Outbound frame queue; `None` while disconnected.
    sender: Option<mpsc::Sender<Message>>,
    /// Set on abnormal close; drives grace-window purging.
    disconnected_at_ms: Option<u64>,
}

/// Shared state for the subscription server.
pub struct WsServerState {
    config: WsServerConfig,
    clients: Mutex<HashMap<String, ClientRecord>>,
}

impl WsServerState {
    pub fn new(config: WsServerConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Fan a confirmed block out to every matching subscription.
    ///
    /// Each client receives one `BLOCK` frame per matching subscription,
    /// containing only the matching transactions and matched filters.
    pub async fn broadcast_block_update(&self, update: &BlockUpdate) {
        let clients = self.clients.lock().await;
        let mut delivered = 0usize;
        for (client_id, record) in clients.iter() {
            let Some(sender) = &record.sender else {
                continue;
            };
            for subscription in record.subscriptions.iter() {
                let Some((txs, matched)) = crate::subscriptions::match_block(subscription, update)
                else {
                    continue;
                };
                let frame = SubscriberFrame::Block {
                    block: BlockUpdate {
                        block_hash: update.block_hash.clone(),
                        txs,
                    },
                    subscription_id: subscription.id.clone(),
                    matched_filter: matched,
                };
                if sender.try_send(text_frame(frame)).is_err() {
                    tracing::warn!(client_id = %client_id, "subscriber outbound queue full, frame dropped");
                } else {
                    delivered += 1;
                }
            }
        }
        tracing::debug!(block = %update.block_hash, delivered, "block update broadcast");
    }

    /// Purge clients whose reconnect grace expired.
    pub async fn purge_disconnected(&self, now_ms: u64) {
        let grace = self.config.reconnect_grace.as_millis() as u64;
        self.clients.lock().await.retain(|client_id, record| {
            match record.disconnected_at_ms {
                Some(at) if now_ms.saturating_sub(at) > grace => {
                    tracing::debug!(client_id = %client_id, "client record purged after grace window");
                    false
                }
                _ => true,
            }
        });
    }

    /// Number of currently connected clients.
    pub async fn connected_count(&self) -> usize {
        self.clients
            .lock()
            .await
            .values()
            .filter(|r| r.sender.is_some())
            .count()
    }
}

/// The WebSocket server: `/ws` route over axum.
pub struct WsServer {
    pub port: u16,
    pub state: Arc<WsServerState>,
}

impl WsServer {
    pub fn new(port: u16, state: Arc<WsServerState>) -> Self {
        Self { port, state }
    }

    /// Bind and serve until the process shuts down.
    pub async fn start(&self) -> Result<(), WsError> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| WsError::Bind(e.to_string()))?;
        tracing::info!("WebSocket server listening on {addr}");
        Self::serve(listener, self.state.clone()).await
    }

    /// Serve on an already-bound listener (lets tests pick port 0).
    pub async fn serve(
        listener: tokio::net::TcpListener,
        state: Arc<WsServerState>,
    ) -> Result<(), WsError> {
        let app = Router::new()
            .route("/ws", get(ws_handler))
            .with_state(state);
        axum::serve(listener, app)
            .await
            .map_err(|e| WsError::Bind(e.to_string()))?;
        Ok(())
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WsServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Serialize a frame into an outbound text message.
fn text_frame(frame: SubscriberFrame) -> Message {
    let envelope = WsEnvelope::new(frame, now_millis());
    Message::Text(
        serde_json::to_string(&envelope).expect("subscriber frame is always serializable"),
    )
}

async fn handle_socket(socket: WebSocket, state: Arc<WsServerState>) {
    let (mut sink, mut stream) = socket.split();

    // Phase 1: the client must hand-shake within the timeout.
    let client_id =
        match await_handshake(&mut stream, state.config.handshake_timeout).await {
            Some(id) => id,
            None => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CLOSE_POLICY_VIOLATION,
                        reason: "handshake timeout".into(),
                    })))
                    .await;
                return;
            }
        };

    // Phase 2: register (or re-attach within the grace window) and spawn the
    // writer task that drains the outbound queue.
    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE);
    {
        let mut clients = state.clients.lock().await;
        let record = clients.entry(client_id.clone()).or_insert_with(|| {
            ClientRecord {
                subscriptions: ClientSubscriptions::new(),
                limiter: SubscribeRateLimiter::new(
                    state.config.subscribe_min_interval.as_millis() as u64,
                ),
                sender: None,
                disconnected_at_ms: None,
            }
        });
        record.sender = Some(out_tx.clone());
        record.disconnected_at_ms = None;
        if !record.subscriptions.is_empty() {
            tracing::debug!(client_id = %client_id, "client re-attached within grace window");
        }
    }

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let _ = out_tx
        .send(text_frame(SubscriberFrame::HandshakeAck {
            success: true,
            error: None,
        }))
        .await;
    let _ = out_tx
        .send(text_frame(SubscriberFrame::Welcome {
            client_id: client_id.clone(),
        }))
        .await;
    tracing::debug!(client_id = %client_id, "subscriber connected");

    // Phase 3: request loop.
    let mut normal_close = false;
    while let Some(result) = stream.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(client_id = %client_id, error = %e, "subscriber receive error");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                handle_request(&text, &client_id, &state, &out_tx).await;
            }
            Message::Close(_) => {
                normal_close = true;
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
            _ => {
                let _ = out_tx
                    .send(text_frame(SubscriberFrame::Error {
                        error: "binary frames are not supported".into(),
                    }))
                    .await;
            }
        }
    }

    // Phase 4: detach. Normal closes purge immediately; abnormal ones keep
    // the record for the reconnect grace window.
    {
        let mut clients = state.clients.lock().await;
        if normal_close {
            clients.remove(&client_id);
        } else if let Some(record) = clients.get_mut(&client_id) {
            record.sender = None;
            record.disconnected_at_ms = Some(now_millis());
        }
    }
    writer.abort();
    tracing::debug!(client_id = %client_id, normal_close, "subscriber disconnected");
}

/// Wait for a `HANDSHAKE` frame; anything else (timeout, close, garbage,
/// wrong frame) fails the handshake.
async fn await_handshake(
    stream: &mut futures_util::stream::SplitStream<WebSocket>,
    timeout: Duration,
) -> Option<String> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let message = tokio::time::timeout_at(deadline, stream.next())
            .await
            .ok()??
            .ok()?;
        match message {
            Message::Text(text) => {
                let envelope: WsEnvelope<SubscriberFrame> = serde_json::from_str(&text).ok()?;
                return match envelope.payload {
                    SubscriberFrame::Handshake { client_id } if !client_id.is_empty() => {
                        Some(client_id)
                    }
                    _ => None,
                };
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => return None,
        }
    }
}

/// Dispatch one client request frame.
async fn handle_request(
    text: &str,
    client_id: &str,
    state: &Arc<WsServerState>,
    out_tx: &mpsc::Sender<Message>,
) {
    let envelope: WsEnvelope<SubscriberFrame> = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            let _ = out_tx
                .send(text_frame(SubscriberFrame::Error {
                    error: format!("invalid frame: {e}"),
                }))
                .await;
            return;
        }
    };

    match envelope.payload {
        SubscriberFrame::Subscribe { filters } => {
            let reply = {
                let mut clients = state.clients.lock().await;
                let Some(record) = clients.get_mut(client_id) else {
                    return;
                };
                subscribe_reply(record, filters)
            };
            let _ = out_tx.send(text_frame(reply)).await;
        }
        SubscriberFrame::Unsubscribe { subscription_id } => {
            let removed = {
                let mut clients = state.clients.lock().await;
                clients
                    .get_mut(client_id)
                    .map(|record| record.subscriptions.unsubscribe(&subscription_id))
                    .unwrap_or(false)
            };
            let reply = if removed {
                SubscriberFrame::UnsubscribeAck
            } else {
                SubscriberFrame::Error {
                    error: format!("unknown subscription {subscription_id}"),
                }
            };
            let _ = out_tx.send(text_frame(reply)).await;
        }
        SubscriberFrame::Ping => {
            let _ = out_tx.send(text_frame(SubscriberFrame::Pong)).await;
        }
        SubscriberFrame::Handshake { .. } => {
            let _ = out_tx
                .send(text_frame(SubscriberFrame::Error {
                    error: "already handshaken".into(),
                }))
                .await;
        }
        other => {
            let _ = out_tx
                .send(text_frame(SubscriberFrame::Error {
                    error: format!("unexpected frame: {other:?}"),
                }))
                .await;
        }
    }
}

/// Validate and apply one subscribe request against a client record.
fn subscribe_reply(
    record: &mut ClientRecord,
    filters: Vec<push_messages::SubscribeFilter>,
) -> SubscriberFrame {
    if !record.limiter.allow(now_millis()) {
        return SubscriberFrame::SubscribeError {
            error: "subscribe requests too frequent".into(),
        };
    }
    if let Err(error) = validate_filters(&filters) {
        return SubscriberFrame::SubscribeError { error };
    }
    match record.subscriptions.subscribe(filters) {
        Ok(subscription) => SubscriberFrame::SubscribeAck {
            subscription_id: subscription.id.clone(),
            filters: subscription.filters.clone(),
        },
        Err(error) => SubscriberFrame::SubscribeError { error },
    }
}
