//! Subscription-server protocol flow over real loopback sockets.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use push_messages::{BlockUpdate, SubscribeFilter, SubscriberFrame, TxUpdate, WsEnvelope};
use push_websocket::{WsServer, WsServerConfig, WsServerState};

type ClientSocket = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn start_server(config: WsServerConfig) -> (Arc<WsServerState>, String) {
    let state = Arc::new(WsServerState::new(config));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let serve_state = state.clone();
    tokio::spawn(async move {
        WsServer::serve(listener, serve_state).await.unwrap();
    });
    (state, format!("ws://{addr}/ws"))
}

async fn connect(url: &str) -> ClientSocket {
    let (socket, _) = connect_async(url).await.unwrap();
    socket
}

async fn send(socket: &mut ClientSocket, frame: SubscriberFrame) {
    let text = serde_json::to_string(&WsEnvelope::new(frame, 0)).unwrap();
    socket.send(Message::Text(text)).await.unwrap();
}

async fn recv(socket: &mut ClientSocket) -> SubscriberFrame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .unwrap();
        match message {
            Message::Text(text) => {
                let envelope: WsEnvelope<SubscriberFrame> =
                    serde_json::from_str(&text).unwrap();
                return envelope.payload;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

async fn handshaken_client(url: &str, client_id: &str) -> ClientSocket {
    let mut socket = connect(url).await;
    send(
        &mut socket,
        SubscriberFrame::Handshake {
            client_id: client_id.into(),
        },
    )
    .await;
    assert!(matches!(
        recv(&mut socket).await,
        SubscriberFrame::HandshakeAck { success: true, .. }
    ));
    assert!(matches!(recv(&mut socket).await, SubscriberFrame::Welcome { .. }));
    socket
}

fn fast_config() -> WsServerConfig {
    WsServerConfig {
        handshake_timeout: Duration::from_millis(200),
        subscribe_min_interval: Duration::from_millis(0),
        reconnect_grace: Duration::from_secs(60),
    }
}

#[tokio::test]
async fn silent_client_closed_with_policy_violation() {
    let (_state, url) = start_server(fast_config()).await;
    let mut socket = connect(&url).await;

    // Send nothing; the server must close with 1008 after the timeout.
    let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("expected close before timeout")
        .expect("stream ended")
        .unwrap();
    match message {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn subscribe_and_unsubscribe_flow() {
    let (_state, url) = start_server(fast_config()).await;
    let mut socket = handshaken_client(&url, "client-1").await;

    send(
        &mut socket,
        SubscriberFrame::Subscribe {
            filters: vec![SubscribeFilter::Category("CUSTOM:chat".into())],
        },
    )
    .await;
    let subscription_id = match recv(&mut socket).await {
        SubscriberFrame::SubscribeAck {
            subscription_id,
            filters,
        } => {
            assert_eq!(filters.len(), 1);
            subscription_id
        }
        other => panic!("expected SUBSCRIBE_ACK, got {other:?}"),
    };

    send(&mut socket, SubscriberFrame::Unsubscribe { subscription_id }).await;
    assert!(matches!(
        recv(&mut socket).await,
        SubscriberFrame::UnsubscribeAck
    ));

    // Unknown id yields an error frame, not a crash.
    send(
        &mut socket,
        SubscriberFrame::Unsubscribe {
            subscription_id: "sub-999".into(),
        },
    )
    .await;
    assert!(matches!(recv(&mut socket).await, SubscriberFrame::Error { .. }));
}

#[tokio::test]
async fn wildcard_mixed_with_other_filters_rejected() {
    let (_state, url) = start_server(fast_config()).await;
    let mut socket = handshaken_client(&url, "client-1").await;

    send(
        &mut socket,
        SubscriberFrame::Subscribe {
            filters: vec![
                SubscribeFilter::Wildcard,
                SubscribeFilter::From("eip155:1:0xAA".into()),
            ],
        },
    )
    .await;
    assert!(matches!(
        recv(&mut socket).await,
        SubscriberFrame::SubscribeError { .. }
    ));
}

#[tokio::test]
async fn rapid_subscribes_rate_limited() {
    let config = WsServerConfig {
        subscribe_min_interval: Duration::from_secs(60),
        ..fast_config()
    };
    let (_state, url) = start_server(config).await;
    let mut socket = handshaken_client(&url, "client-1").await;

    send(
        &mut socket,
        SubscriberFrame::Subscribe {
            filters: vec![SubscribeFilter::Category("A".into())],
        },
    )
    .await;
    assert!(matches!(
        recv(&mut socket).await,
        SubscriberFrame::SubscribeAck { .. }
    ));

    send(
        &mut socket,
        SubscriberFrame::Subscribe {
            filters: vec![SubscribeFilter::Category("B".into())],
        },
    )
    .await;
    assert!(matches!(
        recv(&mut socket).await,
        SubscriberFrame::SubscribeError { .. }
    ));
}

#[tokio::test]
async fn broadcast_delivers_only_matching_transactions() {
    let (state, url) = start_server(fast_config()).await;
    let mut socket = handshaken_client(&url, "client-1").await;

    send(
        &mut socket,
        SubscriberFrame::Subscribe {
            filters: vec![
                SubscribeFilter::Category("CUSTOM:chat".into()),
                SubscribeFilter::From("eip155:1:0xFF".into()),
            ],
        },
    )
    .await;
    assert!(matches!(
        recv(&mut socket).await,
        SubscriberFrame::SubscribeAck { .. }
    ));

    let update = BlockUpdate {
        block_hash: "ab".repeat(32),
        txs: vec![
            TxUpdate {
                tx_hash: "01".repeat(32),
                category: "CUSTOM:chat".into(),
                sender: "eip155:1:0xAA".into(),
                recipients: vec!["eip155:1:0xBB".into()],
                data: String::new(),
            },
            TxUpdate {
                tx_hash: "02".repeat(32),
                category: "CUSTOM:other".into(),
                sender: "eip155:1:0xCC".into(),
                recipients: vec!["eip155:1:0xDD".into()],
                data: String::new(),
            },
        ],
    };
    state.broadcast_block_update(&update).await;

    match recv(&mut socket).await {
        SubscriberFrame::Block {
            block,
            matched_filter,
            ..
        } => {
            assert_eq!(block.txs.len(), 1);
            assert_eq!(block.txs[0].category, "CUSTOM:chat");
            // Only the filter that matched comes back.
            assert_eq!(
                matched_filter,
                vec![SubscribeFilter::Category("CUSTOM:chat".into())]
            );
        }
        other => panic!("expected BLOCK, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_answered_with_pong() {
    let (_state, url) = start_server(fast_config()).await;
    let mut socket = handshaken_client(&url, "client-1").await;

    send(&mut socket, SubscriberFrame::Ping).await;
    assert!(matches!(recv(&mut socket).await, SubscriberFrame::Pong));
}

#[tokio::test]
async fn abnormal_disconnect_keeps_subscriptions_within_grace() {
    let (state, url) = start_server(fast_config()).await;
    let mut socket = handshaken_client(&url, "client-1").await;

    send(
        &mut socket,
        SubscriberFrame::Subscribe {
            filters: vec![SubscribeFilter::Wildcard],
        },
    )
    .await;
    assert!(matches!(
        recv(&mut socket).await,
        SubscriberFrame::SubscribeAck { .. }
    ));

    // Drop the socket without a close frame (abnormal).
    drop(socket);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(state.connected_count().await, 0);

    // Reconnect within the grace window: the subscription is still live.
    let mut socket = handshaken_client(&url, "client-1").await;
    let update = BlockUpdate {
        block_hash: "ee".repeat(32),
        txs: vec![TxUpdate {
            tx_hash: "03".repeat(32),
            category: "ANY".into(),
            sender: "eip155:1:0x01".into(),
            recipients: vec!["eip155:1:0x02".into()],
            data: String::new(),
        }],
    };
    state.broadcast_block_update(&update).await;
    assert!(matches!(recv(&mut socket).await, SubscriberFrame::Block { .. }));
}
