//! Archival-client auth and feed flow against a mock archival node.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;

use push_crypto::{derive_address, keypair_from_seed, verify_signature};
use push_directory::NodeRegistry;
use push_discovery::{DiscoveryConfig, DiscoveryService, HealthProbe};
use push_messages::{ArchivalFrame, BlockUpdate, WsEnvelope, EVENT_BLOCK};
use push_types::{NodeAddress, PrivateKey, PublicKey, Signature};
use push_websocket::{ArchivalClient, WsClientConfig};

/// Probe stub: the tests drive connections directly, discovery is only
/// consulted for substitution (which these tests never reach).
struct NeverProbe;

impl HealthProbe for NeverProbe {
    async fn check(&self, _url: &str) -> bool {
        false
    }
}

fn discovery() -> Arc<DiscoveryService<NeverProbe>> {
    Arc::new(DiscoveryService::new(
        DiscoveryConfig::default(),
        Arc::new(RwLock::new(NodeRegistry::new())),
        NeverProbe,
    ))
}

fn client_config() -> WsClientConfig {
    WsClientConfig {
        heartbeat_interval: Duration::from_millis(100),
        connection_timeout: Duration::from_secs(5),
        reconnect_base_delay: Duration::from_millis(10),
        reconnect_max_delay: Duration::from_millis(50),
        max_reconnect_attempts: 2,
        close_timeout: Duration::from_millis(500),
    }
}

/// Mock archival node: challenge, verify, accept, then push `blocks` frames.
async fn spawn_mock_archival(
    expected_key: PublicKey,
    blocks: Vec<BlockUpdate>,
) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

        let nonce_bytes = [0x5A_u8; 32];
        let challenge = WsEnvelope::new(
            ArchivalFrame::AuthChallenge {
                nonce: hex::encode(nonce_bytes),
            },
            1,
        );
        socket
            .send(Message::Text(serde_json::to_string(&challenge).unwrap()))
            .await
            .unwrap();

        // Expect a correctly signed AUTH_RESPONSE.
        let text = match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        };
        let envelope: WsEnvelope<ArchivalFrame> = serde_json::from_str(&text).unwrap();
        let WsEnvelope {
            payload: ArchivalFrame::AuthResponse { signature, .. },
            ..
        } = envelope
        else {
            panic!("expected AUTH_RESPONSE");
        };
        let sig_bytes: [u8; 64] = hex::decode(&signature).unwrap().try_into().unwrap();
        assert!(verify_signature(
            &nonce_bytes,
            &Signature(sig_bytes),
            &expected_key
        ));

        let success = WsEnvelope::new(ArchivalFrame::AuthSuccess, 2);
        socket
            .send(Message::Text(serde_json::to_string(&success).unwrap()))
            .await
            .unwrap();

        // Expect the BLOCK subscription.
        let text = match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => text,
            other => panic!("expected text, got {other:?}"),
        };
        let envelope: WsEnvelope<ArchivalFrame> = serde_json::from_str(&text).unwrap();
        match envelope.payload {
            ArchivalFrame::Subscribe { events } => {
                assert_eq!(events, vec![EVENT_BLOCK.to_string()]);
            }
            other => panic!("expected SUBSCRIBE, got {other:?}"),
        }

        // Push the confirmations, then idle until the client hangs up.
        for block in blocks {
            let frame = WsEnvelope::new(ArchivalFrame::Block { block }, 3);
            socket
                .send(Message::Text(serde_json::to_string(&frame).unwrap()))
                .await
                .unwrap();
        }
        while let Some(Ok(message)) = socket.next().await {
            if let Message::Ping(payload) = message {
                let _ = socket.send(Message::Pong(payload)).await;
            }
        }
    });

    addr
}

#[tokio::test]
async fn authenticates_subscribes_and_forwards_confirmations() {
    let kp = keypair_from_seed(&[42u8; 32]);
    let address = derive_address(&kp.public);
    let node = NodeAddress::new("push_arch1");

    let update = BlockUpdate {
        block_hash: "ab".repeat(32),
        txs: vec![],
    };
    let addr = spawn_mock_archival(kp.public.clone(), vec![update.clone()]).await;

    let (blocks_tx, mut blocks_rx) = mpsc::channel(8);
    let client = ArchivalClient::new(
        client_config(),
        address,
        PrivateKey(kp.private.0),
        discovery(),
        blocks_tx,
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let shutdown_rx = shutdown_tx.subscribe();
    let url = format!("http://{addr}");
    let run = tokio::spawn(async move { client.run(node.clone(), url, shutdown_rx).await });

    let (from_node, received) =
        tokio::time::timeout(Duration::from_secs(5), blocks_rx.recv())
            .await
            .expect("timed out waiting for confirmation")
            .expect("channel closed");
    assert_eq!(from_node, NodeAddress::new("push_arch1"));
    assert_eq!(received, update);

    // Clean shutdown: the run loop must return.
    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("client did not shut down")
        .unwrap();
}

#[tokio::test]
async fn gives_up_when_no_nodes_are_reachable() {
    let kp = keypair_from_seed(&[7u8; 32]);
    let address = derive_address(&kp.public);

    let (blocks_tx, _blocks_rx) = mpsc::channel(8);
    let client = ArchivalClient::new(
        client_config(),
        address,
        PrivateKey(kp.private.0),
        discovery(), // empty pool: no substitutes available
        blocks_tx,
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let shutdown_rx = shutdown_tx.subscribe();

    // Nothing listens on this port; after the attempt budget the client
    // finds no substitute and returns.
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.run(
            NodeAddress::new("push_arch_dead"),
            "http://127.0.0.1:9".into(),
            shutdown_rx,
        ),
    )
    .await;
    assert!(result.is_ok(), "client kept retrying forever");
}
