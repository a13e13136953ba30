//! Typed JSON-RPC client over HTTP.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use push_messages::{
    AccountInfo, AttestSignaturesRequest, HashCheckReply, PutBlockHashRequest, PutBlockResult,
    TransactionsPage,
};
use push_types::AttestorPatch;

use crate::error::RpcError;

/// Default per-call timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct JsonRpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<JsonRpcError>,
}

/// JSON-RPC client for peer node calls.
///
/// Wraps a pooled `reqwest::Client`; one instance is shared by every
/// subsystem that talks to peers.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    request_id: std::sync::Arc<AtomicU64>,
}

impl RpcClient {
    /// Create a client with the default timeouts.
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom per-call timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            request_id: std::sync::Arc::new(AtomicU64::new(1)),
        }
    }

    /// Issue one JSON-RPC call against a peer's base URL.
    async fn call<P: Serialize, R: DeserializeOwned>(
        &self,
        base_url: &str,
        method: &str,
        params: P,
    ) -> Result<R, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .http
            .post(base_url.trim_end_matches('/'))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(e.to_string())
                } else if e.is_connect() {
                    RpcError::Connect(e.to_string())
                } else {
                    RpcError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::HttpStatus(status.as_u16()));
        }

        let body: JsonRpcResponse<R> = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(err) = body.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| RpcError::Decode("reply carries neither result nor error".into()))
    }

    /// `push_sendTransaction([txBase16]) → txHashBase16`
    pub async fn send_transaction(
        &self,
        base_url: &str,
        tx_bytes: &[u8],
    ) -> Result<String, RpcError> {
        self.call(base_url, "push_sendTransaction", [hex::encode(tx_bytes)])
            .await
    }

    /// `v_attestBlock([blockBase16]) → attestResultBase16`
    ///
    /// The reply is the attestor's patch, base16-bincode-encoded.
    pub async fn attest_block(
        &self,
        base_url: &str,
        block_bytes: &[u8],
    ) -> Result<AttestorPatch, RpcError> {
        let reply: String = self
            .call(base_url, "v_attestBlock", [hex::encode(block_bytes)])
            .await?;
        decode_hex_bincode(&reply)
    }

    /// `v_attestSignatures([attestSigReqBase16]) → attestSigRespBase16`
    pub async fn attest_signatures(
        &self,
        base_url: &str,
        request: &AttestSignaturesRequest,
    ) -> Result<(), RpcError> {
        let encoded = hex::encode(
            bincode::serialize(request).map_err(|e| RpcError::Decode(e.to_string()))?,
        );
        // The reply payload is an opaque ack; only transport/RPC-level
        // failures matter to the caller.
        let _ack: String = self
            .call(base_url, "v_attestSignatures", [encoded])
            .await?;
        Ok(())
    }

    /// `push_putBlockHash({hashes:[hashHex]}) → ["SEND"|"DO_NOT_SEND", …]`
    pub async fn put_block_hash(
        &self,
        base_url: &str,
        hashes: Vec<String>,
    ) -> Result<Vec<HashCheckReply>, RpcError> {
        self.call(
            base_url,
            "push_putBlockHash",
            PutBlockHashRequest { hashes },
        )
        .await
    }

    /// `push_putBlock({blocks:[blockHex]}) → [{status, reason?}, …]`
    pub async fn put_block(
        &self,
        base_url: &str,
        blocks_hex: Vec<String>,
    ) -> Result<Vec<PutBlockResult>, RpcError> {
        #[derive(Serialize)]
        struct Params {
            blocks: Vec<String>,
        }
        self.call(base_url, "push_putBlock", Params { blocks: blocks_hex })
            .await
    }

    /// `push_accountInfo([caipOrDid]) → keyInfo`
    pub async fn account_info(
        &self,
        base_url: &str,
        caip_or_did: &str,
    ) -> Result<Option<AccountInfo>, RpcError> {
        self.call(base_url, "push_accountInfo", [caip_or_did]).await
    }

    /// `push_getTransactions([caip, category, ts, sortOrder]) → {items:[...]}`
    pub async fn get_transactions(
        &self,
        base_url: &str,
        caip: &str,
        category: &str,
        ts_millis: u64,
        sort_order: &str,
    ) -> Result<TransactionsPage, RpcError> {
        let params = serde_json::json!([caip, category, ts_millis, sort_order]);
        self.call(base_url, "push_getTransactions", params).await
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a base16-wrapped bincode payload.
fn decode_hex_bincode<T: DeserializeOwned>(payload: &str) -> Result<T, RpcError> {
    let bytes = hex::decode(payload).map_err(|e| RpcError::Hex(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| RpcError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use push_types::{NodeAddress, Signature, VoteVerdict};

    #[test]
    fn hex_bincode_round_trip() {
        let patch = AttestorPatch {
            voter: NodeAddress::new("push_a1"),
            votes: vec![VoteVerdict::Accept, VoteVerdict::Reject],
            sig: Signature([9u8; 64]),
        };
        let encoded = hex::encode(bincode::serialize(&patch).unwrap());
        let back: AttestorPatch = decode_hex_bincode(&encoded).unwrap();
        assert_eq!(back, patch);
    }

    #[test]
    fn decode_rejects_bad_hex() {
        let result: Result<AttestorPatch, _> = decode_hex_bincode("zz");
        assert!(matches!(result, Err(RpcError::Hex(_))));
    }

    #[test]
    fn decode_rejects_bad_bincode() {
        let result: Result<AttestorPatch, _> = decode_hex_bincode("00");
        assert!(matches!(result, Err(RpcError::Decode(_))));
    }

    #[test]
    fn request_envelope_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method: "push_putBlockHash",
            params: PutBlockHashRequest {
                hashes: vec!["aa".into()],
            },
            id: 3,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["method"], "push_putBlockHash");
        assert_eq!(json["params"]["hashes"][0], "aa");
        assert_eq!(json["id"], 3);
    }
}
