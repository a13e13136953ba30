//! Payload structs for the JSON-RPC methods exchanged between nodes.

use serde::{Deserialize, Serialize};

use push_types::{AttestorPatch, BlockHash};

/// Body of `v_attestSignatures`, shipped base16-bincode-encoded as the
/// single call parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttestSignaturesRequest {
    /// Hash of the validator-signed block (no attestor votes) the attestor
    /// cached during round 1.
    pub initial_hash: BlockHash,
    /// Hash the fully patched block must reproduce.
    pub final_hash: BlockHash,
    /// Every round-1 patch, in the order the validator applied them.
    pub patches: Vec<AttestorPatch>,
}

/// Params for `push_putBlockHash`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PutBlockHashRequest {
    /// Hex-encoded block hashes to offer.
    pub hashes: Vec<String>,
}

/// Per-hash reply to `push_putBlockHash`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashCheckReply {
    /// The node wants the block — follow up with `push_putBlock`.
    #[serde(rename = "SEND")]
    Send,
    /// The node already has the block (or refuses it) — do not send.
    #[serde(rename = "DO_NOT_SEND")]
    DoNotSend,
}

/// Per-block status inside a `push_putBlock` reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PutBlockStatus {
    Accepted,
    Rejected,
}

/// One entry of a `push_putBlock` reply.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PutBlockResult {
    pub status: PutBlockStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Key info returned by `push_accountInfo`, merged across replicas by the
/// quorum reply merger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub did: String,
    pub master_public_key: String,
    pub derived_public_key: String,
    /// CAIP address the keys are attached to.
    pub address: String,
    /// Millisecond timestamp of the attaching transaction.
    pub attach_ts: u64,
}

/// One item of a `push_getTransactions` reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub tx_hash: String,
    pub category: String,
    pub sender: String,
    pub recipients: Vec<String>,
    /// Hex-encoded payload bytes.
    pub data: String,
    pub ts: u64,
}

/// Result of `push_getTransactions`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransactionsPage {
    pub items: Vec<TransactionItem>,
}
