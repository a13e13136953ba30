//! Wire message types for Push node communication.
//!
//! Two WebSocket protocols (the downstream subscription feed and the
//! validator↔archival block feed) plus the JSON payload structs carried by
//! the JSON-RPC methods. All frames are JSON text of the shape
//! `{type, data?, timestamp}`.

pub mod rpc;
pub mod ws;

pub use rpc::{
    AccountInfo, AttestSignaturesRequest, HashCheckReply, PutBlockHashRequest, PutBlockResult,
    PutBlockStatus, TransactionItem, TransactionsPage,
};
pub use ws::{
    ws_endpoint, ArchivalFrame, BlockUpdate, SubscribeFilter, SubscriberFrame, TxUpdate,
    WsEnvelope, EVENT_BLOCK,
};
