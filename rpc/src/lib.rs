//! JSON-RPC client for node-to-node calls.
//!
//! Every peer interaction — transaction forwarding, the two attestation
//! rounds, block delivery, quorum reads — goes through [`RpcClient`]
//! against the target node's base URL.

pub mod client;
pub mod error;
pub mod retry;

pub use client::RpcClient;
pub use error::{outcome_code, RpcError};
pub use retry::{retry_with_fixed_delay, RetryPolicy};
