//! Fundamental types for the Push validator node.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: hashes, keys, node addresses, transactions, blocks, attest
//! tokens, and the on-chain node registry records.

pub mod block;
mod digest;
pub mod error;
pub mod hash;
pub mod keys;
pub mod registry;
pub mod token;
pub mod tx;

pub use block::{Block, Signer};
pub use error::CodecError;
pub use hash::{BlockHash, TxHash};
pub use keys::{KeyPair, NodeAddress, PrivateKey, PublicKey, Signature};
pub use registry::{NodeInfo, NodeStatus, NodeType};
pub use token::{AttestToken, AttestorPatch};
pub use tx::{AttestorVote, Transaction, TransactionEnvelope, ValidatorVote, VoteVerdict};
