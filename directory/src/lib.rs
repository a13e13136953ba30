//! Shard/node directory — contract-derived lookup tables.
//!
//! The registry contracts are read elsewhere; this crate holds the parsed
//! snapshots (node records and per-node shard bitmasks) and answers the
//! lookups the pipeline needs. Both tables are replaced wholesale on every
//! registry change event — never patched incrementally — so readers can
//! never observe a half-updated map.

pub mod error;
pub mod registry;
pub mod shards;

pub use error::DirectoryError;
pub use registry::NodeRegistry;
pub use shards::{shard_for_address, ShardMap};
