//! Cryptographic primitives for the Push validator node.
//!
//! Ed25519 for node identity and block signing, Blake2b-256 for content
//! hashing, and node address derivation from public keys.

pub mod address;
pub mod hash;
pub mod keys;
pub mod sign;

pub use address::{derive_address, is_valid_address};
pub use hash::{blake2b_256, blake2b_256_multi, hash_block, hash_transaction};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
