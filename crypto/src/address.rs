//! Node address derivation from public keys.
//!
//! Address format: `push_` + base16(first 20 bytes of Blake2b-256(public_key)).
//! Total length: 5 (prefix) + 40 hex characters = 45 characters.

use push_types::{NodeAddress, PublicKey};

use crate::hash::blake2b_256;

/// Prefix for all node addresses.
const PREFIX: &str = "push_";
/// Number of digest bytes kept in the address.
const ADDRESS_BYTES: usize = 20;

/// Derive the registry address for a public key.
pub fn derive_address(public_key: &PublicKey) -> NodeAddress {
    let digest = blake2b_256(public_key.as_bytes());
    NodeAddress::new(&format!("{PREFIX}{}", hex::encode(&digest[..ADDRESS_BYTES])))
}

/// Check that an address string is structurally valid (prefix + 40 hex chars).
pub fn is_valid_address(s: &str) -> bool {
    match s.strip_prefix(PREFIX) {
        Some(rest) => {
            rest.len() == ADDRESS_BYTES * 2 && rest.bytes().all(|b| b.is_ascii_hexdigit())
        }
        None => false,
    }
}
