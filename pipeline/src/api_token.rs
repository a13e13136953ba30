//! Short-lived API tokens for transaction submission.
//!
//! The validator hands a random token to would-be submitters; a transaction
//! arriving with a token the node no longer recognizes (expired or never
//! issued) is rejected. The token's trailing bytes bind it to the issuing
//! validator's address so attestors can check the pairing without sharing
//! the issuer's active set.

use std::collections::HashMap;

use rand::RngCore;

use push_crypto::blake2b_256;
use push_types::NodeAddress;

/// Random prefix length of each token.
const NONCE_LEN: usize = 16;
/// Length of the validator-binding suffix.
const BINDING_LEN: usize = 16;

/// The validator-binding suffix for an address.
fn binding_suffix(validator: &NodeAddress) -> [u8; BINDING_LEN] {
    let digest = blake2b_256(validator.as_str().as_bytes());
    let mut suffix = [0u8; BINDING_LEN];
    suffix.copy_from_slice(&digest[..BINDING_LEN]);
    suffix
}

/// Check that a token claims to be issued by `validator`.
///
/// This is the half of validation available to attestors; only the issuing
/// node itself can additionally check liveness against its active set.
pub fn token_bound_to(token: &[u8], validator: &NodeAddress) -> bool {
    token.len() == NONCE_LEN + BINDING_LEN && token[NONCE_LEN..] == binding_suffix(validator)
}

/// Issues and validates this node's short-lived API tokens.
pub struct ApiTokenIssuer {
    validator: NodeAddress,
    ttl_ms: u64,
    /// token bytes -> issue timestamp (ms).
    active: HashMap<Vec<u8>, u64>,
}

impl ApiTokenIssuer {
    pub fn new(validator: NodeAddress, ttl_ms: u64) -> Self {
        Self {
            validator,
            ttl_ms,
            active: HashMap::new(),
        }
    }

    /// Issue a fresh token valid for the configured TTL.
    pub fn issue(&mut self, now_ms: u64) -> Vec<u8> {
        let mut token = vec![0u8; NONCE_LEN + BINDING_LEN];
        rand::thread_rng().fill_bytes(&mut token[..NONCE_LEN]);
        token[NONCE_LEN..].copy_from_slice(&binding_suffix(&self.validator));
        self.active.insert(token.clone(), now_ms);
        token
    }

    /// Whether the token was issued here and has not expired.
    pub fn validate(&self, token: &[u8], now_ms: u64) -> bool {
        match self.active.get(token) {
            Some(issued) => now_ms.saturating_sub(*issued) <= self.ttl_ms,
            None => false,
        }
    }

    /// Drop expired tokens. Called from the node's periodic sweep.
    pub fn purge_expired(&mut self, now_ms: u64) {
        let ttl = self.ttl_ms;
        self.active
            .retain(|_, issued| now_ms.saturating_sub(*issued) <= ttl);
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}
