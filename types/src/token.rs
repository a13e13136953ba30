//! Attest tokens and attestor patches.

use serde::{Deserialize, Serialize};

use crate::hash::BlockHash;
use crate::keys::{NodeAddress, Signature};
use crate::tx::VoteVerdict;

/// Short-lived token naming the attestor set authorized to co-sign one block.
///
/// The validator draws a fresh token per batch cycle: a random nonce plus the
/// sampled attestor addresses. Membership checks are list containment, so no
/// side channel is needed to interpret the token on the attestor side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestToken {
    pub nonce: [u8; 32],
    pub attestors: Vec<NodeAddress>,
}

impl AttestToken {
    /// Whether `address` is one of the attestors this token authorizes.
    pub fn authorizes(&self, address: &NodeAddress) -> bool {
        self.attestors.contains(address)
    }
}

/// An attestor's round-1 contribution: one verdict per envelope (in block
/// order) plus a signature binding the verdicts to the block's initial hash.
///
/// Only votes and the signature travel back to the validator — never the
/// full block — to keep round-1 replies small.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestorPatch {
    pub voter: NodeAddress,
    pub votes: Vec<VoteVerdict>,
    pub sig: Signature,
}

impl AttestorPatch {
    /// The bytes an attestor signs: initial block hash, voter identity, and
    /// the serialized verdict list. Both sides must derive this identically.
    pub fn signing_bytes(initial_hash: &BlockHash, voter: &NodeAddress, votes: &[VoteVerdict]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(64 + votes.len());
        bytes.extend_from_slice(initial_hash.as_bytes());
        bytes.extend_from_slice(voter.as_str().as_bytes());
        bytes.extend_from_slice(
            &bincode::serialize(votes).expect("verdict list is always bincode-serializable"),
        );
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_membership() {
        let token = AttestToken {
            nonce: [7u8; 32],
            attestors: vec![
                NodeAddress::new("push_a1"),
                NodeAddress::new("push_a2"),
            ],
        };
        assert!(token.authorizes(&NodeAddress::new("push_a1")));
        assert!(!token.authorizes(&NodeAddress::new("push_a3")));
    }

    #[test]
    fn signing_bytes_change_with_any_input() {
        let hash = BlockHash::new([1u8; 32]);
        let voter = NodeAddress::new("push_a1");
        let votes = vec![VoteVerdict::Accept, VoteVerdict::Reject];

        let base = AttestorPatch::signing_bytes(&hash, &voter, &votes);
        assert_ne!(
            base,
            AttestorPatch::signing_bytes(&BlockHash::new([2u8; 32]), &voter, &votes)
        );
        assert_ne!(
            base,
            AttestorPatch::signing_bytes(&hash, &NodeAddress::new("push_a2"), &votes)
        );
        assert_ne!(
            base,
            AttestorPatch::signing_bytes(&hash, &voter, &[VoteVerdict::Accept])
        );
    }
}
