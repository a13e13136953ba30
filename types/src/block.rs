//! Blocks — batches of transaction envelopes co-signed by validator and attestors.

use serde::{Deserialize, Serialize};

use crate::digest::blake2b_256;
use crate::error::CodecError;
use crate::hash::BlockHash;
use crate::keys::Signature;
use crate::token::AttestToken;
use crate::tx::TransactionEnvelope;

/// One signature slot in a block.
///
/// Index 0 is always the validator's signature over the block without
/// attestor votes; subsequent entries are attestor patch signatures in the
/// order their patches were applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    pub sig: Signature,
}

/// A block of transaction envelopes plus the signature set collected during
/// the two attestation rounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub ts_millis: u64,
    pub attest_token: AttestToken,
    pub envelopes: Vec<TransactionEnvelope>,
    pub signers: Vec<Signer>,
}

impl Block {
    /// Serialize to the canonical binary wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("block is always bincode-serializable")
    }

    /// Deserialize from the canonical binary wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }

    /// Content hash of the block in its current state.
    ///
    /// Called on the validator-signed block this yields the *initial* hash;
    /// called after all patches are applied it yields the *final* hash.
    pub fn compute_hash(&self) -> BlockHash {
        BlockHash::new(blake2b_256(&self.to_bytes()))
    }

    /// The bytes the validator signs for signer slot 0: this block with all
    /// attestor votes stripped and an empty signer list.
    pub fn validator_signing_bytes(&self) -> Vec<u8> {
        let mut stripped = self.clone();
        for env in &mut stripped.envelopes {
            env.attestor_votes.clear();
        }
        stripped.signers.clear();
        stripped.to_bytes()
    }

    /// Total serialized size in bytes.
    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self).expect("block is always bincode-serializable") as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::NodeAddress;
    use crate::tx::{AttestorVote, Transaction, VoteVerdict};

    fn sample_tx(salt: u8) -> Transaction {
        Transaction {
            tx_type: 0,
            category: "CUSTOM:chat".to_string(),
            sender: "eip155:1:0xAA".to_string(),
            recipients: vec!["eip155:1:0xBB".to_string()],
            data: vec![4, 5, 6],
            salt: [salt; 32],
            api_token: vec![1],
            fee: 1,
            signature: vec![0xEE; 64],
        }
    }

    fn sample_block() -> Block {
        Block {
            ts_millis: 1_700_000_000_000,
            attest_token: AttestToken {
                nonce: [3u8; 32],
                attestors: vec![NodeAddress::new("push_a1")],
            },
            envelopes: vec![TransactionEnvelope::new(sample_tx(1))],
            signers: vec![Signer {
                sig: Signature([0xAB; 64]),
            }],
        }
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let block = sample_block();
        let bytes = block.to_bytes();
        let back = Block::from_bytes(&bytes).unwrap();
        assert_eq!(back, block);
        assert_eq!(back.to_bytes(), bytes);
        assert_eq!(back.compute_hash(), block.compute_hash());
    }

    #[test]
    fn signing_bytes_exclude_attestor_votes_and_signers() {
        let mut block = sample_block();
        let base = block.validator_signing_bytes();

        block.envelopes[0].attestor_votes.push(AttestorVote {
            voter: NodeAddress::new("push_a1"),
            verdict: VoteVerdict::Accept,
        });
        block.signers.push(Signer {
            sig: Signature([0x11; 64]),
        });

        // Votes and signers must not affect what the validator signed.
        assert_eq!(block.validator_signing_bytes(), base);
        // But they do change the full serialization (and therefore the hash).
        assert_ne!(block.to_bytes(), sample_block().to_bytes());
    }

    #[test]
    fn hash_changes_when_signers_change() {
        let block = sample_block();
        let initial = block.compute_hash();

        let mut patched = block.clone();
        patched.signers.push(Signer {
            sig: Signature([0x22; 64]),
        });
        assert_ne!(patched.compute_hash(), initial);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(Block::from_bytes(&[0xFF, 0x00, 0x01]).is_err());
    }
}
