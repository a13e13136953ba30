//! Transactions and the envelopes that carry them through attestation.

use serde::{Deserialize, Serialize};

use crate::digest::blake2b_256;
use crate::hash::TxHash;
use crate::keys::NodeAddress;

/// An immutable signed transaction submitted by an external sender.
///
/// Identity is the Blake2b-256 hash of the bincode serialization; the
/// transaction is validated once on submission and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction type discriminator. 0 = regular payload transaction.
    pub tx_type: u8,
    /// Free-form category tag, e.g. `"INIT_DID"` or `"CUSTOM:notifications"`.
    /// Subscription filters match on this value.
    pub category: String,
    /// CAIP address of the sender (`namespace:chainId:address`).
    pub sender: String,
    /// CAIP addresses of the recipients. Drives shard resolution.
    pub recipients: Vec<String>,
    /// Opaque application payload.
    pub data: Vec<u8>,
    /// Random salt so otherwise-identical submissions hash differently.
    pub salt: [u8; 32],
    /// Short-lived per-node API token presented by the submitter.
    pub api_token: Vec<u8>,
    /// Fee in the smallest network unit.
    pub fee: u64,
    /// Sender signature over the transaction body.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Serialize to the canonical binary form.
    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("transaction is always bincode-serializable")
    }

    /// Content hash of the canonical serialization — the transaction's identity.
    pub fn compute_hash(&self) -> TxHash {
        TxHash::new(blake2b_256(&self.to_bytes()))
    }

    /// Serialized size in bytes, used for the pending-block byte watermark.
    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self).expect("transaction is always bincode-serializable")
            as usize
    }
}

/// Accept/reject verdict on a single transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoteVerdict {
    Accept,
    Reject,
}

/// The block validator's vote on a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorVote {
    pub voter: NodeAddress,
    pub verdict: VoteVerdict,
    /// Optional DID mapping established by this transaction (INIT_DID flow).
    pub did_mapping: Option<String>,
}

/// A single attestor's vote on a transaction, appended during round 1.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestorVote {
    pub voter: NodeAddress,
    pub verdict: VoteVerdict,
}

/// Wraps a transaction with the votes accumulated during one block cycle.
///
/// The envelope grows monotonically: the validator vote is set when the
/// transaction enters the pending block, and one attestor vote is appended
/// per attesting node as round-1 patches are applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEnvelope {
    pub transaction: Transaction,
    pub validator_vote: Option<ValidatorVote>,
    pub attestor_votes: Vec<AttestorVote>,
}

impl TransactionEnvelope {
    pub fn new(transaction: Transaction) -> Self {
        Self {
            transaction,
            validator_vote: None,
            attestor_votes: Vec::new(),
        }
    }

    /// Serialized size in bytes (transaction plus votes collected so far).
    pub fn serialized_size(&self) -> usize {
        bincode::serialized_size(self).expect("envelope is always bincode-serializable") as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx(salt: u8) -> Transaction {
        Transaction {
            tx_type: 0,
            category: "CUSTOM:test".to_string(),
            sender: "eip155:1:0xAA".to_string(),
            recipients: vec!["eip155:1:0xBB".to_string()],
            data: vec![1, 2, 3],
            salt: [salt; 32],
            api_token: vec![9, 9],
            fee: 0,
            signature: vec![0xCC; 64],
        }
    }

    #[test]
    fn hash_is_deterministic() {
        let tx = sample_tx(1);
        assert_eq!(tx.compute_hash(), tx.compute_hash());
    }

    #[test]
    fn different_salt_different_hash() {
        assert_ne!(sample_tx(1).compute_hash(), sample_tx(2).compute_hash());
    }

    #[test]
    fn round_trip_preserves_hash() {
        let tx = sample_tx(7);
        let bytes = tx.to_bytes();
        let back: Transaction = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, tx);
        assert_eq!(back.compute_hash(), tx.compute_hash());
    }

    #[test]
    fn envelope_size_grows_with_votes() {
        let mut env = TransactionEnvelope::new(sample_tx(1));
        let before = env.serialized_size();
        env.attestor_votes.push(AttestorVote {
            voter: NodeAddress::new("push_attestor1"),
            verdict: VoteVerdict::Accept,
        });
        assert!(env.serialized_size() > before);
    }
}
