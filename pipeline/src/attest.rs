//! Shared attestation mechanics — patch verification and application.
//!
//! The validator (collecting round-1 replies) and every attestor (replaying
//! the patch set in round 2) must derive byte-identical blocks, so the
//! mechanics live here and both roles call them.

use push_crypto::verify_signature;
use push_types::{
    AttestorPatch, AttestorVote, Block, BlockHash, NodeAddress, PublicKey, Signature,
};

use crate::error::BlockError;

/// The validator address a block claims, read off the envelope votes.
///
/// Every envelope must carry a validator vote from the same node; a block
/// violating that is malformed.
pub fn block_validator(block: &Block) -> Result<NodeAddress, BlockError> {
    let mut validator: Option<&NodeAddress> = None;
    for env in &block.envelopes {
        let vote = env
            .validator_vote
            .as_ref()
            .ok_or_else(|| BlockError::Malformed("envelope without validator vote".into()))?;
        match validator {
            None => validator = Some(&vote.voter),
            Some(prev) if prev == &vote.voter => {}
            Some(_) => {
                return Err(BlockError::Malformed(
                    "envelopes voted by different validators".into(),
                ));
            }
        }
    }
    validator
        .cloned()
        .ok_or_else(|| BlockError::Malformed("block has no envelopes".into()))
}

/// Verify signer slot 0 against the claimed validator's registered key.
pub fn verify_validator_signature(
    block: &Block,
    validator: &NodeAddress,
    public_key: &PublicKey,
) -> Result<(), BlockError> {
    let signer = block
        .signers
        .first()
        .ok_or_else(|| BlockError::Malformed("block has no signers".into()))?;
    if !verify_signature(&block.validator_signing_bytes(), &signer.sig, public_key) {
        return Err(BlockError::SignatureMismatch(validator.to_string()));
    }
    Ok(())
}

/// Verify a patch signature against the signer's registered key.
pub fn verify_patch_signature(
    patch: &AttestorPatch,
    initial_hash: &BlockHash,
    public_key: &PublicKey,
) -> Result<(), BlockError> {
    let message = AttestorPatch::signing_bytes(initial_hash, &patch.voter, &patch.votes);
    if !verify_signature(&message, &patch.sig, public_key) {
        return Err(BlockError::SignatureMismatch(patch.voter.to_string()));
    }
    Ok(())
}

/// Apply one patch: append the attestor's vote to every envelope and push
/// the patch signature onto the signer list.
///
/// Patches must be applied in the same order everywhere or the final hash
/// diverges.
pub fn apply_patch(block: &mut Block, patch: &AttestorPatch) -> Result<(), BlockError> {
    if patch.votes.len() != block.envelopes.len() {
        return Err(BlockError::Malformed(format!(
            "patch from {} has {} votes for {} envelopes",
            patch.voter,
            patch.votes.len(),
            block.envelopes.len()
        )));
    }
    for (env, verdict) in block.envelopes.iter_mut().zip(&patch.votes) {
        env.attestor_votes.push(AttestorVote {
            voter: patch.voter.clone(),
            verdict: *verdict,
        });
    }
    block.signers.push(push_types::Signer {
        sig: Signature(patch.sig.0),
    });
    Ok(())
}

/// The validator's final self-check before publication.
///
/// Recomputes the finalized hash and confirms the signer and vote counts
/// match the attestor set; any mismatch is fatal to the cycle.
pub fn self_validate(
    block: &Block,
    expected_final: &BlockHash,
    attestor_count: usize,
) -> Result<(), BlockError> {
    let computed = block.compute_hash();
    if &computed != expected_final {
        return Err(BlockError::HashMismatch {
            expected: expected_final.to_string(),
            computed: computed.to_string(),
        });
    }
    let expected_signers = 1 + attestor_count;
    if block.signers.len() != expected_signers {
        return Err(BlockError::Malformed(format!(
            "expected {expected_signers} signers, found {}",
            block.signers.len()
        )));
    }
    for env in &block.envelopes {
        if env.attestor_votes.len() != attestor_count {
            return Err(BlockError::Malformed(format!(
                "envelope has {} attestor votes, expected {attestor_count}",
                env.attestor_votes.len()
            )));
        }
    }
    Ok(())
}
