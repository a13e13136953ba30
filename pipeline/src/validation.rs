//! Structural transaction validation.

use push_types::Transaction;

use crate::error::TransactionError;

/// Upper bound on recipients per transaction.
const MAX_RECIPIENTS: usize = 32;
/// Expected sender-signature length (Ed25519).
const SIGNATURE_LEN: usize = 64;

/// Validate everything about a transaction that needs no node-local state.
///
/// Used by the validator on submission and by attestors when voting; both
/// sides must agree on what "well-formed" means.
pub fn validate_structure(tx: &Transaction, max_bytes: usize) -> Result<(), TransactionError> {
    let size = tx.serialized_size();
    if size > max_bytes {
        return Err(TransactionError::TooLarge {
            size,
            max: max_bytes,
        });
    }
    if tx.category.is_empty() {
        return Err(TransactionError::Malformed("empty category".into()));
    }
    if tx.sender.is_empty() {
        return Err(TransactionError::Malformed("empty sender".into()));
    }
    if !is_caip_address(&tx.sender) {
        return Err(TransactionError::Malformed(format!(
            "sender is not a CAIP address: {}",
            tx.sender
        )));
    }
    if tx.recipients.is_empty() {
        return Err(TransactionError::Malformed("no recipients".into()));
    }
    if tx.recipients.len() > MAX_RECIPIENTS {
        return Err(TransactionError::Malformed(format!(
            "too many recipients ({})",
            tx.recipients.len()
        )));
    }
    for recipient in &tx.recipients {
        if !is_caip_address(recipient) {
            return Err(TransactionError::Malformed(format!(
                "recipient is not a CAIP address: {recipient}"
            )));
        }
    }
    if tx.signature.len() != SIGNATURE_LEN {
        return Err(TransactionError::Malformed(format!(
            "signature must be {SIGNATURE_LEN} bytes, got {}",
            tx.signature.len()
        )));
    }
    Ok(())
}

/// Loose CAIP shape check: `namespace:chainId:address`, all parts non-empty.
fn is_caip_address(s: &str) -> bool {
    let mut parts = s.splitn(3, ':');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(ns), Some(chain), Some(addr))
            if !ns.is_empty() && !chain.is_empty() && !addr.is_empty()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_tx() -> Transaction {
        Transaction {
            tx_type: 0,
            category: "CUSTOM:chat".into(),
            sender: "eip155:1:0xAA".into(),
            recipients: vec!["eip155:1:0xBB".into(), "solana:mainnet:abc".into()],
            data: vec![1, 2, 3],
            salt: [7; 32],
            api_token: vec![0; 32],
            fee: 0,
            signature: vec![0xEE; 64],
        }
    }

    #[test]
    fn valid_transaction_passes() {
        assert!(validate_structure(&valid_tx(), 1 << 16).is_ok());
    }

    #[test]
    fn oversized_rejected() {
        let mut tx = valid_tx();
        tx.data = vec![0u8; 1 << 16];
        assert!(matches!(
            validate_structure(&tx, 1 << 10),
            Err(TransactionError::TooLarge { .. })
        ));
    }

    #[test]
    fn empty_category_rejected() {
        let mut tx = valid_tx();
        tx.category.clear();
        assert!(validate_structure(&tx, 1 << 16).is_err());
    }

    #[test]
    fn bad_sender_rejected() {
        let mut tx = valid_tx();
        tx.sender = "not-caip".into();
        assert!(validate_structure(&tx, 1 << 16).is_err());
    }

    #[test]
    fn no_recipients_rejected() {
        let mut tx = valid_tx();
        tx.recipients.clear();
        assert!(validate_structure(&tx, 1 << 16).is_err());
    }

    #[test]
    fn bad_recipient_rejected() {
        let mut tx = valid_tx();
        tx.recipients.push("eip155:1".into());
        assert!(validate_structure(&tx, 1 << 16).is_err());
    }

    #[test]
    fn too_many_recipients_rejected() {
        let mut tx = valid_tx();
        tx.recipients = (0..33).map(|i| format!("eip155:1:0x{i:02x}")).collect();
        assert!(validate_structure(&tx, 1 << 16).is_err());
    }

    #[test]
    fn wrong_signature_length_rejected() {
        let mut tx = valid_tx();
        tx.signature = vec![0xEE; 63];
        assert!(validate_structure(&tx, 1 << 16).is_err());
    }

    #[test]
    fn caip_shape() {
        assert!(is_caip_address("eip155:1:0xAA"));
        assert!(is_caip_address("solana:mainnet:addr:with:colons"));
        assert!(!is_caip_address("eip155:1:"));
        assert!(!is_caip_address(":1:0xAA"));
        assert!(!is_caip_address("plain"));
    }
}
