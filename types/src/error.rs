use thiserror::Error;

/// Errors produced while encoding or decoding wire structures.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization failed: {0}")]
    Encode(String),

    #[error("deserialization failed: {0}")]
    Decode(String),

    #[error("invalid hex payload: {0}")]
    Hex(String),
}
