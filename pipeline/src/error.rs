use thiserror::Error;

/// Rejection of a single submission; the pending block is unaffected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction exceeds maximum size ({size} > {max})")]
    TooLarge { size: usize, max: usize },

    #[error("malformed transaction: {0}")]
    Malformed(String),

    #[error("invalid or expired API token")]
    BadApiToken,
}

/// Failure of a block cycle or attestation call; the cycle is aborted.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BlockError {
    #[error("pending block is full")]
    PendingBlockFull,

    #[error("signature mismatch for {0}")]
    SignatureMismatch(String),

    #[error("block hash mismatch: expected {expected}, computed {computed}")]
    HashMismatch { expected: String, computed: String },

    #[error("no cached block for initial hash {0}")]
    UnknownBlock(String),

    #[error("signer {0} is not authorized by the attest token")]
    TokenViolation(String),

    #[error("signer {0} is not a registered validator")]
    UnknownSigner(String),

    #[error("own signature missing from provided patches")]
    OwnPatchMissing,

    #[error("malformed block: {0}")]
    Malformed(String),

    #[error("block cycle failed: {0}")]
    CycleFailed(String),
}

/// Top-level pipeline failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("directory error: {0}")]
    Directory(#[from] push_directory::DirectoryError),

    #[error("attestor {node} failed: {source}")]
    AttestorCall {
        node: String,
        #[source]
        source: push_rpc::RpcError,
    },
}
