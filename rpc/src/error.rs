use thiserror::Error;

/// Transport and protocol failures for peer RPC calls.
///
/// These are always recorded per-peer (retry bookkeeping, quorum exclusion)
/// rather than collapsed into one aggregate failure.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed reply: {0}")]
    Decode(String),

    #[error("invalid hex payload: {0}")]
    Hex(String),
}

/// Map a call outcome to the HTTP-style code the reply merger records.
///
/// 2xx marks a good reply; anything else excludes the node from quorum.
pub fn outcome_code<T>(result: &Result<T, RpcError>) -> u16 {
    match result {
        Ok(_) => 200,
        Err(RpcError::HttpStatus(status)) => *status,
        Err(RpcError::Timeout(_)) => 408,
        Err(_) => 500,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_codes() {
        assert_eq!(outcome_code(&Ok(())), 200);
        assert_eq!(outcome_code::<()>(&Err(RpcError::HttpStatus(404))), 404);
        assert_eq!(outcome_code::<()>(&Err(RpcError::Timeout("t".into()))), 408);
        assert_eq!(
            outcome_code::<()>(&Err(RpcError::Decode("bad".into()))),
            500
        );
    }
}
