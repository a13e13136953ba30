use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("server bind failed: {0}")]
    Bind(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
