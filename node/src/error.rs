use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] push_pipeline::PipelineError),

    #[error("directory error: {0}")]
    Directory(#[from] push_directory::DirectoryError),

    #[error("RPC error: {0}")]
    Rpc(#[from] push_rpc::RpcError),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] push_websocket::WsError),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid key material: {0}")]
    Key(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shutdown timeout")]
    ShutdownTimeout,
}
