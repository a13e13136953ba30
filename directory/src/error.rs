use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("node {0} is not registered")]
    UnknownNode(String),

    #[error("not enough active attestors: wanted {wanted}, have {available}")]
    NotEnoughAttestors { wanted: usize, available: usize },
}
