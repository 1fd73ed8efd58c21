use thiserror::Error;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("path not found: {0}")]
    Path(String),

    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("operation not permitted on the root directory")]
    Root,

    #[error("destination lies inside the source subtree")]
    Conflict,

    #[error("entry already exists: {0}")]
    AlreadyExists(String),

    #[error("offset {offset} out of range for buffer of {len} bytes")]
    OutOfRange { offset: usize, len: usize },

    #[error("unsupported container: {0}")]
    Unsupported(String),

    #[error("corrupted payload: {0}")]
    Corrupted(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VfsError>;
