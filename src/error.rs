use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EfcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid EFC header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported EFC header version: {0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Could not derive key from {}: {source}", path.display())]
    KeyDerivation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    #[error("Compression error: {0}")]
    CompressionError(String),

    #[error("Payload too large for EFC container: {0} bytes")]
    PayloadTooLarge(u64),

    #[error("Output file {} already exists (use --overwrite to replace it)", .0.display())]
    OutputExists(PathBuf),

    #[error("No key specified")]
    KeyRequired,
}

pub type Result<T> = std::result::Result<T, EfcError>;
