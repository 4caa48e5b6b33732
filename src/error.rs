use std::path::PathBuf;

use thiserror::Error;

/// Main error type for seqtrace operations
#[derive(Error, Debug)]
pub enum SeqTraceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Malformed model {}: {message}", path.display())]
    MalformedModel { path: PathBuf, message: String },

    #[error("Invalid entry point signature: {0}")]
    InvalidEntryPoint(String),

    #[error("Trace did not finish within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Background task failed: {0}")]
    Join(String),
}

pub type Result<T> = std::result::Result<T, SeqTraceError>;
