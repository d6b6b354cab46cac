use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed notation: {0}")]
    Notation(String),

    #[error("Timed out after {timeout_ms}ms waiting for selector: {selector}")]
    WaitTimeout { selector: String, timeout_ms: u64 },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Unsupported provider operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
