use devframe_scanner::ScanError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Invalid cookie: {0}")]
    InvalidCookie(String),

    #[error("Invalid mock pattern: {0}")]
    InvalidPattern(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Upstream unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
