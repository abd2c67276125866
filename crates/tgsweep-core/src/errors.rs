use crate::client::ClientError;

/// Core error type for the cleanup engine.
///
/// Per-target failures never surface here; they are absorbed into
/// `ActionRecord`s. This type covers job-level conditions only.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("dialog enumeration failed: {0}")]
    Enumeration(ClientError),

    #[error("account invalid: {0}")]
    AccountInvalid(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
