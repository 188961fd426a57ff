use thiserror::Error;

/// Errors surfaced by the session client
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-2xx response or an envelope whose status isn't "success"
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Missing or malformed input, caught before any network call
    #[error("{0}")]
    Validation(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("malformed packet: {0}")]
    Codec(String),

    #[error("local store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
