use thiserror::Error;

/// Errors raised by the local durable queue and its storage backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The local store could not be read or written. Data durability is at
    /// risk, so this is always surfaced to the caller.
    #[error("local storage unavailable: {0}")]
    StorageUnavailable(String),
    /// The persisted record list exists but cannot be decoded.
    #[error("persisted queue is corrupt: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        QueueError::StorageUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        QueueError::StorageUnavailable(err.to_string())
    }
}

/// A single record's remote write failed. Never escapes a drain cycle.
#[derive(Debug, Error)]
pub enum RemoteWriteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("remote rejected write with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("remote write timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<reqwest::Error> for RemoteWriteError {
    fn from(err: reqwest::Error) -> Self {
        RemoteWriteError::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}
