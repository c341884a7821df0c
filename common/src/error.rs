use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single round trip to the vendor API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("vendor rejected credentials ({0})")]
    Unauthorized(StatusCode),

    #[error("vendor endpoint not found")]
    NotFound,

    #[error("vendor server error ({0})")]
    ServerError(StatusCode),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("unexpected status {0}")]
    UnexpectedStatus(StatusCode),
}

/// A raw device entry that cannot become a [`crate::device::Device`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
    #[error("device entry is not a JSON object")]
    NotAnObject,

    #[error("device entry has no usable {0}")]
    MissingIdentity(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("vendor rejected credentials ({0}), new credentials required")]
    Unauthorized(StatusCode),

    #[error("vendor endpoint not found")]
    NotFound,

    #[error("vendor server error ({0})")]
    ServerError(StatusCode),

    #[error("network failure: {0}")]
    NetworkFailure(String),

    #[error("unexpected status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("unexpected response shape: {0}")]
    Protocol(String),

    #[error("no device with {key} '{value}'")]
    DeviceNotFound { key: &'static str, value: String },

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Credentials are invalid or expired; polling should stop until they are replaced.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Safe to retry on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure(_) | Self::ServerError(_))
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unauthorized(status) => Self::Unauthorized(status),
            TransportError::NotFound => Self::NotFound,
            TransportError::ServerError(status) => Self::ServerError(status),
            TransportError::NetworkFailure(msg) => Self::NetworkFailure(msg),
            TransportError::UnexpectedStatus(status) => Self::UnexpectedStatus(status),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
