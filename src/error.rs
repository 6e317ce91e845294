// src/error.rs

use crate::models::Service;
use crate::state_store::StateError;
use thiserror::Error;

/// Errors surfaced at the service boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no credential configured for {0}")]
    MissingCredential(Service),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: Service,
        status: u16,
        message: String,
    },
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("item {0} is not ready for retrieval")]
    NotReady(String),
    #[error("transfer cancelled")]
    Cancelled,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("state store error: {0}")]
    State(#[from] StateError),
    #[error("config error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

/// How a failure should be presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or rejected credential: prompt for configuration.
    Credential,
    /// Transport, HTTP or response-shape failure: dismissible notice.
    Network,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingCredential(_) => ErrorKind::Credential,
            Error::Status { status: 401 | 403, .. } => ErrorKind::Credential,
            Error::Network(_) | Error::Status { .. } | Error::Decode(_) => ErrorKind::Network,
            _ => ErrorKind::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
