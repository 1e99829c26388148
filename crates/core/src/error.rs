//! Error types for cloud-access
//!
//! Every backend reports failures through this one taxonomy so callers can
//! decide whether to retry, overwrite or abort without knowing which backend
//! they are talking to.

use thiserror::Error;

/// Result type alias using the crate's error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by cloud providers
#[derive(Debug, Error)]
pub enum Error {
    /// The server rejected the supplied credentials (HTTP 401)
    #[error("Unauthorized")]
    Unauthorized,

    /// The credentials are valid but lack permission (HTTP 403)
    #[error("Forbidden")]
    Forbidden,

    /// The node (or one of its parents) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The target node exists and replacing it was not allowed
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The server ran out of space (HTTP 507)
    #[error("Insufficient storage")]
    InsufficientStorage,

    /// The endpoint answered but does not speak WebDAV
    #[error("Server is not WebDAV compatible: {0}")]
    ServerNotCompatible(String),

    /// Any other backend failure, with the HTTP status when one is known
    #[error("{}", describe_backend(*.status, .message))]
    Backend {
        status: Option<u16>,
        message: String,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_backend(status: Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("Backend error (HTTP {code}): {message}"),
        None => format!("Backend error: {message}"),
    }
}

impl Error {
    /// Generic backend failure without a status code (transport, parsing)
    pub fn backend(message: impl Into<String>) -> Self {
        Error::Backend {
            status: None,
            message: message.into(),
        }
    }

    /// Generic backend failure for an unexpected HTTP status
    pub fn status(code: u16) -> Self {
        Error::Backend {
            status: Some(code),
            message: format!("Response code isn't between 200 and 300: {code}"),
        }
    }

    /// HTTP status carried by a generic backend error
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Backend { status, .. } => *status,
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }
}
