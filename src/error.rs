use std::time::Duration;

use devicepass_types::ShapeError;
use thiserror::Error;

use crate::crypto::CryptoError;

/// Pairing errors, one variant per failure the caller must tell apart.
#[derive(Error, Debug)]
pub enum PairError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authorization polling failed ({code}): {description}")]
    PollingFails { code: String, description: String },

    #[error("Need scopes {required}, not '{granted}'")]
    Scope { required: String, granted: String },

    #[error("Need {expected} token, not '{got}'")]
    TokenType { expected: String, got: String },

    #[error("Timeout waiting for {waiting_for} after {}s", .elapsed.as_secs())]
    Timeout { waiting_for: String, elapsed: Duration },

    #[error("Decryption failed")]
    Decrypt,

    #[error("Cryptographic error: {0}")]
    Crypto(CryptoError),

    #[error("Malformed payload: {0}")]
    Shape(#[from] ShapeError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Platform returned {status}: {message}")]
    Platform { status: u16, message: String },

    #[error("Git error: {0}")]
    Git(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Who is to blame for a failed activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The deadline passed without the operator doing anything.
    OperatorNeverActed,
    /// The operator acted, but denied, used the wrong password or granted too little.
    OperatorRejected,
    /// Transport, platform or local failure.
    Transport,
}

impl PairError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn git<S: Into<String>>(msg: S) -> Self {
        Self::Git(msg.into())
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::OperatorNeverActed,
            Self::PollingFails { .. }
            | Self::Scope { .. }
            | Self::TokenType { .. }
            | Self::Decrypt => FailureKind::OperatorRejected,
            _ => FailureKind::Transport,
        }
    }
}

impl From<CryptoError> for PairError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::DecryptionFailed => Self::Decrypt,
            other => Self::Crypto(other),
        }
    }
}

/// Result type alias using PairError
pub type PairResult<T> = Result<T, PairError>;
