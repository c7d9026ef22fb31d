use thiserror::Error;

use crate::domain::DestinationError;

/// Main error type for the transfer core
#[derive(Error, Debug)]
pub enum TransferError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] config::ConfigError),

    #[error("Invalid destination: {0}")]
    Destination(#[from] DestinationError),

    // Resolution errors
    #[error("Target not found: {0}")]
    NotFound(String),

    #[error("Ambiguous target: {} candidates qualify ({})", .candidates.len(), .candidates.join(", "))]
    AmbiguousTarget { candidates: Vec<String> },

    #[error("Self transfer denied: already connected to {target}")]
    SelfTransferDenied { target: String },

    // Session errors
    #[error("Transfer already pending for client {client_id}")]
    AlreadyPending { client_id: String },

    #[error("No pending transfer for client {client_id}")]
    NotPending { client_id: String },

    // State machine errors
    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Dispatch errors
    #[error("Host rejected transfer: {0}")]
    HostRejected(String),

    #[error("Host unavailable: {0}")]
    HostUnavailable(String),

    #[error("Transfer timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TransferError {
    /// Resolution and guard errors leave every session untouched
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            TransferError::NotFound(_)
                | TransferError::AmbiguousTarget { .. }
                | TransferError::SelfTransferDenied { .. }
                | TransferError::AlreadyPending { .. }
        )
    }
}

/// Result type alias for TransferError
pub type Result<T> = std::result::Result<T, TransferError>;

/// Failure signals returned by the host transfer capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("rejected by host: {0}")]
    Rejected(String),

    #[error("host unavailable: {0}")]
    Unavailable(String),
}

impl From<HostError> for TransferError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Rejected(reason) => TransferError::HostRejected(reason),
            HostError::Unavailable(reason) => TransferError::HostUnavailable(reason),
        }
    }
}
