//! Error types for the wallet core

use thiserror::Error;

use crate::chain::types::Amount;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet core
///
/// Messages never include key material, recovery phrases or secrets.
#[derive(Error, Debug)]
pub enum Error {
    // Key material errors
    #[error("Invalid private key format")]
    InvalidKeyFormat,

    #[error("Invalid recovery phrase")]
    InvalidRecoveryPhrase,

    #[error("No active identity")]
    NoActiveIdentity,

    // Session errors
    #[error("Session secret not verified")]
    SessionNotVerified,

    #[error("Secret must be at least {min_len} characters")]
    WeakSecret { min_len: usize },

    #[error("Secrets do not match")]
    SecretMismatch,

    // Chain registry errors
    #[error("Unknown chain: {0}")]
    UnknownChain(String),

    #[error("Invalid RPC endpoint: {0}")]
    InvalidRpcUrl(String),

    // RPC errors
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("RPC node rejected request: {0}")]
    RpcResponse(String),

    // Transfer errors
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: {required} required, {available} available")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("Transfer already in flight on {0}")]
    TransferInFlight(String),

    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),

    // Persistence errors
    #[error("Restore failed: incorrect secret or corrupted data")]
    RestoreFailed,

    #[error("Snapshot cancelled by a concurrent discard")]
    SnapshotCancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    // Scan errors
    #[error("Invalid address format")]
    InvalidFormat,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient transport failure on a read)
    ///
    /// Broadcast failures are never retryable: resubmission is a user decision.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Rpc(_))
    }

    /// Check if this error is a validation failure meant for direct display
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::InvalidKeyFormat
                | Error::InvalidRecoveryPhrase
                | Error::NoActiveIdentity
                | Error::SessionNotVerified
                | Error::WeakSecret { .. }
                | Error::SecretMismatch
                | Error::UnknownChain(_)
                | Error::InvalidRpcUrl(_)
                | Error::InvalidAmount(_)
                | Error::InsufficientFunds { .. }
                | Error::TransferInFlight(_)
                | Error::RestoreFailed
                | Error::InvalidFormat
        )
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_failure_not_retryable() {
        assert!(Error::Rpc("timeout".to_string()).is_retryable());
        assert!(!Error::BroadcastFailed("nonce too low".to_string()).is_retryable());
        assert!(!Error::RpcResponse("execution reverted".to_string()).is_retryable());
    }

    #[test]
    fn test_validation_errors_are_user_facing() {
        assert!(Error::SessionNotVerified.is_user_facing());
        assert!(Error::RestoreFailed.is_user_facing());
        assert!(!Error::Storage("disk full".to_string()).is_user_facing());
    }
}
