//! Error types for CertVault

use crate::registry::RevertKind;
use thiserror::Error;

/// Bad input caught before any I/O.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("fingerprint must be a non-empty string")]
    InvalidFingerprint,
    #[error("invalid document id: {0}")]
    InvalidId(String),
    #[error("invalid account address: {0}")]
    InvalidAddress(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CertError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Malformed envelope: {len} bytes is shorter than the 96-byte header")]
    MalformedEnvelope { len: usize },
    #[error("Decryption failed: wrong password or corrupted file")]
    AuthenticationFailure,
    #[error("Cryptographic error: {0}")]
    Crypto(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Wrong network: expected chain id {expected}, connected to {actual}")]
    WrongNetwork { expected: u64, actual: u64 },
    #[error("Transaction timed out{}; outcome unknown", .tx_hash.as_ref().map(|h| format!(" ({})", h)).unwrap_or_default())]
    TransactionTimeout { tx_hash: Option<String> },
    #[error("Query timed out")]
    QueryTimeout,
    #[error("Insufficient funds: balance {balance} wei, required {required} wei")]
    InsufficientFunds { balance: u128, required: u128 },
    #[error("Nonce conflict: {0}")]
    NonceConflict(String),
    #[error("Contract reverted: {0}")]
    Revert(RevertKind),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CertError {
    /// Whether a caller may retry, after re-querying current state first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CertError::TransactionTimeout { .. } | CertError::QueryTimeout | CertError::NonceConflict(_)
        )
    }

    /// Short remediation hint suitable for an end user.
    pub fn remediation_hint(&self) -> &'static str {
        match self {
            CertError::Validation(ValidationError::InvalidFingerprint) => {
                "provide the content identifier of the stored envelope"
            }
            CertError::Validation(ValidationError::InvalidId(_)) => "use a positive document id",
            CertError::Validation(ValidationError::InvalidAddress(_)) => {
                "use a 0x-prefixed 40 hex digit account address"
            }
            CertError::MalformedEnvelope { .. } => "the file is not an encrypted envelope",
            CertError::AuthenticationFailure => "re-enter the password",
            CertError::Crypto(_) => "check the signer key material",
            CertError::Network(_) => "check the RPC endpoint and connectivity",
            CertError::WrongNetwork { .. } => "point the RPC endpoint at the configured chain",
            CertError::TransactionTimeout { .. } => {
                "re-query the document before retrying; the transaction may still land"
            }
            CertError::QueryTimeout => "retry the query later",
            CertError::InsufficientFunds { .. } => "top up the signer balance",
            CertError::NonceConflict(_) => "wait for the pending transaction to land, then retry",
            CertError::Revert(RevertKind::NotOwner) => "only the current owner can transfer a document",
            CertError::Revert(RevertKind::DocumentNotFound) => "check the document id",
            CertError::Revert(RevertKind::InvalidAddress) => "use a non-zero recipient account",
            CertError::Revert(RevertKind::InvalidFingerprint) => {
                "provide the content identifier of the stored envelope"
            }
            CertError::Revert(RevertKind::Other(_)) => "inspect the transaction on the explorer",
            CertError::Config(_) => "fix the configuration file or environment",
            CertError::Storage(_) => "check the content storage service",
            CertError::Database(_) | CertError::Io(_) | CertError::Serialization(_) => {
                "check local files and permissions"
            }
        }
    }
}

impl From<std::io::Error> for CertError {
    fn from(err: std::io::Error) -> Self {
        CertError::Io(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for CertError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        CertError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for CertError {
    fn from(err: serde_json::Error) -> Self {
        CertError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for CertError {
    fn from(err: rusqlite::Error) -> Self {
        CertError::Database(err.to_string())
    }
}

impl From<toml::de::Error> for CertError {
    fn from(err: toml::de::Error) -> Self {
        CertError::Config(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, CertError>;
