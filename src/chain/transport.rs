//! Request/response contract between the chain client and a network.

use crate::crypto::AccountId;
use crate::error::CertError;
use crate::registry::RevertKind;
use crate::transaction::{QueryResponse, RegistryQuery, SignedTransaction, TxHash, TxReceipt};
use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    #[error("nonce mismatch: account expects {expected}, transaction has {got}")]
    Nonce { expected: u64, got: u64 },
    #[error("insufficient funds for gas: balance {balance}, required {required}")]
    InsufficientFunds { balance: u128, required: u128 },
    /// Carries the raw revert reason string.
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("no contract deployed at {0}")]
    NoContract(AccountId),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
}

impl From<TransportError> for CertError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Unreachable(msg) => CertError::Network(msg),
            TransportError::Nonce { expected, got } => CertError::NonceConflict(format!(
                "account expects nonce {}, transaction used {}",
                expected, got
            )),
            TransportError::InsufficientFunds { balance, required } => {
                CertError::InsufficientFunds { balance, required }
            }
            TransportError::Reverted(reason) => CertError::Revert(RevertKind::from_reason(&reason)),
            other => CertError::Network(other.to_string()),
        }
    }
}

/// A network hosting the registry.
///
/// Implementations must be shareable across tasks: read calls may run
/// concurrently on one handle.
#[async_trait]
pub trait ChainTransport: Send + Sync {
    async fn chain_id(&self) -> Result<u64, TransportError>;

    async fn block_number(&self) -> Result<u64, TransportError>;

    /// Balance in wei.
    async fn balance(&self, account: &AccountId) -> Result<u128, TransportError>;

    /// Next nonce for `account`, counting transactions not yet in a block.
    async fn pending_nonce(&self, account: &AccountId) -> Result<u64, TransportError>;

    /// Validates and queues a transaction, returning its hash. Reverts detected
    /// while estimating are reported here, before anything is queued.
    async fn send_transaction(&self, tx: SignedTransaction) -> Result<TxHash, TransportError>;

    /// Resolves once the transaction has `confirmations` blocks on top of and
    /// including its own.
    async fn wait_for_receipt(&self, tx_hash: &TxHash, confirmations: u64) -> Result<TxReceipt, TransportError>;

    async fn call(&self, contract: &AccountId, query: RegistryQuery) -> Result<QueryResponse, TransportError>;
}
