//! Chain client: submits certification and transfer transactions to the
//! registry, waits for confirmation and runs read-only queries.
//!
//! Every network call is raced against the configured timeout. A timed-out
//! write has an unknown outcome: callers should re-query by id or fingerprint
//! before retrying. Writes from one signer share its nonce; concurrent writes
//! may fail with [`CertError::NonceConflict`] and are not serialized here.

use crate::chain::{ChainTransport, TransportError};
use crate::config::{ClientConfig, Config};
use crate::crypto::{AccountId, KeyPair};
use crate::error::{CertError, Result};
use crate::registry::{DocumentId, RevertKind};
use crate::transaction::{
    parse_account, parse_recipient, tx_hash_hex, validate_document_id, validate_fingerprint, QueryResponse,
    RegistryCall, RegistryQuery, Transaction, TxHash, TxReceipt, TxStatus,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Non-fatal conditions surfaced alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientWarning {
    LowBalance { balance: u128, threshold: u128 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationReceipt {
    /// `None` when the confirmation carried no readable certification event;
    /// the certification itself still landed.
    pub document_id: Option<DocumentId>,
    pub fingerprint: String,
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub explorer_link: String,
    pub registry: AccountId,
    pub network: String,
    pub warnings: Vec<ClientWarning>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub document_id: DocumentId,
    pub new_owner: AccountId,
    pub tx_hash: String,
    pub block_number: u64,
    pub gas_used: u64,
    pub explorer_link: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificationStatus {
    Found {
        id: DocumentId,
        fingerprint: String,
        owner: AccountId,
        /// Seconds since the epoch, as recorded on chain.
        timestamp: u64,
        certified_at: DateTime<Utc>,
    },
    NotFound {
        id: DocumentId,
    },
}

impl CertificationStatus {
    pub fn is_found(&self) -> bool {
        matches!(self, CertificationStatus::Found { .. })
    }
}

/// Diagnostic view of the connection. Fields are `None` when the probe
/// stopped before reaching them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectivitySnapshot {
    pub success: bool,
    pub error: Option<String>,
    pub network: String,
    pub chain_id: Option<u64>,
    pub signer: AccountId,
    pub balance: Option<u128>,
    pub block_number: Option<u64>,
    pub registry: AccountId,
    pub registry_reachable: bool,
    pub document_count: Option<u64>,
}

/// The only holder of a live chain connection. Cheap to clone; clones share
/// the transport and the signer.
#[derive(Clone)]
pub struct ChainClient {
    transport: Arc<dyn ChainTransport>,
    signer: KeyPair,
    registry: AccountId,
    chain_id: u64,
    network_name: String,
    explorer_url: String,
    settings: ClientConfig,
}

impl ChainClient {
    pub fn new(config: &Config, transport: Arc<dyn ChainTransport>, signer: KeyPair) -> Result<Self> {
        if config.network.chain_id == 0 {
            return Err(CertError::Config("network.chain_id must be non-zero".to_string()));
        }
        if config.client.confirmations == 0 {
            return Err(CertError::Config("client.confirmations must be at least 1".to_string()));
        }
        Ok(ChainClient {
            transport,
            signer,
            registry: config.registry_address()?,
            chain_id: config.network.chain_id,
            network_name: config.network.network_name.clone(),
            explorer_url: config.network.explorer_url.trim_end_matches('/').to_string(),
            settings: config.client.clone(),
        })
    }

    /// Builds a client using the signer key from `config`.
    pub fn from_config(config: &Config, transport: Arc<dyn ChainTransport>) -> Result<Self> {
        let signer = config.signer_keypair()?;
        Self::new(config, transport, signer)
    }

    pub fn signer(&self) -> AccountId {
        self.signer.account()
    }

    pub fn registry(&self) -> AccountId {
        self.registry
    }

    pub fn explorer_link(&self, tx_hash: &TxHash) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash_hex(tx_hash))
    }

    /// Races `call` against the configured timeout.
    async fn timed<T, F>(&self, call: F, on_timeout: CertError) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, TransportError>>,
    {
        match tokio::time::timeout(self.settings.timeout(), call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                warn!("Chain call abandoned after {}s: {}", self.settings.timeout_secs, on_timeout);
                Err(on_timeout)
            }
        }
    }

    async fn query(&self, query: RegistryQuery) -> Result<QueryResponse> {
        self.timed(self.transport.call(&self.registry, query), CertError::QueryTimeout).await
    }

    async fn ensure_network(&self) -> Result<u64> {
        let actual = self.timed(self.transport.chain_id(), CertError::QueryTimeout).await?;
        if actual != self.chain_id {
            return Err(CertError::WrongNetwork {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(actual)
    }

    async fn signer_balance(&self) -> Result<u128> {
        let account = self.signer.account();
        self.timed(self.transport.balance(&account), CertError::QueryTimeout).await
    }

    /// Signs `call` at the signer's pending nonce and hands it to the network.
    async fn submit(&self, call: RegistryCall) -> Result<TxHash> {
        let from = self.signer.account();
        let nonce = self.timed(self.transport.pending_nonce(&from), CertError::QueryTimeout).await?;

        let signed = Transaction {
            chain_id: self.chain_id,
            from,
            to: self.registry,
            nonce,
            gas_limit: self.settings.gas_limit,
            call,
        }
        .sign(&self.signer)?;
        let tx_hash = signed.hash();
        let hash_hex = tx_hash_hex(&tx_hash);

        debug!("Submitting {} (nonce {})", hash_hex, nonce);
        let timeout = CertError::TransactionTimeout {
            tx_hash: Some(hash_hex.clone()),
        };
        let accepted = self
            .timed(self.transport.send_transaction(signed), timeout)
            .await
            .inspect_err(|e| match e {
                CertError::Revert(kind) => warn!("Transaction {} reverted: {:?}", hash_hex, kind),
                CertError::NonceConflict(msg) => warn!("Nonce conflict for {}: {}", hash_hex, msg),
                _ => {}
            })?;
        info!("Submitted transaction {}", hash_hex);
        Ok(accepted)
    }

    /// Waits for the configured number of confirmations. A receipt with a
    /// reverted status is an error.
    async fn confirm(&self, tx_hash: &TxHash) -> Result<TxReceipt> {
        let hash_hex = tx_hash_hex(tx_hash);
        let timeout = CertError::TransactionTimeout {
            tx_hash: Some(hash_hex.clone()),
        };
        let receipt = self
            .timed(self.transport.wait_for_receipt(tx_hash, self.settings.confirmations), timeout)
            .await?;

        match &receipt.status {
            TxStatus::Success => {
                info!(
                    "Transaction {} confirmed in block {} (gas {})",
                    hash_hex, receipt.block_number, receipt.gas_used
                );
                Ok(receipt)
            }
            TxStatus::Reverted(reason) => {
                let kind = RevertKind::from_reason(reason);
                warn!("Transaction {} reverted in block {}: {:?}", hash_hex, receipt.block_number, kind);
                Err(CertError::Revert(kind))
            }
        }
    }

    /// Anchors `fingerprint` in the registry under the signer's account.
    pub async fn certify_remote(&self, fingerprint: &str) -> Result<CertificationReceipt> {
        let fingerprint = validate_fingerprint(fingerprint)?;
        self.ensure_network().await?;

        let mut warnings = Vec::new();
        let balance = self.signer_balance().await?;
        if balance < self.settings.min_balance_wei {
            warn!(
                "Signer {} balance {} wei is below {} wei; attempting certification anyway",
                self.signer.account(),
                balance,
                self.settings.min_balance_wei
            );
            warnings.push(ClientWarning::LowBalance {
                balance,
                threshold: self.settings.min_balance_wei,
            });
        }

        let tx_hash = self
            .submit(RegistryCall::Certify {
                fingerprint: fingerprint.to_string(),
            })
            .await?;
        let receipt = self.confirm(&tx_hash).await?;

        let document_id = receipt.certified_id(&self.registry);
        if document_id.is_none() {
            warn!("No certification event in receipt for {}", tx_hash_hex(&tx_hash));
        }

        Ok(CertificationReceipt {
            document_id,
            fingerprint: fingerprint.to_string(),
            tx_hash: tx_hash_hex(&tx_hash),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            explorer_link: self.explorer_link(&tx_hash),
            registry: self.registry,
            network: self.network_name.clone(),
            warnings,
            completed_at: Utc::now(),
        })
    }

    pub async fn verify_remote(&self, id: DocumentId) -> Result<CertificationStatus> {
        let id = validate_document_id(id)?;
        let record = match self.query(RegistryQuery::Verify { id }).await? {
            QueryResponse::Record(record) => record,
            other => return Err(unexpected_response(&other)),
        };

        if !record.exists {
            return Ok(CertificationStatus::NotFound { id });
        }
        let certified_at = certified_at(record.timestamp)?;
        Ok(CertificationStatus::Found {
            id,
            fingerprint: record.fingerprint,
            owner: record.owner,
            timestamp: record.timestamp,
            certified_at,
        })
    }

    /// Hands document `id` to `new_owner`. Refuses to submit when the signer
    /// balance is under the operating threshold.
    pub async fn transfer_remote(&self, id: DocumentId, new_owner: &str) -> Result<TransferReceipt> {
        let id = validate_document_id(id)?;
        let new_owner = parse_recipient(new_owner)?;
        self.ensure_network().await?;

        let balance = self.signer_balance().await?;
        if balance < self.settings.min_balance_wei {
            return Err(CertError::InsufficientFunds {
                balance,
                required: self.settings.min_balance_wei,
            });
        }

        let tx_hash = self.submit(RegistryCall::Transfer { id, new_owner }).await?;
        let receipt = self.confirm(&tx_hash).await?;

        Ok(TransferReceipt {
            document_id: id,
            new_owner,
            tx_hash: tx_hash_hex(&tx_hash),
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            explorer_link: self.explorer_link(&tx_hash),
            completed_at: Utc::now(),
        })
    }

    /// Every id ever assigned to `account`, including ones since transferred away.
    pub async fn list_by_owner_remote(&self, account: &str) -> Result<Vec<DocumentId>> {
        let account = parse_account(account)?;
        match self.query(RegistryQuery::ListByOwner { account }).await? {
            QueryResponse::Ids(ids) => Ok(ids),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Lowest id certified for `fingerprint`, if any.
    pub async fn check_exists_remote(&self, fingerprint: &str) -> Result<Option<DocumentId>> {
        let fingerprint = validate_fingerprint(fingerprint)?.to_string();
        match self.query(RegistryQuery::CheckExists { fingerprint }).await? {
            QueryResponse::Exists { exists: true, id } => Ok(Some(id)),
            QueryResponse::Exists { exists: false, .. } => Ok(None),
            other => Err(unexpected_response(&other)),
        }
    }

    /// Probes the network and registry. Never fails; problems are reported in
    /// the snapshot.
    pub async fn test_connectivity(&self) -> ConnectivitySnapshot {
        let mut snapshot = ConnectivitySnapshot {
            success: false,
            error: None,
            network: self.network_name.clone(),
            chain_id: None,
            signer: self.signer.account(),
            balance: None,
            block_number: None,
            registry: self.registry,
            registry_reachable: false,
            document_count: None,
        };

        match self.probe(&mut snapshot).await {
            Ok(()) => snapshot.success = true,
            Err(e) => {
                warn!("Connectivity check failed: {}", e);
                snapshot.error = Some(e.to_string());
            }
        }
        snapshot
    }

    async fn probe(&self, snapshot: &mut ConnectivitySnapshot) -> Result<()> {
        let actual = self.timed(self.transport.chain_id(), CertError::QueryTimeout).await?;
        snapshot.chain_id = Some(actual);
        if actual != self.chain_id {
            return Err(CertError::WrongNetwork {
                expected: self.chain_id,
                actual,
            });
        }

        snapshot.balance = Some(self.signer_balance().await?);
        snapshot.block_number = Some(self.timed(self.transport.block_number(), CertError::QueryTimeout).await?);

        // An unreachable registry still leaves the network usable.
        match self.query(RegistryQuery::DocumentCount).await {
            Ok(QueryResponse::Count(count)) => {
                snapshot.registry_reachable = true;
                snapshot.document_count = Some(count);
            }
            Ok(other) => warn!("Registry answered document count with {:?}", other),
            Err(e) => warn!("Registry {} unreachable: {}", self.registry, e),
        }
        Ok(())
    }
}

fn certified_at(timestamp: u64) -> Result<DateTime<Utc>> {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .ok_or_else(|| CertError::Serialization(format!("Timestamp out of range: {}", timestamp)))
}

fn unexpected_response(response: &QueryResponse) -> CertError {
    CertError::Network(format!("Unexpected registry response: {:?}", response))
}
