//! In-process development chain hosting registry contracts.
//!
//! `LocalChain` implements [`ChainTransport`] without any network: it keeps
//! balances, nonces, blocks and receipts, verifies signatures, charges gas and
//! executes registry calls. Fault injection (latency, outages, stripped logs,
//! manual sealing) lets callers exercise every failure path of the client.

use crate::crypto::AccountId;
use crate::error::CertError;
use crate::persistence::{InMemoryPersistence, Persistence};
use crate::registry::{Registry, RegistryEvent, RevertKind};
use crate::transaction::{
    tx_hash_hex, Log, QueryResponse, RegistryCall, RegistryQuery, SignedTransaction, TxHash, TxReceipt,
    TxStatus,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::block::Block;
use super::transport::{ChainTransport, TransportError};

/// 30 gwei.
pub const DEFAULT_GAS_PRICE: u128 = 30_000_000_000;
pub const BASE_GAS: u64 = 21_000;
const CERTIFY_GAS: u64 = 88_000;
const FINGERPRINT_BYTE_GAS: u64 = 16;
const TRANSFER_GAS: u64 = 34_000;
const REVERT_GAS: u64 = 2_300;

/// Account and contract state, everything except the block list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub chain_id: u64,
    pub gas_price: u128,
    pub balances: BTreeMap<AccountId, u128>,
    pub nonces: BTreeMap<AccountId, u64>,
    pub contracts: BTreeMap<AccountId, Registry>,
    pub receipts: BTreeMap<TxHash, TxReceipt>,
}

impl ChainState {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            gas_price: DEFAULT_GAS_PRICE,
            balances: BTreeMap::new(),
            nonces: BTreeMap::new(),
            contracts: BTreeMap::new(),
            receipts: BTreeMap::new(),
        }
    }

    pub fn balance(&self, account: &AccountId) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    pub fn nonce(&self, account: &AccountId) -> u64 {
        self.nonces.get(account).copied().unwrap_or(0)
    }
}

/// Gas charged for a successful call.
pub fn gas_for(call: &RegistryCall) -> u64 {
    match call {
        RegistryCall::Certify { fingerprint } => {
            BASE_GAS + CERTIFY_GAS + FINGERPRINT_BYTE_GAS * fingerprint.len() as u64
        }
        RegistryCall::Transfer { .. } => BASE_GAS + TRANSFER_GAS,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiningMode {
    /// Every accepted transaction is sealed into its own block immediately.
    Auto,
    /// Transactions wait in the pending pool until [`LocalChain::mine`].
    Manual,
}

#[derive(Debug, Clone, Default)]
struct Faults {
    latency: Duration,
    offline: bool,
    strip_logs: bool,
}

struct Inner {
    blocks: Vec<Block>,
    state: ChainState,
    pending: Vec<SignedTransaction>,
    mode: MiningMode,
}

impl Inner {
    fn pending_nonce(&self, account: &AccountId) -> u64 {
        let queued = self.pending.iter().filter(|tx| tx.tx.from == *account).count() as u64;
        self.state.nonce(account) + queued
    }

    fn height(&self) -> u64 {
        self.blocks.last().map_or(0, |b| b.header.number)
    }
}

pub struct LocalChain {
    inner: RwLock<Inner>,
    faults: RwLock<Faults>,
    block_notify: Notify,
    persistence: Box<dyn Persistence>,
}

impl LocalChain {
    /// A fresh chain with an in-memory backend.
    pub fn new(chain_id: u64) -> Self {
        Self::fresh(chain_id, Box::new(InMemoryPersistence::new()))
    }

    fn fresh(chain_id: u64, persistence: Box<dyn Persistence>) -> Self {
        let genesis = Block::genesis(now_secs());
        Self::from_parts(vec![genesis], ChainState::new(chain_id), persistence)
    }

    fn from_parts(blocks: Vec<Block>, state: ChainState, persistence: Box<dyn Persistence>) -> Self {
        LocalChain {
            inner: RwLock::new(Inner {
                blocks,
                state,
                pending: Vec::new(),
                mode: MiningMode::Auto,
            }),
            faults: RwLock::new(Faults::default()),
            block_notify: Notify::new(),
            persistence,
        }
    }

    /// Reopens the chain saved in `persistence`, or starts a new one there.
    pub fn open(chain_id: u64, persistence: Box<dyn Persistence>) -> Result<Self, CertError> {
        match persistence.load_chain()? {
            Some((blocks, state)) => {
                if state.chain_id != chain_id {
                    return Err(CertError::Config(format!(
                        "Stored chain has id {}, expected {}",
                        state.chain_id, chain_id
                    )));
                }
                let blocks = if blocks.is_empty() { vec![Block::genesis(now_secs())] } else { blocks };
                info!("Reopened local chain {} at height {}", chain_id, blocks.len() - 1);
                Ok(Self::from_parts(blocks, state, persistence))
            }
            None => {
                let chain = Self::fresh(chain_id, persistence);
                {
                    let inner = chain.inner.read();
                    chain.persistence.save_chain_state(inner.blocks.first(), &inner.state)?;
                }
                info!("Created local chain {}", chain_id);
                Ok(chain)
            }
        }
    }

    /// Deploys an empty registry; the address derives from deployer and nonce.
    pub fn deploy_registry(&self, deployer: AccountId) -> Result<AccountId, CertError> {
        let mut inner = self.inner.write();
        let nonce = inner.state.nonce(&deployer);

        let mut hasher = Sha256::new();
        hasher.update(deployer.0);
        hasher.update(nonce.to_le_bytes());
        let address = AccountId::from_public_key(&hasher.finalize());

        let mut next = inner.state.clone();
        next.contracts.insert(address, Registry::new());
        next.nonces.insert(deployer, nonce + 1);
        self.persistence.save_chain_state(None, &next)?;
        inner.state = next;

        info!("Deployed registry at {} (deployer {})", address, deployer);
        Ok(address)
    }

    /// Credits `wei` to `account`.
    pub fn fund(&self, account: AccountId, wei: u128) -> Result<(), CertError> {
        let mut inner = self.inner.write();
        let mut next = inner.state.clone();
        let balance = next.balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(wei);
        self.persistence.save_chain_state(None, &next)?;
        inner.state = next;
        Ok(())
    }

    pub fn set_mining_mode(&self, mode: MiningMode) {
        self.inner.write().mode = mode;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.faults.write().latency = latency;
    }

    pub fn set_offline(&self, offline: bool) {
        self.faults.write().offline = offline;
    }

    /// Receipts of blocks sealed while set carry no logs.
    pub fn set_strip_logs(&self, strip: bool) {
        self.faults.write().strip_logs = strip;
    }

    pub fn height(&self) -> u64 {
        self.inner.read().height()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.read().pending.len()
    }

    pub fn registry(&self, address: &AccountId) -> Option<Registry> {
        self.inner.read().state.contracts.get(address).cloned()
    }

    /// Seals all pending transactions into one block. Returns the new height,
    /// or `None` when nothing was pending.
    pub fn mine(&self) -> Result<Option<u64>, CertError> {
        let sealed = {
            let mut inner = self.inner.write();
            if inner.pending.is_empty() {
                None
            } else {
                Some(self.seal(&mut inner)?)
            }
        };
        if sealed.is_some() {
            self.block_notify.notify_waiters();
        }
        Ok(sealed)
    }

    /// Executes the pending pool against a copy of the state and commits it
    /// only once the block is persisted. On failure nothing changes and the
    /// pool is left as it was.
    fn seal(&self, inner: &mut Inner) -> Result<u64, CertError> {
        let strip_logs = self.faults.read().strip_logs;
        let parent = inner
            .blocks
            .last()
            .ok_or_else(|| CertError::Database("Chain has no genesis block".to_string()))?;
        let number = parent.header.number + 1;
        // Keep timestamps monotonic even when blocks are sealed within one second.
        let timestamp = now_secs().max(parent.header.timestamp);
        let block = Block::new(number, parent.hash(), timestamp, inner.pending.clone());

        let mut next = inner.state.clone();
        for tx in &block.transactions {
            let receipt = execute(&mut next, tx, number, timestamp, strip_logs);
            debug!(
                "Sealed {} in block {} ({:?}, gas {})",
                tx_hash_hex(&receipt.tx_hash),
                number,
                receipt.status,
                receipt.gas_used
            );
            next.receipts.insert(receipt.tx_hash, receipt);
        }

        self.persistence.save_chain_state(Some(&block), &next)?;
        inner.state = next;
        inner.pending.clear();
        inner.blocks.push(block);
        Ok(number)
    }

    async fn rpc_preamble(&self) -> Result<(), TransportError> {
        let faults = self.faults.read().clone();
        if !faults.latency.is_zero() {
            tokio::time::sleep(faults.latency).await;
        }
        if faults.offline {
            return Err(TransportError::Unreachable("local chain is offline".to_string()));
        }
        Ok(())
    }
}

/// Applies one transaction to `state`. Reverted calls still consume the nonce
/// and are charged gas, but leave the registry untouched.
fn execute(state: &mut ChainState, stx: &SignedTransaction, block_number: u64, timestamp: u64, strip_logs: bool) -> TxReceipt {
    let tx = &stx.tx;
    let tx_hash = stx.hash();
    *state.nonces.entry(tx.from).or_insert(0) += 1;

    let outcome: Result<RegistryEvent, RevertKind> = match state.contracts.get_mut(&tx.to) {
        None => Err(RevertKind::Other(format!("no contract at {}", tx.to))),
        Some(_) if tx.gas_limit < gas_for(&tx.call) => Err(RevertKind::Other("out of gas".to_string())),
        Some(registry) => match &tx.call {
            RegistryCall::Certify { fingerprint } => {
                registry.certify(tx.from, fingerprint, timestamp).map(|(_, event)| event)
            }
            RegistryCall::Transfer { id, new_owner } => registry.transfer(tx.from, *id, *new_owner),
        },
    };

    let (status, gas_used, logs) = match outcome {
        Ok(event) => {
            let logs = if strip_logs {
                Vec::new()
            } else {
                Log::from_event(tx.to, &event).map(|log| vec![log]).unwrap_or_default()
            };
            (TxStatus::Success, gas_for(&tx.call), logs)
        }
        Err(kind) => {
            let gas = (BASE_GAS + REVERT_GAS).min(tx.gas_limit);
            (TxStatus::Reverted(kind.reason().to_string()), gas, Vec::new())
        }
    };

    let fee = gas_used as u128 * state.gas_price;
    let balance = state.balances.entry(tx.from).or_insert(0);
    *balance = balance.saturating_sub(fee);

    TxReceipt {
        tx_hash,
        block_number,
        gas_used,
        status,
        logs,
    }
}

fn now_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[async_trait]
impl ChainTransport for LocalChain {
    async fn chain_id(&self) -> Result<u64, TransportError> {
        self.rpc_preamble().await?;
        Ok(self.inner.read().state.chain_id)
    }

    async fn block_number(&self) -> Result<u64, TransportError> {
        self.rpc_preamble().await?;
        Ok(self.height())
    }

    async fn balance(&self, account: &AccountId) -> Result<u128, TransportError> {
        self.rpc_preamble().await?;
        Ok(self.inner.read().state.balance(account))
    }

    async fn pending_nonce(&self, account: &AccountId) -> Result<u64, TransportError> {
        self.rpc_preamble().await?;
        Ok(self.inner.read().pending_nonce(account))
    }

    async fn send_transaction(&self, stx: SignedTransaction) -> Result<TxHash, TransportError> {
        self.rpc_preamble().await?;
        stx.verify().map_err(|e| TransportError::Rejected(e.to_string()))?;

        let tx_hash = stx.hash();
        let sealed = {
            let mut inner = self.inner.write();
            let tx = &stx.tx;

            if tx.chain_id != inner.state.chain_id {
                return Err(TransportError::Rejected(format!(
                    "chain id {} does not match {}",
                    tx.chain_id, inner.state.chain_id
                )));
            }

            let expected = inner.pending_nonce(&tx.from);
            if tx.nonce != expected {
                return Err(TransportError::Nonce {
                    expected,
                    got: tx.nonce,
                });
            }

            let required = tx.gas_limit as u128 * inner.state.gas_price;
            let balance = inner.state.balance(&tx.from);
            if balance < required {
                return Err(TransportError::InsufficientFunds { balance, required });
            }

            // Dry run against the latest state, the way gas estimation surfaces reverts.
            let mut scratch = inner
                .state
                .contracts
                .get(&tx.to)
                .cloned()
                .ok_or(TransportError::NoContract(tx.to))?;
            let dry_run = match &tx.call {
                RegistryCall::Certify { fingerprint } => scratch.certify(tx.from, fingerprint, now_secs()).map(|_| ()),
                RegistryCall::Transfer { id, new_owner } => scratch.transfer(tx.from, *id, *new_owner).map(|_| ()),
            };
            if let Err(kind) = dry_run {
                return Err(TransportError::Reverted(kind.reason().to_string()));
            }
            if tx.gas_limit < gas_for(&tx.call) {
                return Err(TransportError::Reverted("out of gas".to_string()));
            }

            inner.pending.push(stx);
            if inner.mode == MiningMode::Auto {
                if let Err(e) = self.seal(&mut inner) {
                    // Not applied anywhere, so the submission is dropped as a whole.
                    inner.pending.pop();
                    return Err(TransportError::Rejected(format!("failed to seal block: {}", e)));
                }
                true
            } else {
                false
            }
        };

        if sealed {
            self.block_notify.notify_waiters();
        }
        debug!("Accepted transaction {}", tx_hash_hex(&tx_hash));
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash, confirmations: u64) -> Result<TxReceipt, TransportError> {
        self.rpc_preamble().await?;
        loop {
            // Register interest before checking so a block sealed in between is not missed.
            let notified = self.block_notify.notified();
            {
                if self.faults.read().offline {
                    return Err(TransportError::Unreachable("local chain is offline".to_string()));
                }
                let inner = self.inner.read();
                match inner.state.receipts.get(tx_hash) {
                    Some(receipt) => {
                        let depth = inner.height().saturating_sub(receipt.block_number) + 1;
                        if depth >= confirmations {
                            return Ok(receipt.clone());
                        }
                    }
                    None if !inner.pending.iter().any(|tx| tx.hash() == *tx_hash) => {
                        return Err(TransportError::UnknownTransaction(tx_hash_hex(tx_hash)));
                    }
                    None => {}
                }
            }
            notified.await;
        }
    }

    async fn call(&self, contract: &AccountId, query: RegistryQuery) -> Result<QueryResponse, TransportError> {
        self.rpc_preamble().await?;
        let inner = self.inner.read();
        let registry = inner
            .state
            .contracts
            .get(contract)
            .ok_or(TransportError::NoContract(*contract))?;

        Ok(match query {
            RegistryQuery::Verify { id } => QueryResponse::Record(registry.verify(id)),
            RegistryQuery::CheckExists { fingerprint } => {
                let (exists, id) = registry.check_exists(&fingerprint);
                QueryResponse::Exists { exists, id }
            }
            RegistryQuery::ListByOwner { account } => QueryResponse::Ids(registry.list_by_owner(&account)),
            RegistryQuery::DocumentCount => QueryResponse::Count(registry.document_count()),
        })
    }
}
