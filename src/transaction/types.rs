/// Transaction types for the registry wire protocol
use crate::crypto::{verify_signature, AccountId, KeyPair};
use crate::error::CertError;
use crate::registry::{DocumentId, DocumentRecord, RegistryEvent};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type TxHash = [u8; 32];

/// Maximum transaction size in bytes (100KB) to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 100_000;

pub fn tx_hash_hex(hash: &TxHash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// State-changing registry calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryCall {
    Certify { fingerprint: String },
    Transfer { id: DocumentId, new_owner: AccountId },
}

/// Read-only registry calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryQuery {
    Verify { id: DocumentId },
    CheckExists { fingerprint: String },
    ListByOwner { account: AccountId },
    DocumentCount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryResponse {
    Record(DocumentRecord),
    Exists { exists: bool, id: DocumentId },
    Ids(Vec<DocumentId>),
    Count(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub chain_id: u64,
    pub from: AccountId,
    /// Registry contract address.
    pub to: AccountId,
    pub nonce: u64,
    pub gas_limit: u64,
    pub call: RegistryCall,
}

impl Transaction {
    pub fn signing_bytes(&self) -> Result<Vec<u8>, CertError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn sign(self, keypair: &KeyPair) -> Result<SignedTransaction, CertError> {
        let signature = keypair.sign(&self.signing_bytes()?)?;
        Ok(SignedTransaction {
            tx: self,
            public_key: keypair.public_key_bytes().to_vec(),
            signature: signature.to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx: Transaction,
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl SignedTransaction {
    pub fn hash(&self) -> TxHash {
        let mut hasher = Sha256::new();
        hasher.update(self.tx.chain_id.to_le_bytes());
        hasher.update(self.tx.from.0);
        hasher.update(self.tx.to.0);
        hasher.update(self.tx.nonce.to_le_bytes());
        hasher.update(self.tx.gas_limit.to_le_bytes());
        match &self.tx.call {
            RegistryCall::Certify { fingerprint } => {
                hasher.update(b"certify");
                hasher.update(fingerprint.as_bytes());
            }
            RegistryCall::Transfer { id, new_owner } => {
                hasher.update(b"transfer");
                hasher.update(id.to_le_bytes());
                hasher.update(new_owner.0);
            }
        }
        hasher.update(&self.signature);
        hasher.finalize().into()
    }

    /// Checks size, the signature, and that the signing key belongs to `from`.
    pub fn verify(&self) -> Result<(), CertError> {
        let serialized = bincode::serialize(self)?;
        if serialized.len() > MAX_TRANSACTION_SIZE {
            return Err(CertError::Crypto(format!(
                "Transaction too large: {} bytes (max: {})",
                serialized.len(),
                MAX_TRANSACTION_SIZE
            )));
        }

        verify_signature(&self.public_key, &self.tx.signing_bytes()?, &self.signature)?;

        let signer = AccountId::from_public_key(&self.public_key);
        if signer != self.tx.from {
            return Err(CertError::Crypto(format!(
                "Transaction signed by {} but sent from {}",
                signer, self.tx.from
            )));
        }
        Ok(())
    }
}

/// An event emitted by a contract, as carried in a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: AccountId,
    pub topic: String,
    pub data: Vec<u8>,
}

impl Log {
    pub fn from_event(address: AccountId, event: &RegistryEvent) -> Result<Self, CertError> {
        Ok(Log {
            address,
            topic: event.topic().to_string(),
            data: bincode::serialize(event)?,
        })
    }

    pub fn decode_event(&self) -> Result<RegistryEvent, CertError> {
        Ok(bincode::deserialize(&self.data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Reverted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    pub gas_used: u64,
    pub status: TxStatus,
    pub logs: Vec<Log>,
}

impl TxReceipt {
    /// Finds the first decodable certification event emitted by `registry`.
    pub fn certified_id(&self, registry: &AccountId) -> Option<DocumentId> {
        self.logs
            .iter()
            .filter(|log| log.address == *registry && log.topic == RegistryEvent::CERTIFIED_TOPIC)
            .find_map(|log| match log.decode_event() {
                Ok(RegistryEvent::DocumentCertified { id, .. }) => Some(id),
                _ => None,
            })
    }
}
