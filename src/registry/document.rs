use crate::crypto::AccountId;
use serde::{Deserialize, Serialize};

/// Registry-assigned document id. Assigned from 1 upwards and never reused.
pub type DocumentId = u64;

/// One certification record as stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertifiedDocument {
    pub id: DocumentId,
    pub fingerprint: String,
    pub owner: AccountId,
    /// Seconds since the epoch, taken from the block that certified it.
    pub timestamp: u64,
    pub exists: bool,
}

/// Result of a `verify` read. Unassigned ids yield [`DocumentRecord::missing`]
/// rather than an error, so callers must check `exists` first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub fingerprint: String,
    pub owner: AccountId,
    pub timestamp: u64,
    pub exists: bool,
}

impl DocumentRecord {
    pub fn missing() -> Self {
        Self {
            fingerprint: String::new(),
            owner: AccountId::ZERO,
            timestamp: 0,
            exists: false,
        }
    }
}

impl From<&CertifiedDocument> for DocumentRecord {
    fn from(doc: &CertifiedDocument) -> Self {
        Self {
            fingerprint: doc.fingerprint.clone(),
            owner: doc.owner,
            timestamp: doc.timestamp,
            exists: doc.exists,
        }
    }
}

/// Events emitted by state-changing registry calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    DocumentCertified {
        id: DocumentId,
        owner: AccountId,
        fingerprint: String,
        timestamp: u64,
    },
    DocumentTransferred {
        id: DocumentId,
        from: AccountId,
        to: AccountId,
    },
}

impl RegistryEvent {
    pub const CERTIFIED_TOPIC: &'static str = "DocumentCertified";
    pub const TRANSFERRED_TOPIC: &'static str = "DocumentTransferred";

    pub fn topic(&self) -> &'static str {
        match self {
            RegistryEvent::DocumentCertified { .. } => Self::CERTIFIED_TOPIC,
            RegistryEvent::DocumentTransferred { .. } => Self::TRANSFERRED_TOPIC,
        }
    }
}
