use crate::transaction::SignedTransaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub type Sha256Hash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub number: u64,
    /// Seconds since the epoch.
    pub timestamp: u64,
    pub parent_hash: Sha256Hash,
    pub tx_root: Sha256Hash,
}

impl BlockHeader {
    pub fn hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.number.to_le_bytes());
        hasher.update(self.timestamp.to_le_bytes());
        hasher.update(self.parent_hash);
        hasher.update(self.tx_root);
        hasher.finalize().into()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<SignedTransaction>,
}

impl Block {
    pub fn genesis(timestamp: u64) -> Self {
        Block {
            header: BlockHeader {
                number: 0,
                timestamp,
                parent_hash: [0u8; 32],
                tx_root: Self::calculate_tx_root(&[]),
            },
            transactions: Vec::new(),
        }
    }

    pub fn new(number: u64, parent_hash: Sha256Hash, timestamp: u64, transactions: Vec<SignedTransaction>) -> Self {
        let tx_root = Self::calculate_tx_root(&transactions);
        Block {
            header: BlockHeader {
                number,
                timestamp,
                parent_hash,
                tx_root,
            },
            transactions,
        }
    }

    pub fn hash(&self) -> Sha256Hash {
        self.header.hash()
    }

    pub fn calculate_tx_root(transactions: &[SignedTransaction]) -> Sha256Hash {
        let mut hasher = Sha256::new();
        for tx in transactions {
            hasher.update(tx.hash());
        }
        hasher.finalize().into()
    }
}
