//! Snapshot persistence for the local development chain

use crate::chain::{Block, BlockHeader, ChainState};
use crate::error::CertError;
use crate::transaction::SignedTransaction;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

/// Abstraction for persistence backends. Implementations must save a sealed
/// block together with the state it produced atomically.
pub trait Persistence: Send + Sync {
    /// `block` is `None` for state changes outside a block (deployments, funding).
    fn save_chain_state(&self, block: Option<&Block>, state: &ChainState) -> Result<(), CertError>;

    /// `None` when nothing has been saved yet.
    fn load_chain(&self) -> Result<Option<(Vec<Block>, ChainState)>, CertError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, CertError> {
        let conn = Connection::open(path)
            .map_err(|e| CertError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocks (
                number INTEGER PRIMARY KEY,
                hash BLOB NOT NULL,
                parent_hash BLOB NOT NULL,
                timestamp INTEGER NOT NULL,
                tx_root BLOB NOT NULL,
                transactions BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| CertError::Database(format!("Failed to create blocks table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| CertError::Database(format!("Failed to create metadata table: {}", e)))?;

        Ok(Database { conn: Mutex::new(conn) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, CertError> {
        self.conn
            .lock()
            .map_err(|_| CertError::Database("Mutex poisoned".to_string()))
    }

    fn load_blocks(conn: &Connection) -> Result<Vec<Block>, CertError> {
        let mut stmt = conn
            .prepare("SELECT number, parent_hash, timestamp, tx_root, transactions FROM blocks ORDER BY number ASC")
            .map_err(|e| CertError::Database(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                let number: i64 = row.get(0)?;
                let parent_hash: Vec<u8> = row.get(1)?;
                let timestamp: i64 = row.get(2)?;
                let tx_root: Vec<u8> = row.get(3)?;
                let transactions: Vec<u8> = row.get(4)?;
                Ok((number, parent_hash, timestamp, tx_root, transactions))
            })
            .map_err(|e| CertError::Database(format!("Failed to query blocks: {}", e)))?;

        let mut blocks = Vec::new();
        for row in rows {
            let (number, parent_hash_vec, timestamp, tx_root_vec, tx_bytes) =
                row.map_err(|e| CertError::Database(format!("Failed to load block: {}", e)))?;

            let parent_hash: [u8; 32] = parent_hash_vec
                .try_into()
                .map_err(|_| CertError::Database(format!("Corrupt parent hash in block {}", number)))?;
            let tx_root: [u8; 32] = tx_root_vec
                .try_into()
                .map_err(|_| CertError::Database(format!("Corrupt tx root in block {}", number)))?;
            let transactions: Vec<SignedTransaction> = bincode::deserialize(&tx_bytes)?;

            blocks.push(Block {
                header: BlockHeader {
                    number: number as u64,
                    timestamp: timestamp as u64,
                    parent_hash,
                    tx_root,
                },
                transactions,
            });
        }
        Ok(blocks)
    }
}

impl Persistence for Database {
    fn save_chain_state(&self, block: Option<&Block>, state: &ChainState) -> Result<(), CertError> {
        let state_bytes = bincode::serialize(state)?;

        let conn_guard = self.lock()?;
        let tx = conn_guard
            .unchecked_transaction()
            .map_err(|e| CertError::Database(format!("Failed to start transaction: {}", e)))?;

        if let Some(block) = block {
            tx.execute(
                "INSERT OR REPLACE INTO blocks (number, hash, parent_hash, timestamp, tx_root, transactions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    block.header.number as i64,
                    block.hash().to_vec(),
                    block.header.parent_hash.to_vec(),
                    block.header.timestamp as i64,
                    block.header.tx_root.to_vec(),
                    bincode::serialize(&block.transactions)?,
                ],
            )
            .map_err(|e| CertError::Database(format!("Failed to save block: {}", e)))?;
        }

        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('chain_state', ?1)",
            params![state_bytes],
        )
        .map_err(|e| CertError::Database(format!("Failed to save chain state: {}", e)))?;

        tx.commit()
            .map_err(|e| CertError::Database(format!("Failed to commit transaction: {}", e)))?;
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<(Vec<Block>, ChainState)>, CertError> {
        let conn_guard = self.lock()?;
        let state_bytes: Option<Vec<u8>> = conn_guard
            .query_row("SELECT value FROM metadata WHERE key = 'chain_state'", [], |row| row.get(0))
            .optional()
            .map_err(|e| CertError::Database(format!("Failed to read chain state: {}", e)))?;

        let Some(state_bytes) = state_bytes else {
            return Ok(None);
        };
        let state: ChainState = bincode::deserialize(&state_bytes)?;
        let blocks = Self::load_blocks(&conn_guard)?;
        Ok(Some((blocks, state)))
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct InMemoryPersistence {
    pub blocks: Arc<Mutex<Vec<Block>>>,
    pub state: Arc<Mutex<Option<ChainState>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn save_chain_state(&self, block: Option<&Block>, state: &ChainState) -> Result<(), CertError> {
        if let Some(block) = block {
            let mut blocks = self.blocks.lock().map_err(|_| CertError::Database("Mutex poisoned".to_string()))?;
            blocks.retain(|b| b.header.number != block.header.number);
            blocks.push(block.clone());
        }
        let mut st = self.state.lock().map_err(|_| CertError::Database("Mutex poisoned".to_string()))?;
        *st = Some(state.clone());
        Ok(())
    }

    fn load_chain(&self) -> Result<Option<(Vec<Block>, ChainState)>, CertError> {
        let st = self.state.lock().map_err(|_| CertError::Database("Mutex poisoned".to_string()))?;
        let Some(state) = st.clone() else {
            return Ok(None);
        };
        let blocks = self.blocks.lock().map_err(|_| CertError::Database("Mutex poisoned".to_string()))?;
        Ok(Some((blocks.clone(), state)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AccountId;

    fn sample_state() -> ChainState {
        let mut state = ChainState::new(1337);
        state.balances.insert(AccountId::from_label("alice"), 42);
        state
    }

    #[test]
    fn test_database_open() {
        let db = Database::open(":memory:").unwrap();
        assert!(db.conn.lock().unwrap().is_autocommit());
        assert!(db.load_chain().unwrap().is_none());
    }

    #[test]
    fn test_database_round_trip() {
        let db = Database::open(":memory:").unwrap();
        let genesis = Block::genesis(1_700_000_000);
        let next = Block::new(1, genesis.hash(), 1_700_000_001, Vec::new());
        let state = sample_state();

        db.save_chain_state(Some(&genesis), &state).unwrap();
        db.save_chain_state(Some(&next), &state).unwrap();

        let (blocks, loaded) = db.load_chain().unwrap().unwrap();
        assert_eq!(blocks, vec![genesis, next]);
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_in_memory_state_without_block() {
        let mem = InMemoryPersistence::new();
        assert!(mem.load_chain().unwrap().is_none());

        mem.save_chain_state(None, &sample_state()).unwrap();
        let (blocks, state) = mem.load_chain().unwrap().unwrap();
        assert!(blocks.is_empty());
        assert_eq!(state, sample_state());
    }
}
