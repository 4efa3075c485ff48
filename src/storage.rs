//! Content-addressed storage for encrypted envelopes
//!
//! The registry certifies the content id returned by [`ContentStore::store`],
//! never the raw bytes.

use crate::error::CertError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const MEMORY_SCHEME: &str = "memory://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_id: String,
    pub url: String,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn store(&self, bytes: &[u8]) -> Result<StoredObject, CertError>;

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CertError>;
}

/// Process-local store. Content ids are `sha256-<hex>` of the stored bytes,
/// so storing the same envelope twice yields the same id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryContentStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content_id(bytes: &[u8]) -> String {
        format!("sha256-{}", hex::encode(Sha256::digest(bytes)))
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn store(&self, bytes: &[u8]) -> Result<StoredObject, CertError> {
        let content_id = Self::content_id(bytes);
        self.objects
            .write()
            .await
            .entry(content_id.clone())
            .or_insert_with(|| bytes.to_vec());

        Ok(StoredObject {
            url: format!("{}{}", MEMORY_SCHEME, content_id),
            content_id,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CertError> {
        let content_id = url
            .strip_prefix(MEMORY_SCHEME)
            .ok_or_else(|| CertError::Storage(format!("Unsupported storage URL: {}", url)))?;
        self.objects
            .read()
            .await
            .get(content_id)
            .cloned()
            .ok_or_else(|| CertError::Storage(format!("Object not found: {}", content_id)))
    }
}
