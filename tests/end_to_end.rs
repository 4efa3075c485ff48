//! Seal, store, certify, verify and transfer a document end to end

use async_trait::async_trait;
use certvault::chain::LocalChain;
use certvault::client::{CertificationStatus, ChainClient};
use certvault::config::Config;
use certvault::crypto::{AccountId, KeyPair};
use certvault::envelope::{EnvelopeCodec, KdfParams};
use certvault::error::CertError;
use certvault::password::{generate_secure_password, hash_password, verify_password};
use certvault::storage::{ContentStore, InMemoryContentStore, StoredObject};
use certvault::units::WEI_PER_UNIT;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Hands out sequential `cid-N` ids.
#[derive(Default)]
struct CountingStore {
    objects: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl ContentStore for CountingStore {
    async fn store(&self, bytes: &[u8]) -> Result<StoredObject, CertError> {
        let mut objects = self.objects.lock().await;
        objects.push(bytes.to_vec());
        let content_id = format!("cid-{}", objects.len());
        Ok(StoredObject {
            url: format!("mock://{}", content_id),
            content_id,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, CertError> {
        let index: usize = url
            .strip_prefix("mock://cid-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| CertError::Storage(format!("unknown url {}", url)))?;
        let objects = self.objects.lock().await;
        index
            .checked_sub(1)
            .and_then(|i| objects.get(i))
            .cloned()
            .ok_or_else(|| CertError::Storage(format!("missing object {}", url)))
    }
}

fn setup() -> Result<(Arc<LocalChain>, ChainClient), Box<dyn std::error::Error>> {
    let chain = Arc::new(LocalChain::new(31337));
    let registry = chain.deploy_registry(AccountId::from_label("deployer"))?;
    let signer = KeyPair::generate();
    chain.fund(signer.account(), WEI_PER_UNIT)?;

    let config = Config::new("devnet://memory", 31337, registry);
    let client = ChainClient::new(&config, chain.clone(), signer)?;
    Ok((chain, client))
}

#[tokio::test]
async fn test_seal_store_certify_transfer() -> Result<(), Box<dyn std::error::Error>> {
    let codec = EnvelopeCodec::new(KdfParams { log_n: 10, r: 8, p: 1 });
    let password = generate_secure_password();
    let plaintext = vec![0x42u8; 100_000];

    let sealed = codec.encrypt(&plaintext, &password)?;
    assert_eq!(sealed.bytes.len(), 100_096);

    let store = CountingStore::default();
    let object = store.store(&sealed.bytes).await?;
    assert_eq!(object.content_id, "cid-1");

    let (_chain, client) = setup()?;
    let receipt = client.certify_remote(&object.content_id).await?;
    assert_eq!(receipt.document_id, Some(1));

    match client.verify_remote(1).await? {
        CertificationStatus::Found { fingerprint, owner, .. } => {
            assert_eq!(fingerprint, "cid-1");
            assert_eq!(owner, client.signer());
        }
        other => panic!("expected document 1 to exist, got {:?}", other),
    }

    let recipient = AccountId::from_label("recipient");
    client.transfer_remote(1, &recipient.to_hex()).await?;
    match client.verify_remote(1).await? {
        CertificationStatus::Found { owner, .. } => assert_eq!(owner, recipient),
        other => panic!("expected document 1 to exist, got {:?}", other),
    }

    // The stored envelope still opens with the original password.
    let fetched = store.fetch(&object.url).await?;
    assert_eq!(codec.decrypt(&fetched, &password)?, plaintext);
    Ok(())
}

#[tokio::test]
async fn test_content_addressed_store_dedupes_certifications() -> Result<(), Box<dyn std::error::Error>> {
    let codec = EnvelopeCodec::new(KdfParams { log_n: 10, r: 8, p: 1 });
    let store = InMemoryContentStore::new();
    let (_chain, client) = setup()?;

    let sealed = codec.encrypt(b"contract scan", "pw")?;
    let object = store.store(&sealed.bytes).await?;
    assert_eq!(client.check_exists_remote(&object.content_id).await?, None);

    client.certify_remote(&object.content_id).await?;
    let again = store.store(&sealed.bytes).await?;
    assert_eq!(client.check_exists_remote(&again.content_id).await?, Some(1));
    Ok(())
}

#[test]
fn test_password_verifier() -> Result<(), Box<dyn std::error::Error>> {
    let password = generate_secure_password();
    assert_eq!(password.len(), 44);

    let stored = hash_password(&password)?;
    assert!(stored.starts_with("$argon2id$"));
    assert!(verify_password(&password, &stored));
    assert!(!verify_password("guess", &stored));
    assert!(!verify_password(&password, "not a phc string"));
    Ok(())
}
