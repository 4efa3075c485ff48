use crate::crypto::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::document::{CertifiedDocument, DocumentId, DocumentRecord, RegistryEvent};
use super::revert::RevertKind;

/// Append-only ledger of certified fingerprints.
///
/// Two read paths are kept apart: `owner_index` records every id an
/// account has ever certified or received and is never pruned, while
/// [`CertifiedDocument::owner`] is the only source of current holdership.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    documents: BTreeMap<DocumentId, CertifiedDocument>,
    owner_index: BTreeMap<AccountId, Vec<DocumentId>>,
    document_count: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total certifications ever made; also the highest assigned id.
    pub fn document_count(&self) -> u64 {
        self.document_count
    }

    /// Records `fingerprint` under the next id. Duplicate fingerprints are
    /// accepted and receive a new id each time.
    pub fn certify(
        &mut self,
        caller: AccountId,
        fingerprint: &str,
        timestamp: u64,
    ) -> Result<(DocumentId, RegistryEvent), RevertKind> {
        if fingerprint.is_empty() {
            return Err(RevertKind::InvalidFingerprint);
        }

        let id = self.document_count + 1;
        self.documents.insert(
            id,
            CertifiedDocument {
                id,
                fingerprint: fingerprint.to_string(),
                owner: caller,
                timestamp,
                exists: true,
            },
        );
        self.owner_index.entry(caller).or_default().push(id);
        self.document_count = id;

        Ok((
            id,
            RegistryEvent::DocumentCertified {
                id,
                owner: caller,
                fingerprint: fingerprint.to_string(),
                timestamp,
            },
        ))
    }

    pub fn verify(&self, id: DocumentId) -> DocumentRecord {
        self.documents
            .get(&id)
            .map(DocumentRecord::from)
            .unwrap_or_else(DocumentRecord::missing)
    }

    /// Moves current ownership of `id` to `new_owner`. The previous owner's
    /// index entry is kept.
    pub fn transfer(
        &mut self,
        caller: AccountId,
        id: DocumentId,
        new_owner: AccountId,
    ) -> Result<RegistryEvent, RevertKind> {
        let doc = self
            .documents
            .get_mut(&id)
            .filter(|doc| doc.exists)
            .ok_or(RevertKind::DocumentNotFound)?;

        if doc.owner != caller {
            return Err(RevertKind::NotOwner);
        }
        if new_owner.is_zero() {
            return Err(RevertKind::InvalidAddress);
        }

        let from = doc.owner;
        doc.owner = new_owner;
        self.owner_index.entry(new_owner).or_default().push(id);

        Ok(RegistryEvent::DocumentTransferred {
            id,
            from,
            to: new_owner,
        })
    }

    /// Linear scan for the lowest id certified with `fingerprint`.
    pub fn check_exists(&self, fingerprint: &str) -> (bool, DocumentId) {
        self.documents
            .values()
            .find(|doc| doc.exists && doc.fingerprint == fingerprint)
            .map(|doc| (true, doc.id))
            .unwrap_or((false, 0))
    }

    /// Ids in insertion order, including ones the account no longer owns.
    pub fn list_by_owner(&self, account: &AccountId) -> Vec<DocumentId> {
        self.owner_index.get(account).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> (AccountId, AccountId, AccountId) {
        (
            AccountId::from_label("addr1"),
            AccountId::from_label("addr2"),
            AccountId::from_label("addr3"),
        )
    }

    const NOW: u64 = 1_700_000_000;

    #[test]
    fn test_new_registry_is_empty() {
        let registry = Registry::new();
        assert_eq!(registry.document_count(), 0);
    }

    #[test]
    fn test_certify_assigns_sequential_ids() {
        let (a, b, _) = accounts();
        let mut registry = Registry::new();

        assert_eq!(registry.certify(a, "QmHash1", NOW).unwrap().0, 1);
        assert_eq!(registry.document_count(), 1);
        assert_eq!(registry.certify(a, "QmHash2", NOW).unwrap().0, 2);
        assert_eq!(registry.certify(b, "QmHash3", NOW).unwrap().0, 3);
        assert_eq!(registry.document_count(), 3);
    }

    #[test]
    fn test_certify_emits_event() {
        let (a, _, _) = accounts();
        let mut registry = Registry::new();
        let (_, event) = registry.certify(a, "QmNwCvGU8pPQbC4oELG84nS6u8QF91kQcBncHc6GGFjT9C", NOW).unwrap();

        assert_eq!(
            event,
            RegistryEvent::DocumentCertified {
                id: 1,
                owner: a,
                fingerprint: "QmNwCvGU8pPQbC4oELG84nS6u8QF91kQcBncHc6GGFjT9C".to_string(),
                timestamp: NOW,
            }
        );
        assert_eq!(event.topic(), "DocumentCertified");
    }

    #[test]
    fn test_empty_fingerprint_rejected_without_side_effects() {
        let (a, _, _) = accounts();
        let mut registry = Registry::new();
        assert_eq!(registry.certify(a, "", NOW).unwrap_err(), RevertKind::InvalidFingerprint);
        assert_eq!(registry.document_count(), 0);
        assert!(registry.list_by_owner(&a).is_empty());
    }

    #[test]
    fn test_verify_existing_and_missing() {
        let (a, _, _) = accounts();
        let mut registry = Registry::new();
        registry.certify(a, "QmTestHash", NOW).unwrap();

        let record = registry.verify(1);
        assert_eq!(record.fingerprint, "QmTestHash");
        assert_eq!(record.owner, a);
        assert_eq!(record.timestamp, NOW);
        assert!(record.exists);

        let missing = registry.verify(999);
        assert_eq!(missing, DocumentRecord::missing());
        assert_eq!(registry.verify(0), DocumentRecord::missing());
    }

    #[test]
    fn test_list_by_owner_preserves_order() {
        let (a, b, c) = accounts();
        let mut registry = Registry::new();
        registry.certify(a, "QmHash1", NOW).unwrap();
        registry.certify(a, "QmHash2", NOW).unwrap();
        registry.certify(b, "QmHash3", NOW).unwrap();
        registry.certify(a, "QmHash4", NOW).unwrap();

        assert_eq!(registry.list_by_owner(&a), vec![1, 2, 4]);
        assert_eq!(registry.list_by_owner(&b), vec![3]);
        assert!(registry.list_by_owner(&c).is_empty());
    }

    #[test]
    fn test_transfer_by_owner() {
        let (a, b, _) = accounts();
        let mut registry = Registry::new();
        registry.certify(a, "QmTransferHash", NOW).unwrap();

        let event = registry.transfer(a, 1, b).unwrap();
        assert_eq!(event, RegistryEvent::DocumentTransferred { id: 1, from: a, to: b });
        assert_eq!(registry.verify(1).owner, b);
        assert!(registry.list_by_owner(&b).contains(&1));
    }

    #[test]
    fn test_transfer_rejections() {
        let (a, b, c) = accounts();
        let mut registry = Registry::new();
        registry.certify(a, "QmTransferHash", NOW).unwrap();

        assert_eq!(registry.transfer(b, 1, c).unwrap_err(), RevertKind::NotOwner);
        assert_eq!(registry.verify(1).owner, a);

        assert_eq!(registry.transfer(a, 1, AccountId::ZERO).unwrap_err(), RevertKind::InvalidAddress);
        assert_eq!(registry.transfer(a, 999, b).unwrap_err(), RevertKind::DocumentNotFound);
        assert_eq!(registry.verify(1).owner, a);
    }

    #[test]
    fn test_successive_transfers() {
        let (a, b, c) = accounts();
        let mut registry = Registry::new();
        registry.certify(a, "QmTransferHash", NOW).unwrap();

        registry.transfer(a, 1, b).unwrap();
        assert_eq!(registry.verify(1).owner, b);
        registry.transfer(b, 1, c).unwrap();
        assert_eq!(registry.verify(1).owner, c);

        assert_eq!(registry.transfer(a, 1, b).unwrap_err(), RevertKind::NotOwner);
    }

    #[test]
    fn test_transfer_keeps_history_in_owner_index() {
        let (a, b, _) = accounts();
        let mut registry = Registry::new();
        registry.certify(a, "QmHash1", NOW).unwrap();
        registry.transfer(a, 1, b).unwrap();

        assert_eq!(registry.list_by_owner(&a), vec![1]);
        assert_eq!(registry.list_by_owner(&b), vec![1]);

        registry.certify(a, "QmHash2", NOW).unwrap();
        assert_eq!(registry.list_by_owner(&a), vec![1, 2]);
        assert_eq!(registry.verify(1).owner, b);
    }

    #[test]
    fn test_check_exists_returns_lowest_id() {
        let (a, b, _) = accounts();
        let mut registry = Registry::new();
        registry.certify(a, "QmExistingHash", NOW).unwrap();
        registry.certify(b, "QmAnotherHash", NOW).unwrap();

        assert_eq!(registry.check_exists("QmExistingHash"), (true, 1));
        assert_eq!(registry.check_exists("QmNonExistingHash"), (false, 0));

        registry.certify(a, "QmTargetHash", NOW).unwrap();
        assert_eq!(registry.check_exists("QmTargetHash"), (true, 3));

        let (dup, _) = registry.certify(a, "QmExistingHash", NOW).unwrap();
        assert_eq!(dup, 4);
        assert_eq!(registry.check_exists("QmExistingHash"), (true, 1));
    }

    #[test]
    fn test_many_documents_for_one_account() {
        let (a, _, _) = accounts();
        let mut registry = Registry::new();
        for i in 0..10 {
            registry.certify(a, &format!("QmHash{}", i), NOW).unwrap();
        }
        assert_eq!(registry.list_by_owner(&a).len(), 10);
        assert_eq!(registry.document_count(), 10);
    }
}
