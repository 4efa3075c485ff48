use serde::{Deserialize, Serialize};
use std::fmt;

/// Structured registry failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevertKind {
    InvalidFingerprint,
    NotOwner,
    DocumentNotFound,
    InvalidAddress,
    /// Any revert whose reason is not in [`known_reasons`], kept verbatim.
    Other(String),
}

/// Exact revert strings emitted by the registry. Matching is by equality only.
pub fn known_reasons() -> [(&'static str, RevertKind); 4] {
    [
        ("Hash IPFS vide", RevertKind::InvalidFingerprint),
        ("Vous n'etes pas le proprietaire", RevertKind::NotOwner),
        ("Document inexistant", RevertKind::DocumentNotFound),
        ("Adresse invalide", RevertKind::InvalidAddress),
    ]
}

impl RevertKind {
    pub fn from_reason(reason: &str) -> Self {
        known_reasons()
            .into_iter()
            .find(|(known, _)| *known == reason)
            .map(|(_, kind)| kind)
            .unwrap_or_else(|| RevertKind::Other(reason.to_string()))
    }

    /// The revert string the registry emits for this kind.
    pub fn reason(&self) -> &str {
        match self {
            RevertKind::Other(raw) => raw,
            known => known_reasons()
                .into_iter()
                .find(|(_, kind)| kind == known)
                .map(|(reason, _)| reason)
                .unwrap_or_default(),
        }
    }
}

impl fmt::Display for RevertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

impl std::error::Error for RevertKind {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_reasons_map_both_ways() {
        for (reason, kind) in known_reasons() {
            assert_eq!(RevertKind::from_reason(reason), kind);
            assert_eq!(kind.reason(), reason);
        }
    }

    #[test]
    fn test_unknown_reason_is_kept_verbatim() {
        let kind = RevertKind::from_reason("out of gas");
        assert_eq!(kind, RevertKind::Other("out of gas".to_string()));
        assert_eq!(kind.to_string(), "out of gas");
    }

    #[test]
    fn test_matching_is_exact_not_substring() {
        assert_eq!(
            RevertKind::from_reason("execution reverted: Adresse invalide"),
            RevertKind::Other("execution reverted: Adresse invalide".to_string())
        );
        assert_eq!(
            RevertKind::from_reason("adresse invalide"),
            RevertKind::Other("adresse invalide".to_string())
        );
    }
}
