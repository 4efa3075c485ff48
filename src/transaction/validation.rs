//! Local input checks run before any network call.

use crate::crypto::AccountId;
use crate::error::{CertError, ValidationError};
use crate::registry::DocumentId;

pub fn validate_fingerprint(fingerprint: &str) -> Result<&str, CertError> {
    if fingerprint.trim().is_empty() {
        return Err(ValidationError::InvalidFingerprint.into());
    }
    Ok(fingerprint)
}

pub fn validate_document_id(id: DocumentId) -> Result<DocumentId, CertError> {
    if id == 0 {
        return Err(ValidationError::InvalidId(id.to_string()).into());
    }
    Ok(id)
}

/// Parses user-supplied ids; rejects non-numeric input and anything below 1.
pub fn parse_document_id(raw: &str) -> Result<DocumentId, CertError> {
    let id = raw
        .trim()
        .parse::<DocumentId>()
        .map_err(|_| CertError::from(ValidationError::InvalidId(raw.to_string())))?;
    validate_document_id(id)
}

pub fn parse_account(raw: &str) -> Result<AccountId, CertError> {
    raw.trim().parse()
}

/// A transfer recipient must be well formed and not the null account.
pub fn parse_recipient(raw: &str) -> Result<AccountId, CertError> {
    let account = parse_account(raw)?;
    if account.is_zero() {
        return Err(ValidationError::InvalidAddress(raw.to_string()).into());
    }
    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint() {
        assert_eq!(validate_fingerprint("QmHash").unwrap(), "QmHash");
        assert_eq!(
            validate_fingerprint("").unwrap_err(),
            CertError::Validation(ValidationError::InvalidFingerprint)
        );
        assert!(validate_fingerprint("   ").is_err());
    }

    #[test]
    fn test_document_ids() {
        assert_eq!(parse_document_id("42").unwrap(), 42);
        assert_eq!(parse_document_id(" 7 ").unwrap(), 7);
        for bad in ["0", "-1", "abc", "", "1.5"] {
            assert!(
                matches!(parse_document_id(bad), Err(CertError::Validation(ValidationError::InvalidId(_)))),
                "{}",
                bad
            );
        }
        assert!(validate_document_id(0).is_err());
    }

    #[test]
    fn test_recipient() {
        let account = AccountId::from_label("bob");
        assert_eq!(parse_recipient(&account.to_hex()).unwrap(), account);
        assert!(parse_recipient("invalid-address").is_err());
        assert!(matches!(
            parse_recipient(&AccountId::ZERO.to_hex()),
            Err(CertError::Validation(ValidationError::InvalidAddress(_)))
        ));
    }
}
