//! Password generation and verifier bookkeeping.
//!
//! Verifiers are independent of envelope key derivation and play no part in
//! confidentiality; they only let a server check a password before spending
//! the cost of a full decryption.

use crate::error::{CertError, Result};
use argon2::password_hash::{rand_core::OsRng as PhcRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

const GENERATED_PASSWORD_BYTES: usize = 32;
/// Derived length of `salt:hash` verifiers written before the switch to Argon2.
const LEGACY_HASH_BYTES: usize = 64;

/// 256 bits of OS randomness, base64 encoded (44 characters).
///
/// The caller must hand this to the owner once: it is never stored in a
/// recoverable form.
pub fn generate_secure_password() -> String {
    let mut bytes = [0u8; GENERATED_PASSWORD_BYTES];
    OsRng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}

/// Argon2id PHC string with a random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut PhcRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CertError::Crypto(format!("Password hashing failed: {}", e)))
}

/// Accepts Argon2 PHC strings and legacy scrypt `salt:hash` verifiers.
/// Malformed stored hashes verify as `false`.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(stored_hash) {
        return Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok();
    }
    match stored_hash.split_once(':') {
        Some((salt, hash)) => verify_legacy(password, salt, hash),
        None => false,
    }
}

/// scrypt (N = 2^14, r = 8, p = 1) keyed on the hex salt text itself.
fn verify_legacy(password: &str, salt: &str, hash_hex: &str) -> bool {
    let Ok(expected) = hex::decode(hash_hex) else {
        return false;
    };
    if salt.is_empty() || expected.len() != LEGACY_HASH_BYTES {
        return false;
    }
    let Ok(params) = scrypt::Params::new(14, 8, 1, LEGACY_HASH_BYTES) else {
        return false;
    };
    let mut derived = [0u8; LEGACY_HASH_BYTES];
    if scrypt::scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut derived).is_err() {
        return false;
    }
    derived.ct_eq(&expected[..]).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_password_shape() {
        let password = generate_secure_password();
        assert_eq!(password.len(), 44);
        assert_eq!(STANDARD.decode(&password).unwrap().len(), 32);
        assert_ne!(password, generate_secure_password());
    }

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_password("MySecret123!").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password("MySecret123!", &stored));
        assert!(!verify_password("wrong", &stored));
    }

    #[test]
    fn test_hashes_are_salted() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_malformed_hash_is_rejected() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("anything", ""));
    }

    #[test]
    fn test_legacy_scrypt_verifier() {
        let stored = "00112233445566778899aabbccddeeff:48b8cd480bb8c168c04b4d6a62e6196ed91ec7b4f661ee2d6f187ca2462840925a4e5d0246ff3faefb17c0d514450da16bde9fb2277dc35fa979ee14626ebc41";
        assert!(verify_password("MySecret123!", stored));
        assert!(!verify_password("MySecret123?", stored));
        assert!(!verify_password("MySecret123!", "00112233445566778899aabbccddeeff:48b8cd"));
        assert!(!verify_password("MySecret123!", ":48b8cd480bb8c168"));
    }
}
