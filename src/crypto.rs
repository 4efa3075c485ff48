//! Signer keys and account identifiers for CertVault

use crate::error::{CertError, ValidationError};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub const ACCOUNT_ID_SIZE: usize = 20;

/// A 20-byte account identifier, rendered as `0x` followed by 40 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct AccountId(pub [u8; ACCOUNT_ID_SIZE]);

impl AccountId {
    /// The null account. Never a valid transfer target.
    pub const ZERO: AccountId = AccountId([0u8; ACCOUNT_ID_SIZE]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Derive an account from a compressed public key: last 20 bytes of its SHA-256.
    pub fn from_public_key(public_key_bytes: &[u8]) -> Self {
        let digest: [u8; 32] = Sha256::digest(public_key_bytes).into();
        let mut id = [0u8; ACCOUNT_ID_SIZE];
        id.copy_from_slice(&digest[32 - ACCOUNT_ID_SIZE..]);
        AccountId(id)
    }

    /// Deterministic account for a label. Useful for tests and fixtures.
    pub fn from_label(label: &str) -> Self {
        Self::from_public_key(label.as_bytes())
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for AccountId {
    type Err = CertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CertError::Validation(ValidationError::InvalidAddress(s.to_string()));
        let digits = s.strip_prefix("0x").ok_or_else(invalid)?;
        if digits.len() != ACCOUNT_ID_SIZE * 2 {
            return Err(invalid());
        }
        let mut id = [0u8; ACCOUNT_ID_SIZE];
        hex::decode_to_slice(digits, &mut id).map_err(|_| invalid())?;
        Ok(AccountId(id))
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CertError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                CertError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                CertError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    /// Parses a hex secret key, with or without a `0x` prefix.
    pub fn from_secret_hex(hex_str: &str) -> Result<Self, CertError> {
        let trimmed = hex_str.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(digits)
            .map_err(|e| CertError::Crypto(format!("Invalid hex secret key: {}", e)))?;
        Self::from_secret_bytes(&bytes)
    }

    pub fn account(&self) -> AccountId {
        AccountId::from_public_key(&self.public_key_bytes())
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs the SHA-256 digest of `message` and returns the compact signature.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], CertError> {
        let digest = Sha256::digest(message);
        let message = Message::from_digest_slice(&digest)
            .map_err(|e| CertError::Crypto(format!("Failed to create message: {}", e)))?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact())
    }
}

/// Verifies an ECDSA signature given the raw public key bytes, message, and signature bytes.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), CertError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(CertError::Crypto(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(CertError::Crypto(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| CertError::Crypto(format!("Invalid public key: {}", e)))?;

    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| CertError::Crypto(format!("Failed to create message: {}", e)))?;

    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| CertError::Crypto(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| CertError::Crypto("Signature verification failed".to_string()))
}
