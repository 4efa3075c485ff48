//! Password-sealed envelopes.
//!
//! Wire format (bit-exact, no length prefixes):
//!
//! ```text
//! [salt: 64][iv: 16][auth tag: 16][ciphertext: n]
//! ```
//!
//! The key is derived with scrypt from the password and the salt, and the
//! body is sealed with AES-256-GCM using the 16-byte IV as nonce and no
//! associated data. The ciphertext has the same length as the plaintext.

use crate::error::{CertError, Result};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub const ALGORITHM: &str = "aes-256-gcm";
pub const KDF: &str = "scrypt";

pub const KEY_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 64;
pub const IV_LENGTH: usize = 16;
pub const TAG_LENGTH: usize = 16;
pub const HEADER_LENGTH: usize = SALT_LENGTH + IV_LENGTH + TAG_LENGTH;

/// AES-256-GCM with a 128-bit nonce.
type EnvelopeCipher = AesGcm<Aes256, U16>;

/// scrypt cost parameters. Not carried in the envelope, so both ends must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub log_n: u8,
    pub r: u32,
    pub p: u32,
}

impl Default for KdfParams {
    /// N = 16384, r = 8, p = 1.
    fn default() -> Self {
        Self { log_n: 14, r: 8, p: 1 }
    }
}

/// A single encrypted artifact, split into its wire fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    pub salt: [u8; SALT_LENGTH],
    pub iv: [u8; IV_LENGTH],
    pub auth_tag: [u8; TAG_LENGTH],
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Serialized length: always the header plus the plaintext length.
    pub fn encoded_len(&self) -> usize {
        HEADER_LENGTH + self.ciphertext.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.auth_tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Splits a serialized envelope at the fixed header offsets.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LENGTH {
            return Err(CertError::MalformedEnvelope { len: bytes.len() });
        }
        let (salt, rest) = bytes.split_at(SALT_LENGTH);
        let (iv, rest) = rest.split_at(IV_LENGTH);
        let (auth_tag, ciphertext) = rest.split_at(TAG_LENGTH);

        let mut envelope = EncryptedEnvelope {
            salt: [0u8; SALT_LENGTH],
            iv: [0u8; IV_LENGTH],
            auth_tag: [0u8; TAG_LENGTH],
            ciphertext: ciphertext.to_vec(),
        };
        envelope.salt.copy_from_slice(salt);
        envelope.iv.copy_from_slice(iv);
        envelope.auth_tag.copy_from_slice(auth_tag);
        Ok(envelope)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeMetadata {
    pub algorithm: String,
    pub kdf: String,
    pub salt_len: usize,
    pub iv_len: usize,
    pub tag_len: usize,
    pub original_size: usize,
    pub encrypted_size: usize,
}

/// Output of [`EnvelopeCodec::encrypt`]: the serialized envelope plus its metadata.
#[derive(Debug, Clone)]
pub struct SealedEnvelope {
    pub bytes: Vec<u8>,
    pub metadata: EnvelopeMetadata,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvelopeCodec {
    params: KdfParams,
}

impl EnvelopeCodec {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    fn derive_key(&self, password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LENGTH]>> {
        let params = scrypt::Params::new(self.params.log_n, self.params.r, self.params.p, KEY_LENGTH)
            .map_err(|e| CertError::Crypto(format!("Invalid scrypt parameters: {}", e)))?;
        let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
        scrypt::scrypt(password.as_bytes(), salt, &params, &mut key[..])
            .map_err(|e| CertError::Crypto(format!("Key derivation failed: {}", e)))?;
        Ok(key)
    }

    fn cipher(key: &[u8; KEY_LENGTH]) -> Result<EnvelopeCipher> {
        EnvelopeCipher::new_from_slice(key)
            .map_err(|e| CertError::Crypto(format!("Invalid key length: {}", e)))
    }

    /// Seals `plaintext` under a fresh salt and IV.
    pub fn seal(&self, plaintext: &[u8], password: &str) -> Result<EncryptedEnvelope> {
        let mut salt = [0u8; SALT_LENGTH];
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);

        let key = self.derive_key(password, &salt)?;
        let cipher = Self::cipher(&key)?;

        let mut ciphertext = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::<U16>::from_slice(&iv), b"", &mut ciphertext)
            .map_err(|_| CertError::Crypto("Encryption failed".to_string()))?;

        let mut auth_tag = [0u8; TAG_LENGTH];
        auth_tag.copy_from_slice(&tag);

        Ok(EncryptedEnvelope {
            salt,
            iv,
            auth_tag,
            ciphertext,
        })
    }

    /// Opens a parsed envelope. A tag mismatch is the only failure signal and
    /// cannot tell a wrong password from corrupted data.
    pub fn open(&self, envelope: &EncryptedEnvelope, password: &str) -> Result<Vec<u8>> {
        let key = self.derive_key(password, &envelope.salt)?;
        let cipher = Self::cipher(&key)?;

        let mut plaintext = envelope.ciphertext.clone();
        cipher
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&envelope.iv),
                b"",
                &mut plaintext,
                Tag::<U16>::from_slice(&envelope.auth_tag),
            )
            .map_err(|_| CertError::AuthenticationFailure)?;
        Ok(plaintext)
    }

    pub fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<SealedEnvelope> {
        let envelope = self.seal(plaintext, password)?;
        let bytes = envelope.to_bytes();
        let metadata = EnvelopeMetadata {
            algorithm: ALGORITHM.to_string(),
            kdf: KDF.to_string(),
            salt_len: SALT_LENGTH,
            iv_len: IV_LENGTH,
            tag_len: TAG_LENGTH,
            original_size: plaintext.len(),
            encrypted_size: bytes.len(),
        };
        Ok(SealedEnvelope { bytes, metadata })
    }

    pub fn decrypt(&self, envelope: &[u8], password: &str) -> Result<Vec<u8>> {
        let parsed = EncryptedEnvelope::from_bytes(envelope)?;
        self.open(&parsed, password)
    }
}

/// Encrypts with the default scrypt parameters.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<SealedEnvelope> {
    EnvelopeCodec::default().encrypt(plaintext, password)
}

/// Decrypts with the default scrypt parameters.
pub fn decrypt(envelope: &[u8], password: &str) -> Result<Vec<u8>> {
    EnvelopeCodec::default().decrypt(envelope, password)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_codec() -> EnvelopeCodec {
        EnvelopeCodec::new(KdfParams { log_n: 10, r: 8, p: 1 })
    }

    const PASSWORD: &str = "correct horse battery staple";

    #[test]
    fn test_round_trip() {
        let codec = fast_codec();
        let plaintext = b"land title deed, parcel 42";
        let sealed = codec.encrypt(plaintext, PASSWORD).unwrap();
        assert_eq!(codec.decrypt(&sealed.bytes, PASSWORD).unwrap(), plaintext);
    }

    #[test]
    fn test_metadata() {
        let codec = fast_codec();
        let sealed = codec.encrypt(b"abc", PASSWORD).unwrap();

        assert_eq!(sealed.metadata.algorithm, "aes-256-gcm");
        assert_eq!(sealed.metadata.kdf, "scrypt");
        assert_eq!(sealed.metadata.original_size, 3);
        assert_eq!(sealed.metadata.encrypted_size, 99);
        assert_eq!(sealed.bytes.len(), 99);
    }

    #[test]
    fn test_empty_plaintext_yields_header_only() {
        let codec = fast_codec();
        let sealed = codec.encrypt(b"", PASSWORD).unwrap();
        assert_eq!(sealed.bytes.len(), HEADER_LENGTH);
        assert!(codec.decrypt(&sealed.bytes, PASSWORD).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_salt_and_iv() {
        let codec = fast_codec();
        let a = codec.seal(b"same input", PASSWORD).unwrap();
        let b = codec.seal(b"same input", PASSWORD).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.to_bytes(), b.to_bytes());
    }

    #[test]
    fn test_field_offsets() {
        let codec = fast_codec();
        let envelope = codec.seal(b"offsets", PASSWORD).unwrap();
        let bytes = envelope.to_bytes();

        assert_eq!(&bytes[..64], &envelope.salt);
        assert_eq!(&bytes[64..80], &envelope.iv);
        assert_eq!(&bytes[80..96], &envelope.auth_tag);
        assert_eq!(&bytes[96..], envelope.ciphertext.as_slice());
        assert_eq!(EncryptedEnvelope::from_bytes(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_short_envelope_is_malformed() {
        let codec = fast_codec();
        let err = codec.decrypt(&[0u8; HEADER_LENGTH - 1], PASSWORD).unwrap_err();
        assert_eq!(err, CertError::MalformedEnvelope { len: HEADER_LENGTH - 1 });
    }

    #[test]
    fn test_wrong_password() {
        let codec = fast_codec();
        let sealed = codec.encrypt(b"secret", PASSWORD).unwrap();
        let err = codec.decrypt(&sealed.bytes, "not the password").unwrap_err();
        assert_eq!(err, CertError::AuthenticationFailure);
    }

    #[test]
    fn test_mismatched_cost_parameters_fail_authentication() {
        let sealed = fast_codec().encrypt(b"secret", PASSWORD).unwrap();
        let other = EnvelopeCodec::new(KdfParams { log_n: 11, r: 8, p: 1 });
        assert_eq!(
            other.decrypt(&sealed.bytes, PASSWORD).unwrap_err(),
            CertError::AuthenticationFailure
        );
    }

    #[test]
    fn test_tampered_salt_fails() {
        let codec = fast_codec();
        let mut bytes = codec.encrypt(b"secret", PASSWORD).unwrap().bytes;
        bytes[0] ^= 0x01;
        assert_eq!(codec.decrypt(&bytes, PASSWORD).unwrap_err(), CertError::AuthenticationFailure);
    }

    #[test]
    fn test_default_params_round_trip() {
        let sealed = encrypt(b"interop", PASSWORD).unwrap();
        assert_eq!(decrypt(&sealed.bytes, PASSWORD).unwrap(), b"interop");
    }
}
