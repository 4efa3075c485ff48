//! Integration tests for password-sealed envelopes

use certvault::envelope::{EncryptedEnvelope, EnvelopeCodec, KdfParams, HEADER_LENGTH, SALT_LENGTH};
use certvault::error::CertError;
use certvault::password::generate_secure_password;
use proptest::prelude::*;

/// Low scrypt cost so the suite stays fast; the wire format does not change.
fn codec() -> EnvelopeCodec {
    EnvelopeCodec::new(KdfParams { log_n: 10, r: 8, p: 1 })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn prop_round_trip_and_size(plaintext in proptest::collection::vec(any::<u8>(), 0..4096), password in "[ -~]{1,32}") {
        let codec = codec();
        let sealed = codec.encrypt(&plaintext, &password).unwrap();

        prop_assert_eq!(sealed.bytes.len(), HEADER_LENGTH + plaintext.len());
        prop_assert_eq!(sealed.metadata.encrypted_size, sealed.bytes.len());
        prop_assert_eq!(codec.decrypt(&sealed.bytes, &password).unwrap(), plaintext);
    }

    #[test]
    fn prop_any_flipped_byte_fails(position in 0usize..(HEADER_LENGTH + 64)) {
        let codec = codec();
        let sealed = codec.encrypt(&[7u8; 64], "hunter2").unwrap();
        let mut tampered = sealed.bytes.clone();
        tampered[position] ^= 0x01;

        prop_assert_eq!(codec.decrypt(&tampered, "hunter2"), Err(CertError::AuthenticationFailure));
    }
}

#[test]
fn test_fresh_randomness_per_call() -> Result<(), Box<dyn std::error::Error>> {
    let codec = codec();
    let a = EncryptedEnvelope::from_bytes(&codec.encrypt(b"same", "pw")?.bytes)?;
    let b = EncryptedEnvelope::from_bytes(&codec.encrypt(b"same", "pw")?.bytes)?;

    assert_ne!(a.salt, b.salt);
    assert_ne!(a.iv, b.iv);
    assert_ne!(a.ciphertext, b.ciphertext);
    Ok(())
}

#[test]
fn test_wrong_password_and_truncation() -> Result<(), Box<dyn std::error::Error>> {
    let codec = codec();
    let password = generate_secure_password();
    let sealed = codec.encrypt(b"quarterly report", &password)?;

    let err = codec.decrypt(&sealed.bytes, "not it").unwrap_err();
    assert_eq!(err, CertError::AuthenticationFailure);
    assert!(err.to_string().contains("wrong password or corrupted file"));

    assert_eq!(
        codec.decrypt(&sealed.bytes[..HEADER_LENGTH - 1], &password),
        Err(CertError::MalformedEnvelope { len: HEADER_LENGTH - 1 })
    );
    // A bare header is a valid envelope of empty content, but its tag will not match.
    assert_eq!(
        codec.decrypt(&sealed.bytes[..HEADER_LENGTH], &password),
        Err(CertError::AuthenticationFailure)
    );
    Ok(())
}

#[test]
fn test_cost_parameters_must_match() -> Result<(), Box<dyn std::error::Error>> {
    let sealed = codec().encrypt(b"payload", "pw")?;
    let other = EnvelopeCodec::new(KdfParams { log_n: 11, r: 8, p: 1 });
    assert_eq!(other.decrypt(&sealed.bytes, "pw"), Err(CertError::AuthenticationFailure));
    Ok(())
}

#[test]
fn test_layout() -> Result<(), Box<dyn std::error::Error>> {
    let sealed = codec().encrypt(&[0u8; 10], "pw")?;
    let parsed = EncryptedEnvelope::from_bytes(&sealed.bytes)?;

    assert_eq!(&sealed.bytes[..SALT_LENGTH], &parsed.salt[..]);
    assert_eq!(&sealed.bytes[SALT_LENGTH..SALT_LENGTH + 16], &parsed.iv[..]);
    assert_eq!(&sealed.bytes[SALT_LENGTH + 16..HEADER_LENGTH], &parsed.auth_tag[..]);
    assert_eq!(parsed.ciphertext.len(), 10);
    assert_eq!(parsed.to_bytes(), sealed.bytes);
    Ok(())
}
