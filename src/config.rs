//! Configuration management for CertVault

use crate::crypto::{AccountId, KeyPair};
use crate::envelope::{EnvelopeCodec, KdfParams};
use crate::error::CertError;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Supplies or replaces `signer.secret_key`.
pub const SIGNER_KEY_ENV: &str = "CERTVAULT_SIGNER_KEY";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub network: NetworkConfig,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    #[serde(default = "default_network_name")]
    pub network_name: String,
    #[serde(default)]
    pub registry_address: String,
    #[serde(default = "default_explorer_url")]
    pub explorer_url: String,
}

#[derive(Clone, Default, Deserialize)]
pub struct SignerConfig {
    /// 32-byte secp256k1 secret, hex encoded.
    #[serde(default)]
    pub secret_key: Option<String>,
}

impl std::fmt::Debug for SignerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerConfig")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Below this the client warns before certifying and refuses to transfer.
    #[serde(default = "default_min_balance_wei")]
    pub min_balance_wei: u128,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            confirmations: default_confirmations(),
            min_balance_wei: default_min_balance_wei(),
            gas_limit: default_gas_limit(),
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvelopeConfig {
    #[serde(default = "default_scrypt_log_n")]
    pub scrypt_log_n: u8,
    #[serde(default = "default_scrypt_r")]
    pub scrypt_r: u32,
    #[serde(default = "default_scrypt_p")]
    pub scrypt_p: u32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        let params = KdfParams::default();
        Self {
            scrypt_log_n: params.log_n,
            scrypt_r: params.r,
            scrypt_p: params.p,
        }
    }
}

impl EnvelopeConfig {
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            log_n: self.scrypt_log_n,
            r: self.scrypt_r,
            p: self.scrypt_p,
        }
    }

    pub fn codec(&self) -> EnvelopeCodec {
        EnvelopeCodec::new(self.kdf_params())
    }
}

impl Config {
    /// Minimal configuration for the given endpoint; everything else defaulted.
    pub fn new(rpc_url: &str, chain_id: u64, registry_address: AccountId) -> Self {
        Config {
            network: NetworkConfig {
                rpc_url: rpc_url.to_string(),
                chain_id,
                network_name: default_network_name(),
                registry_address: registry_address.to_hex(),
                explorer_url: default_explorer_url(),
            },
            signer: SignerConfig::default(),
            client: ClientConfig::default(),
            envelope: EnvelopeConfig::default(),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CertError> {
        Ok(toml::from_str(raw)?)
    }

    /// Replaces the signer key when `key` is set and non-empty.
    pub fn with_signer_override(mut self, key: Option<String>) -> Self {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            self.signer.secret_key = Some(key);
        }
        self
    }

    /// Fails on the first absent or malformed required value.
    pub fn validate(&self) -> Result<(), CertError> {
        if self.network.rpc_url.trim().is_empty() {
            return Err(CertError::Config("network.rpc_url must be set".to_string()));
        }
        if self.network.chain_id == 0 {
            return Err(CertError::Config("network.chain_id must be non-zero".to_string()));
        }
        self.registry_address()?;
        self.signer_keypair()?;

        if self.client.timeout_secs == 0 {
            return Err(CertError::Config("client.timeout_secs must be non-zero".to_string()));
        }
        if self.client.confirmations == 0 {
            return Err(CertError::Config("client.confirmations must be at least 1".to_string()));
        }
        scrypt::Params::new(
            self.envelope.scrypt_log_n,
            self.envelope.scrypt_r,
            self.envelope.scrypt_p,
            crate::envelope::KEY_LENGTH,
        )
        .map_err(|e| CertError::Config(format!("envelope scrypt parameters are invalid: {}", e)))?;
        Ok(())
    }

    pub fn registry_address(&self) -> Result<AccountId, CertError> {
        let raw = self.network.registry_address.trim();
        if raw.is_empty() {
            return Err(CertError::Config("network.registry_address must be set".to_string()));
        }
        raw.parse()
            .map_err(|_| CertError::Config(format!("network.registry_address is malformed: {}", raw)))
    }

    pub fn signer_keypair(&self) -> Result<KeyPair, CertError> {
        let raw = self.signer.secret_key.as_deref().map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(CertError::Config(format!(
                "signer.secret_key must be set (or export {})",
                SIGNER_KEY_ENV
            )));
        }
        KeyPair::from_secret_hex(raw)
            .map_err(|_| CertError::Config("signer.secret_key is not a valid 32-byte hex secret".to_string()))
    }
}

/// Reads `path`, applies the environment override and validates.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, CertError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .map_err(|e| CertError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config = Config::from_toml_str(&raw)?.with_signer_override(std::env::var(SIGNER_KEY_ENV).ok());
    config.validate()?;
    Ok(config)
}

fn default_network_name() -> String {
    "devnet".to_string()
}

fn default_explorer_url() -> String {
    "https://explorer.invalid".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_confirmations() -> u64 {
    1
}

fn default_min_balance_wei() -> u128 {
    10_000_000_000_000_000
}

fn default_gas_limit() -> u64 {
    300_000
}

fn default_scrypt_log_n() -> u8 {
    14
}

fn default_scrypt_r() -> u32 {
    8
}

fn default_scrypt_p() -> u32 {
    1
}
