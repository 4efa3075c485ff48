//! CertVault - password-sealed document envelopes with on-chain certification
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Confidentiality
//! - [`envelope`] - Password-based authenticated encryption (scrypt + AES-256-GCM)
//! - [`password`] - Password generation and Argon2 verifiers
//!
//! ## Certification Registry
//! - [`registry`] - Registry state machine, records, events and revert reasons
//! - [`transaction`] - Registry calls, signed transactions, receipts, input validation
//!
//! ## Chain
//! - [`chain`] - Transport contract and the in-process development chain
//! - [`client`] - Submission, confirmation and query protocol
//! - [`persistence`] - Database layer (SQLite) for the development chain
//!
//! ## Cryptography
//! - [`crypto`] - Signer keys and account ids (secp256k1)
//!
//! ## Integration
//! - [`storage`] - Content-addressed storage collaborator
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`units`] - Balance formatting

#![forbid(unsafe_code)]

// ============================================================================
// Confidentiality
// ============================================================================
pub mod envelope;
pub mod password;

// ============================================================================
// Certification Registry
// ============================================================================
pub mod registry;
pub mod transaction;

// ============================================================================
// Chain
// ============================================================================
pub mod chain;
pub mod client;
pub mod persistence;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// Integration
// ============================================================================
pub mod storage;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
pub mod units;
