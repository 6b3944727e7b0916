//! # royalty-crypto
//!
//! Hashing primitives for the royalty ledger.
//!
//! Track identifiers and address checksums both rest on Ethereum-flavoured
//! Keccak-256, so this crate is deliberately small.
//!
//! ## Modules
//!
//! - [`keccak`]: Keccak-256, track identifier derivation, EIP-55 checksums

pub mod keccak;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
