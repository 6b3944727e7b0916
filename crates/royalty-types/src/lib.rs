//! # royalty-types
//!
//! Shared domain types used across the royalty workspace.
//!
//! ## Modules
//!
//! - [`address`]: 20-byte account addresses with EIP-55 checksums
//! - [`track`]: Track identifiers, right holders, per-track records
//! - [`events`]: Ledger events consumed by off-ledger observers

pub mod address;
pub mod events;
pub mod track;

pub use address::Address;
pub use events::LedgerEvent;
pub use track::{RightHolder, TrackId, TrackInfo};

/// Currency amount in the smallest unit (e.g. wei).
pub type Amount = u128;

/// Share of revenue in basis points (1 = 0.01%).
pub type BasisPoints = u16;

/// Basis points representing 100%.
pub const BASIS_POINTS_TOTAL: BasisPoints = 10_000;

/// Error types for parsing domain values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// Address string is not `0x` followed by 40 hex digits.
    #[error("malformed address: {0}")]
    MalformedAddress(String),

    /// Mixed-case address whose letter case does not match its EIP-55 checksum.
    #[error("address checksum mismatch: {0}")]
    ChecksumMismatch(String),

    /// Track identifier string is not `0x` followed by 64 hex digits.
    #[error("malformed track id: {0}")]
    MalformedTrackId(String),
}

/// Convenience result type for type parsing.
pub type Result<T> = std::result::Result<T, TypeError>;

/// Strip an optional `0x`/`0X` prefix.
pub(crate) fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}
