//! Keccak-256 hashing.
//!
//! This is the original Keccak submission (pre-NIST padding) used throughout
//! the Ethereum ecosystem, not FIPS-202 SHA3-256. Two things depend on it:
//!
//! - [`derive_track_id`]: content-derived track identifiers
//! - [`eip55_checksum`]: mixed-case address checksums

use sha3::{Digest, Keccak256};

use crate::{CryptoError, Result};

/// Number of hex digits in a 20-byte address.
pub const ADDRESS_HEX_LEN: usize = 40;

/// Compute the Keccak-256 hash of the input data.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// Derive a track identifier from the work's title.
///
/// Surrounding whitespace is not significant: `"  Song "` and `"Song"`
/// map to the same identifier, so re-registering a work under a padded
/// title collides with the original registration.
pub fn derive_track_id(title: &str) -> [u8; 32] {
    keccak256(title.trim().as_bytes())
}

/// Encode an address with its EIP-55 checksum.
///
/// `hex_digits` is the 40-digit address body without the `0x` prefix, in
/// any letter case. Returns the `0x`-prefixed checksummed form.
///
/// # Errors
///
/// - [`CryptoError::InvalidInput`] if the input is not 40 hex digits
pub fn eip55_checksum(hex_digits: &str) -> Result<String> {
    if hex_digits.len() != ADDRESS_HEX_LEN || !hex_digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CryptoError::InvalidInput(format!(
            "expected {ADDRESS_HEX_LEN} hex digits, got {hex_digits:?}"
        )));
    }

    let lower = hex_digits.to_ascii_lowercase();
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(2 + ADDRESS_HEX_LEN);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let byte = hash[i / 2];
        let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    Ok(out)
}

/// Render a 32-byte hash as `0x`-prefixed lowercase hex.
pub fn to_hex_prefixed(hash: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(hash))
}
