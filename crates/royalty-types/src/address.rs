//! Account addresses.
//!
//! An [`Address`] is a 20-byte account identifier written as `0x` followed by
//! 40 hex digits. Single-case strings are accepted as-is; mixed-case strings
//! must carry a valid EIP-55 checksum. Addresses always display checksummed.

use std::fmt;
use std::str::FromStr;

use royalty_crypto::keccak;
use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::{strip_hex_prefix, Result, TypeError};

/// A 20-byte account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct Address([u8; 20]);

impl Address {
    /// The all-zero address. Never a valid right holder.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Wrap raw address bytes.
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is [`Address::ZERO`].
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// EIP-55 checksummed representation.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        // 40 hex digits by construction, so the checksum cannot fail.
        keccak::eip55_checksum(&lower).unwrap_or_else(|_| format!("0x{lower}"))
    }
}

impl FromStr for Address {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self> {
        let body = strip_hex_prefix(s.trim());
        if body.len() != keccak::ADDRESS_HEX_LEN {
            return Err(TypeError::MalformedAddress(s.to_string()));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(body, &mut bytes)
            .map_err(|_| TypeError::MalformedAddress(s.to_string()))?;

        let has_lower = body.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = body.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper {
            let expected = keccak::eip55_checksum(body)
                .map_err(|_| TypeError::MalformedAddress(s.to_string()))?;
            if expected[2..] != *body {
                return Err(TypeError::ChecksumMismatch(s.to_string()));
            }
        }

        Ok(Self(bytes))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}
