//! Track identifiers and right-holder splits.

use std::fmt;
use std::str::FromStr;

use royalty_crypto::keccak;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DeserializeFromStr, DisplayFromStr, SerializeDisplay};

use crate::{strip_hex_prefix, Address, Amount, BasisPoints, Result, TypeError};

/// Content-derived 32-byte track identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr)]
pub struct TrackId([u8; 32]);

impl TrackId {
    /// Wrap a raw 32-byte identifier.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the identifier for a work from its title.
    ///
    /// Equal titles (ignoring surrounding whitespace) yield equal identifiers.
    pub fn from_title(title: &str) -> Self {
        Self(keccak::derive_track_id(title))
    }

    /// Raw identifier bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for TrackId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl FromStr for TrackId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self> {
        let body = strip_hex_prefix(s.trim());
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(body, &mut bytes)
            .map_err(|_| TypeError::MalformedTrackId(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&keccak::to_hex_prefixed(&self.0))
    }
}

impl fmt::Debug for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackId({self})")
    }
}

/// One entry of a track's ordered revenue split.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
pub struct RightHolder {
    #[ts(type = "string")]
    pub address: Address,
    /// Share in basis points (0..=10000).
    pub basis_points: BasisPoints,
}

impl RightHolder {
    pub fn new(address: Address, basis_points: BasisPoints) -> Self {
        Self {
            address,
            basis_points,
        }
    }
}

/// Public per-track record.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
pub struct TrackInfo {
    /// Account that registered the track.
    #[ts(type = "string")]
    pub creator: Address,
    /// Cumulative revenue, decimal string on the wire.
    #[serde_as(as = "DisplayFromStr")]
    #[ts(type = "string")]
    pub total_received: Amount,
    pub exists: bool,
}

impl TrackInfo {
    /// Record returned for a track id that was never registered.
    pub const ABSENT: TrackInfo = TrackInfo {
        creator: Address::ZERO,
        total_received: 0,
        exists: false,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_from_title() {
        let a = TrackId::from_title("Blue Monday");
        let b = TrackId::from_title("  Blue Monday  ");
        assert_eq!(a, b);
        assert_ne!(a, TrackId::from_title("Blue Tuesday"));
    }

    #[test]
    fn test_track_id_display_parse() {
        let id = TrackId::from_title("Blue Monday");
        let s = id.to_string();
        assert!(s.starts_with("0x"));
        assert_eq!(s.len(), 66);
        assert_eq!(s.parse::<TrackId>().expect("parse"), id);
    }

    #[test]
    fn test_track_id_parse_malformed() {
        assert!(matches!(
            "0xdeadbeef".parse::<TrackId>(),
            Err(TypeError::MalformedTrackId(_))
        ));
    }

    #[test]
    fn test_track_info_amount_as_string() {
        let info = TrackInfo {
            creator: Address::new([7u8; 20]),
            total_received: 1_000_000_000_000_000_000,
            exists: true,
        };
        let json = serde_json::to_value(info).expect("serialize");
        assert_eq!(json["total_received"], "1000000000000000000");
        let back: TrackInfo = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, info);
    }

    #[test]
    fn test_track_info_absent() {
        assert!(!TrackInfo::ABSENT.exists);
        assert_eq!(TrackInfo::ABSENT.total_received, 0);
    }
}
