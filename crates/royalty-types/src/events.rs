//! Ledger events for off-ledger observers.
//!
//! These four events are the only contract the metadata and UI layers rely
//! on: replaying them in order reconstructs every track's holder set and
//! every account's pending balance.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::{Address, Amount, BasisPoints, TrackId};

/// A committed ledger state change.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[serde(tag = "type")]
pub enum LedgerEvent {
    /// A track was registered by `creator`.
    TrackRegistered {
        #[ts(type = "string")]
        track_id: TrackId,
        #[ts(type = "string")]
        creator: Address,
    },
    /// One right holder of a newly registered track, in split order.
    RightHolderAdded {
        #[ts(type = "string")]
        track_id: TrackId,
        #[ts(type = "string")]
        holder: Address,
        /// Basis points.
        percentage: BasisPoints,
    },
    /// Revenue was distributed across a track's holders.
    RevenueAdded {
        #[ts(type = "string")]
        track_id: TrackId,
        #[serde_as(as = "DisplayFromStr")]
        #[ts(type = "string")]
        amount: Amount,
    },
    /// An account withdrew its pending balance.
    Withdrawal {
        #[ts(type = "string")]
        account: Address,
        #[serde_as(as = "DisplayFromStr")]
        #[ts(type = "string")]
        amount: Amount,
    },
}

impl LedgerEvent {
    /// Event name as it appears in the `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::TrackRegistered { .. } => "TrackRegistered",
            LedgerEvent::RightHolderAdded { .. } => "RightHolderAdded",
            LedgerEvent::RevenueAdded { .. } => "RevenueAdded",
            LedgerEvent::Withdrawal { .. } => "Withdrawal",
        }
    }

    /// The track this event concerns, if any.
    pub fn track_id(&self) -> Option<TrackId> {
        match self {
            LedgerEvent::TrackRegistered { track_id, .. }
            | LedgerEvent::RightHolderAdded { track_id, .. }
            | LedgerEvent::RevenueAdded { track_id, .. } => Some(*track_id),
            LedgerEvent::Withdrawal { .. } => None,
        }
    }

    /// Whether `account` appears in this event as creator, holder or withdrawer.
    pub fn involves(&self, account: &Address) -> bool {
        match self {
            LedgerEvent::TrackRegistered { creator, .. } => creator == account,
            LedgerEvent::RightHolderAdded { holder, .. } => holder == account,
            LedgerEvent::RevenueAdded { .. } => false,
            LedgerEvent::Withdrawal { account: a, .. } => a == account,
        }
    }
}
