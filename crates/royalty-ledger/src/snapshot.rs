//! JSON snapshots of ledger state.
//!
//! A snapshot carries the tracks, the pending balances and the full event
//! log. On restore the event log is replayed and must reproduce the stored
//! tracks and balances exactly, so a snapshot that was edited or truncated
//! is rejected instead of silently minting or losing funds.

use std::path::Path;

use royalty_types::{Address, Amount};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use tracing::info;

use crate::config::LedgerConfig;
use crate::event_log::{replay, EventLog, LoggedEvent, ReplayedState};
use crate::ledger::Ledger;
use crate::registry::{Track, TrackRegistry};
use crate::vault::PendingBalances;
use crate::{LedgerError, Result};

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// One pending balance entry.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub account: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: Amount,
}

/// Serializable ledger state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    /// Tracks in registration order.
    pub tracks: Vec<Track>,
    /// Non-zero pending balances, sorted by account.
    pub pending: Vec<PendingEntry>,
    pub events: Vec<LoggedEvent>,
}

impl Ledger {
    /// Capture the current state.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::WithdrawalInFlight`] if a withdrawal transfer has
    ///   not finished; its outcome is not yet known
    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        let registry = self.registry_read();
        let balances = self.balances();
        if balances.in_flight() > 0 {
            return Err(LedgerError::WithdrawalInFlight {
                amount: balances.in_flight(),
            });
        }

        let tracks = registry.iter().cloned().collect();
        let mut pending: Vec<PendingEntry> = balances
            .iter()
            .map(|(account, amount)| PendingEntry {
                account: *account,
                amount: *amount,
            })
            .collect();
        pending.sort_by(|a, b| a.account.cmp(&b.account));
        let events = self.log().entries();

        Ok(LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            tracks,
            pending,
            events,
        })
    }

    /// Rebuild a ledger from a snapshot.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::CorruptSnapshot`] if the snapshot is internally
    ///   inconsistent or its version is unsupported
    pub fn restore(snapshot: LedgerSnapshot, config: LedgerConfig) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LedgerError::CorruptSnapshot(format!(
                "unsupported version {}",
                snapshot.version
            )));
        }

        let replayed = replay(snapshot.events.iter().map(|e| &e.event))
            .map_err(|e| LedgerError::CorruptSnapshot(e.to_string()))?;

        let registry = TrackRegistry::from_tracks(snapshot.tracks, config.limits.holder_limit())?;
        let balances = PendingBalances::from_entries(
            snapshot.pending.into_iter().map(|e| (e.account, e.amount)),
        )?;
        check_matches_replay(&registry, &balances, &replayed)?;

        let log = EventLog::from_entries(snapshot.events, config.events.buffer_capacity)?;
        info!(
            tracks = registry.len(),
            events = log.len(),
            "ledger restored from snapshot"
        );
        Ok(Self::from_parts(registry, balances, log, config))
    }

    /// Write a snapshot to `path` as JSON.
    ///
    /// The file is written next to `path` and renamed into place, so a crash
    /// never leaves a half-written snapshot.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        info!(path = %path.display(), events = snapshot.events.len(), "ledger snapshot saved");
        Ok(())
    }

    /// Load a ledger from a JSON snapshot at `path`, or start empty if the
    /// file does not exist.
    pub fn load_from(path: &Path, config: LedgerConfig) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(config));
        }
        let content = std::fs::read(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_slice(&content)
            .map_err(|e| LedgerError::Serialization(e.to_string()))?;
        Self::restore(snapshot, config)
    }
}

fn check_matches_replay(
    registry: &TrackRegistry,
    balances: &PendingBalances,
    replayed: &ReplayedState,
) -> Result<()> {
    let ids: Vec<_> = registry.iter().map(Track::track_id).collect();
    if ids != replayed.track_ids() {
        return Err(LedgerError::CorruptSnapshot(
            "tracks do not match event log".to_string(),
        ));
    }

    for track in registry.iter() {
        let matches = replayed.track(&track.track_id()).is_some_and(|r| {
            r.creator == track.creator()
                && r.holders == track.holders()
                && r.total_received == track.total_received()
        });
        if !matches {
            return Err(LedgerError::CorruptSnapshot(format!(
                "track {} does not match event log",
                track.track_id()
            )));
        }
    }

    let stored = balances.iter().count();
    let derived = replayed.pending_balances().count();
    if stored != derived
        || replayed
            .pending_balances()
            .any(|(account, amount)| balances.balance_of(account) != *amount)
    {
        return Err(LedgerError::CorruptSnapshot(
            "pending balances do not match event log".to_string(),
        ));
    }

    Ok(())
}
