//! Append-only ledger event log.
//!
//! Every committed state change appends its events here, numbered with a
//! contiguous sequence starting at 1. The full log can always be read back;
//! live subscribers additionally receive each entry over a broadcast channel
//! with a bounded buffer, and a subscriber that falls behind can catch up
//! with [`EventLog::since`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use royalty_types::{Address, Amount, LedgerEvent, RightHolder, TrackId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::distributor::distribute;
use crate::{LedgerError, Result};

/// A logged event with its position in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// 1-based position in the log.
    pub sequence: u64,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Filter for reading a subset of the log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events about this track.
    pub track_id: Option<TrackId>,
    /// Only events naming this account.
    pub account: Option<Address>,
}

impl EventFilter {
    /// Check if an event matches this filter.
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        if let Some(track_id) = self.track_id {
            if event.track_id() != Some(track_id) {
                return false;
            }
        }
        if let Some(account) = self.account {
            if !event.involves(&account) {
                return false;
            }
        }
        true
    }
}

/// The ledger's event log.
#[derive(Debug)]
pub struct EventLog {
    entries: Mutex<Vec<LoggedEvent>>,
    sender: broadcast::Sender<LoggedEvent>,
}

impl EventLog {
    /// Create an empty log whose live subscribers buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: Mutex::new(Vec::new()),
            sender,
        }
    }

    /// Append a batch of events as one contiguous run.
    pub(crate) fn append(&self, events: Vec<LedgerEvent>) {
        let mut entries = self.lock();
        for event in events {
            let logged = LoggedEvent {
                sequence: entries.len() as u64 + 1,
                event,
            };
            // No subscribers is fine.
            let _ = self.sender.send(logged.clone());
            entries.push(logged);
        }
    }

    /// Subscribe to events appended from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LoggedEvent> {
        self.sender.subscribe()
    }

    /// All entries in order.
    pub fn entries(&self) -> Vec<LoggedEvent> {
        self.lock().clone()
    }

    /// Entries with a sequence number greater than `after`.
    pub fn since(&self, after: u64) -> Vec<LoggedEvent> {
        let entries = self.lock();
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(entries.len());
        entries[start..].to_vec()
    }

    /// Entries matching `filter`, in order.
    pub fn matching(&self, filter: &EventFilter) -> Vec<LoggedEvent> {
        self.lock()
            .iter()
            .filter(|e| filter.matches(&e.event))
            .cloned()
            .collect()
    }

    /// Sequence number of the newest entry, 0 if empty.
    pub fn last_sequence(&self) -> u64 {
        self.lock().len() as u64
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Rebuild a log from stored entries, which must be numbered 1..=n.
    pub(crate) fn from_entries(entries: Vec<LoggedEvent>, capacity: usize) -> Result<Self> {
        for (index, entry) in entries.iter().enumerate() {
            if entry.sequence != index as u64 + 1 {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "event at position {} has sequence {}",
                    index + 1,
                    entry.sequence
                )));
            }
        }
        let log = Self::new(capacity);
        *log.lock() = entries;
        Ok(log)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LoggedEvent>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Track state reconstructed from events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedTrack {
    pub creator: Address,
    pub holders: Vec<RightHolder>,
    pub total_received: Amount,
}

/// Ledger state reconstructed purely from an event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayedState {
    tracks: HashMap<TrackId, ReplayedTrack>,
    order: Vec<TrackId>,
    pending: HashMap<Address, Amount>,
    /// Track whose holder list is still being announced.
    open: Option<TrackId>,
}

impl ReplayedState {
    /// Apply one event.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidEventStream`] if the event cannot follow the
    ///   events applied so far
    pub fn apply(&mut self, event: &LedgerEvent) -> Result<()> {
        match event {
            LedgerEvent::TrackRegistered { track_id, creator } => {
                if self.tracks.contains_key(track_id) {
                    return Err(invalid(format!("track {track_id} registered twice")));
                }
                self.tracks.insert(
                    *track_id,
                    ReplayedTrack {
                        creator: *creator,
                        holders: Vec::new(),
                        total_received: 0,
                    },
                );
                self.order.push(*track_id);
                self.open = Some(*track_id);
            }
            LedgerEvent::RightHolderAdded {
                track_id,
                holder,
                percentage,
            } => {
                if self.open != Some(*track_id) {
                    return Err(invalid(format!(
                        "holder added to track {track_id} outside its registration"
                    )));
                }
                if let Some(track) = self.tracks.get_mut(track_id) {
                    track.holders.push(RightHolder::new(*holder, *percentage));
                }
            }
            LedgerEvent::RevenueAdded { track_id, amount } => {
                self.open = None;
                let track = self
                    .tracks
                    .get_mut(track_id)
                    .ok_or_else(|| invalid(format!("revenue for unknown track {track_id}")))?;
                let credits = distribute(*amount, &track.holders)
                    .map_err(|e| invalid(format!("revenue for track {track_id}: {e}")))?;
                track.total_received = track
                    .total_received
                    .checked_add(*amount)
                    .ok_or_else(|| invalid(format!("total for track {track_id} overflows")))?;
                for (holder, share) in credits {
                    if share == 0 {
                        continue;
                    }
                    let balance = self.pending.entry(holder).or_insert(0);
                    *balance = balance
                        .checked_add(share)
                        .ok_or_else(|| invalid(format!("balance of {holder} overflows")))?;
                }
            }
            LedgerEvent::Withdrawal { account, amount } => {
                self.open = None;
                let balance = self.pending(account);
                let remaining = balance.checked_sub(*amount).ok_or_else(|| {
                    invalid(format!(
                        "{account} withdrew {amount} with only {balance} pending"
                    ))
                })?;
                if remaining == 0 {
                    self.pending.remove(account);
                } else {
                    self.pending.insert(*account, remaining);
                }
            }
        }
        Ok(())
    }

    pub fn track(&self, track_id: &TrackId) -> Option<&ReplayedTrack> {
        self.tracks.get(track_id)
    }

    /// Right holders of a track, in split order.
    pub fn holders(&self, track_id: &TrackId) -> Option<&[RightHolder]> {
        self.tracks.get(track_id).map(|t| t.holders.as_slice())
    }

    /// Pending balance of `account`, zero if none.
    pub fn pending(&self, account: &Address) -> Amount {
        self.pending.get(account).copied().unwrap_or(0)
    }

    /// Accounts with a non-zero pending balance.
    pub fn pending_balances(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.pending.iter()
    }

    /// Track ids in registration order.
    pub fn track_ids(&self) -> &[TrackId] {
        &self.order
    }
}

/// Reconstruct ledger state from an ordered event stream.
///
/// # Errors
///
/// - [`LedgerError::InvalidEventStream`] if the stream is not a valid history
pub fn replay<'a>(events: impl IntoIterator<Item = &'a LedgerEvent>) -> Result<ReplayedState> {
    let mut state = ReplayedState::default();
    for event in events {
        state.apply(event)?;
    }
    Ok(state)
}

fn invalid(detail: String) -> LedgerError {
    LedgerError::InvalidEventStream(detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    fn registration(track_id: TrackId, holders: &[(u8, u16)]) -> Vec<LedgerEvent> {
        let mut events = vec![LedgerEvent::TrackRegistered {
            track_id,
            creator: addr(9),
        }];
        events.extend(holders.iter().map(|(n, bp)| LedgerEvent::RightHolderAdded {
            track_id,
            holder: addr(*n),
            percentage: *bp,
        }));
        events
    }

    #[test]
    fn test_append_and_sequence() {
        let log = EventLog::new(16);
        let id = TrackId::from_title("song");
        log.append(registration(id, &[(1, 10_000)]));
        log.append(vec![LedgerEvent::RevenueAdded {
            track_id: id,
            amount: 10,
        }]);

        let entries = log.entries();
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(log.last_sequence(), 3);
        assert_eq!(log.since(2).len(), 1);
        assert_eq!(log.since(99).len(), 0);
    }

    #[test]
    fn test_subscribe_receives_in_order() {
        let log = EventLog::new(16);
        let mut rx = log.subscribe();
        let id = TrackId::from_title("song");
        log.append(registration(id, &[(1, 6000), (2, 4000)]));

        let first = rx.try_recv().expect("first");
        assert_eq!(first.sequence, 1);
        assert_eq!(first.event.name(), "TrackRegistered");
        assert_eq!(rx.try_recv().expect("second").sequence, 2);
        assert_eq!(rx.try_recv().expect("third").sequence, 3);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_lagging_subscriber_can_catch_up() {
        let log = EventLog::new(1);
        let mut rx = log.subscribe();
        let id = TrackId::from_title("song");
        log.append(registration(id, &[(1, 5000), (2, 5000)]));

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
        assert_eq!(log.since(0).len(), 3);
    }

    #[test]
    fn test_filter() {
        let log = EventLog::new(16);
        let a = TrackId::from_title("a");
        let b = TrackId::from_title("b");
        log.append(registration(a, &[(1, 10_000)]));
        log.append(registration(b, &[(2, 10_000)]));
        log.append(vec![LedgerEvent::Withdrawal {
            account: addr(1),
            amount: 1,
        }]);

        let by_track = log.matching(&EventFilter {
            track_id: Some(b),
            account: None,
        });
        assert_eq!(by_track.len(), 2);

        let by_account = log.matching(&EventFilter {
            track_id: None,
            account: Some(addr(1)),
        });
        assert_eq!(by_account.len(), 2);
        assert_eq!(log.matching(&EventFilter::default()).len(), 5);
    }

    #[test]
    fn test_logged_event_json_is_flat() {
        let logged = LoggedEvent {
            sequence: 7,
            event: LedgerEvent::Withdrawal {
                account: addr(1),
                amount: 60,
            },
        };
        let json = serde_json::to_value(&logged).expect("serialize");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["type"], "Withdrawal");
        assert_eq!(json["amount"], "60");
        let back: LoggedEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, logged);
    }

    #[test]
    fn test_from_entries_rejects_gaps() {
        let entries = vec![LoggedEvent {
            sequence: 2,
            event: LedgerEvent::Withdrawal {
                account: addr(1),
                amount: 1,
            },
        }];
        assert!(matches!(
            EventLog::from_entries(entries, 16),
            Err(LedgerError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn test_replay_balances() {
        let id = TrackId::from_title("song");
        let mut events = registration(id, &[(1, 3333), (2, 3333), (3, 3334)]);
        events.push(LedgerEvent::RevenueAdded {
            track_id: id,
            amount: 10,
        });
        events.push(LedgerEvent::Withdrawal {
            account: addr(3),
            amount: 4,
        });

        let state = replay(&events).expect("replay");
        assert_eq!(state.pending(&addr(1)), 3);
        assert_eq!(state.pending(&addr(2)), 3);
        assert_eq!(state.pending(&addr(3)), 0);
        assert_eq!(state.track(&id).expect("track").total_received, 10);
        assert_eq!(state.holders(&id).expect("holders").len(), 3);
        assert_eq!(state.track_ids(), &[id]);
    }

    #[test]
    fn test_replay_rejects_late_holder() {
        let id = TrackId::from_title("song");
        let mut events = registration(id, &[(1, 10_000)]);
        events.push(LedgerEvent::RevenueAdded {
            track_id: id,
            amount: 10,
        });
        events.push(LedgerEvent::RightHolderAdded {
            track_id: id,
            holder: addr(2),
            percentage: 0,
        });
        assert!(matches!(
            replay(&events),
            Err(LedgerError::InvalidEventStream(_))
        ));
    }

    #[test]
    fn test_replay_rejects_overdraw() {
        let events = vec![LedgerEvent::Withdrawal {
            account: addr(1),
            amount: 1,
        }];
        assert!(matches!(
            replay(&events),
            Err(LedgerError::InvalidEventStream(_))
        ));
    }

    #[test]
    fn test_replay_rejects_unknown_track_revenue() {
        let events = vec![LedgerEvent::RevenueAdded {
            track_id: TrackId::from_title("ghost"),
            amount: 1,
        }];
        assert!(matches!(
            replay(&events),
            Err(LedgerError::InvalidEventStream(_))
        ));
    }
}
