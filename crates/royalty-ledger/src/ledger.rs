//! The ledger handle.
//!
//! [`Ledger`] owns the track registry, the pending balances and the event
//! log. All operations take `&self`; share it across threads as
//! `Arc<Ledger>`.
//!
//! ## Locking
//!
//! Locks are always taken in the order registry, balances, log.
//!
//! - Registration and revenue hold the registry write lock for the whole
//!   operation, so two revenue calls on a track never interleave and only
//!   the first registration of an id succeeds.
//! - Withdrawal holds the balance lock only to debit, and again to settle
//!   or restore. The transfer itself runs with no lock held. While it runs
//!   the caller is marked in flight, so a second withdrawal for the same
//!   address is refused until the first finishes.
//! - Events are appended while the lock guarding the change is still held,
//!   so the log order matches the commit order.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use royalty_types::{Address, Amount, BasisPoints, LedgerEvent, RightHolder, TrackId, TrackInfo};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::distributor;
use crate::event_log::{EventFilter, EventLog, LoggedEvent};
use crate::registry::{zip_split, TrackRegistry};
use crate::vault::{FundsTransfer, PendingBalances};
use crate::{LedgerError, Result};

/// Royalty ledger.
#[derive(Debug)]
pub struct Ledger {
    registry: RwLock<TrackRegistry>,
    balances: Mutex<PendingBalances>,
    log: EventLog,
    config: LedgerConfig,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(LedgerConfig::default())
    }
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new(config: LedgerConfig) -> Self {
        let registry = TrackRegistry::new(config.limits.holder_limit());
        let log = EventLog::new(config.events.buffer_capacity);
        Self::from_parts(registry, PendingBalances::default(), log, config)
    }

    pub(crate) fn from_parts(
        registry: TrackRegistry,
        balances: PendingBalances,
        log: EventLog,
        config: LedgerConfig,
    ) -> Self {
        Self {
            registry: RwLock::new(registry),
            balances: Mutex::new(balances),
            log,
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Register a track with an ordered right-holder split.
    ///
    /// Emits `TrackRegistered` followed by one `RightHolderAdded` per holder,
    /// in split order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::DuplicateTrack`] if `track_id` is already registered
    /// - [`LedgerError::EmptyHolderList`], [`LedgerError::TooManyHolders`],
    ///   [`LedgerError::InvalidAddress`], [`LedgerError::DuplicateAddress`],
    ///   [`LedgerError::PercentageSumInvalid`] for a malformed split
    pub fn register_track(
        &self,
        creator: Address,
        track_id: TrackId,
        holders: Vec<RightHolder>,
    ) -> Result<()> {
        let mut registry = self.registry_write();
        let track = registry.register(creator, track_id, holders)?;

        let mut events = Vec::with_capacity(track.holders().len() + 1);
        events.push(LedgerEvent::TrackRegistered { track_id, creator });
        events.extend(track.holders().iter().map(|h| LedgerEvent::RightHolderAdded {
            track_id,
            holder: h.address,
            percentage: h.basis_points,
        }));
        let holder_count = track.holders().len();
        self.log.append(events);

        info!(
            track_id = %track_id,
            creator = %creator,
            holders = holder_count,
            "track registered"
        );
        Ok(())
    }

    /// Register a track from parallel holder and percentage lists.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::HolderLengthMismatch`] if the lists differ in length
    /// - any error from [`Ledger::register_track`]
    pub fn register_track_parallel(
        &self,
        creator: Address,
        track_id: TrackId,
        holders: &[Address],
        percentages: &[BasisPoints],
    ) -> Result<()> {
        let split = zip_split(holders, percentages)?;
        self.register_track(creator, track_id, split)
    }

    /// Distribute `amount` across the track's right holders.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TrackNotFound`] if the track is not registered
    /// - [`LedgerError::ZeroOrNegativeAmount`] if the amount is zero
    /// - [`LedgerError::Overflow`] if a total would overflow
    pub fn add_revenue(&self, track_id: TrackId, amount: Amount) -> Result<()> {
        let mut registry = self.registry_write();
        let mut balances = self.balances();
        let credits = distributor::add_revenue(&mut registry, &mut balances, &track_id, amount)?;
        self.log
            .append(vec![LedgerEvent::RevenueAdded { track_id, amount }]);

        info!(
            track_id = %track_id,
            amount = %amount,
            holders = credits.len(),
            "revenue added"
        );
        Ok(())
    }

    /// Withdraw the caller's full pending balance through `transfer`.
    ///
    /// The balance is zeroed before the transfer starts. If the transfer
    /// fails it is restored and [`LedgerError::TransferFailed`] is returned;
    /// the caller may retry.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoPendingBalance`] if the caller has nothing pending
    /// - [`LedgerError::WithdrawalInProgress`] if another withdrawal for the
    ///   caller has not finished its transfer
    /// - [`LedgerError::TransferFailed`] if the transfer fails
    pub fn withdraw(&self, caller: Address, transfer: &dyn FundsTransfer) -> Result<Amount> {
        let amount = self.balances().take(&caller)?;

        match transfer.transfer(&caller, amount) {
            Ok(()) => {
                let mut balances = self.balances();
                self.log.append(vec![LedgerEvent::Withdrawal {
                    account: caller,
                    amount,
                }]);
                balances.settle(&caller, amount)?;
                drop(balances);

                info!(account = %caller, amount = %amount, "withdrawal completed");
                Ok(amount)
            }
            Err(err) => {
                self.balances().restore(&caller, amount)?;
                warn!(
                    account = %caller,
                    amount = %amount,
                    reason = %err,
                    "withdrawal transfer failed, balance restored"
                );
                Err(LedgerError::TransferFailed {
                    account: caller,
                    amount,
                    reason: err.reason,
                })
            }
        }
    }

    /// Right holders of a track, in split order.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TrackNotFound`] if the track is not registered
    pub fn track_right_holders(&self, track_id: &TrackId) -> Result<Vec<RightHolder>> {
        self.registry_read().lookup(track_id).map(<[_]>::to_vec)
    }

    /// Public record of a track; [`TrackInfo::ABSENT`] if not registered.
    pub fn track_info(&self, track_id: &TrackId) -> TrackInfo {
        self.registry_read()
            .get(track_id)
            .map(|t| t.info())
            .unwrap_or(TrackInfo::ABSENT)
    }

    /// Cumulative revenue of a track.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::TrackNotFound`] if the track is not registered
    pub fn track_earnings(&self, track_id: &TrackId) -> Result<Amount> {
        self.registry_read()
            .get(track_id)
            .map(|t| t.total_received())
            .ok_or(LedgerError::TrackNotFound {
                track_id: *track_id,
            })
    }

    /// Whether a track is registered.
    pub fn track_exists(&self, track_id: &TrackId) -> bool {
        self.registry_read().contains(track_id)
    }

    /// Number of registered tracks.
    pub fn track_count(&self) -> usize {
        self.registry_read().len()
    }

    /// Withdrawable balance of `account`, zero if none.
    pub fn pending_withdrawals(&self, account: &Address) -> Amount {
        self.balances().balance_of(account)
    }

    /// Sum of all pending balances.
    ///
    /// Together with amounts in flight this equals all revenue ever added
    /// minus all completed withdrawals.
    pub fn total_pending(&self) -> Amount {
        self.balances().total()
    }

    /// Sum of withdrawals whose transfer has not yet finished.
    pub fn in_flight(&self) -> Amount {
        self.balances().in_flight()
    }

    /// All logged events, in order.
    pub fn events(&self) -> Vec<LoggedEvent> {
        self.log.entries()
    }

    /// Logged events matching `filter`, in order.
    pub fn events_matching(&self, filter: &EventFilter) -> Vec<LoggedEvent> {
        self.log.matching(filter)
    }

    /// Logged events after sequence number `after`.
    pub fn events_since(&self, after: u64) -> Vec<LoggedEvent> {
        self.log.since(after)
    }

    /// Receive events as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<LoggedEvent> {
        self.log.subscribe()
    }

    pub(crate) fn registry_read(&self) -> RwLockReadGuard<'_, TrackRegistry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_write(&self) -> RwLockWriteGuard<'_, TrackRegistry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn balances(&self) -> MutexGuard<'_, PendingBalances> {
        self.balances.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn log(&self) -> &EventLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::vault::TransferError;

    fn addr(n: u8) -> Address {
        Address::new([n; 20])
    }

    fn split(entries: &[(u8, u16)]) -> Vec<RightHolder> {
        entries
            .iter()
            .map(|(n, bp)| RightHolder::new(addr(*n), *bp))
            .collect()
    }

    fn accept(_: &Address, _: Amount) -> std::result::Result<(), TransferError> {
        Ok(())
    }

    fn reject(_: &Address, _: Amount) -> std::result::Result<(), TransferError> {
        Err(TransferError::new("recipient rejected funds"))
    }

    #[test]
    fn test_exact_split_and_withdraw() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("withdraw-track");
        ledger
            .register_track(addr(1), id, split(&[(1, 6000), (2, 4000)]))
            .expect("register");
        ledger.add_revenue(id, 100).expect("revenue");

        assert_eq!(ledger.pending_withdrawals(&addr(1)), 60);
        assert_eq!(ledger.pending_withdrawals(&addr(2)), 40);

        let paid = ledger.withdraw(addr(1), &accept).expect("withdraw");
        assert_eq!(paid, 60);
        assert_eq!(ledger.pending_withdrawals(&addr(1)), 0);
        assert_eq!(ledger.pending_withdrawals(&addr(2)), 40);
    }

    #[test]
    fn test_rounding_remainder() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("thirds");
        ledger
            .register_track(addr(9), id, split(&[(1, 3333), (2, 3333), (3, 3334)]))
            .expect("register");
        ledger.add_revenue(id, 10).expect("revenue");

        assert_eq!(ledger.pending_withdrawals(&addr(1)), 3);
        assert_eq!(ledger.pending_withdrawals(&addr(2)), 3);
        assert_eq!(ledger.pending_withdrawals(&addr(3)), 4);
        assert_eq!(ledger.total_pending(), 10);
    }

    #[test]
    fn test_register_events_in_order() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track(addr(9), id, split(&[(2, 7000), (1, 3000)]))
            .expect("register");

        let events: Vec<LedgerEvent> = ledger.events().into_iter().map(|e| e.event).collect();
        assert_eq!(
            events,
            vec![
                LedgerEvent::TrackRegistered {
                    track_id: id,
                    creator: addr(9)
                },
                LedgerEvent::RightHolderAdded {
                    track_id: id,
                    holder: addr(2),
                    percentage: 7000
                },
                LedgerEvent::RightHolderAdded {
                    track_id: id,
                    holder: addr(1),
                    percentage: 3000
                },
            ]
        );
    }

    #[test]
    fn test_failed_operations_emit_nothing() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track(addr(9), id, split(&[(1, 9999)]))
            .expect_err("bad sum");
        ledger.add_revenue(id, 10).expect_err("unknown track");
        ledger.withdraw(addr(1), &accept).expect_err("nothing pending");
        assert!(ledger.events().is_empty());
        assert_eq!(ledger.track_count(), 0);
    }

    #[test]
    fn test_duplicate_registration_leaves_state() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track(addr(9), id, split(&[(1, 10_000)]))
            .expect("first");
        let before = ledger.events();

        let err = ledger
            .register_track(addr(8), id, split(&[(2, 10_000)]))
            .expect_err("second");
        assert!(matches!(err, LedgerError::DuplicateTrack { .. }));
        assert_eq!(ledger.events(), before);
        assert_eq!(ledger.track_info(&id).creator, addr(9));
        assert_eq!(ledger.track_right_holders(&id).expect("holders"), split(&[(1, 10_000)]));
    }

    #[test]
    fn test_zero_revenue_rejected() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track(addr(9), id, split(&[(1, 10_000)]))
            .expect("register");
        assert!(matches!(
            ledger.add_revenue(id, 0),
            Err(LedgerError::ZeroOrNegativeAmount)
        ));
        assert_eq!(ledger.track_earnings(&id).expect("earnings"), 0);
    }

    #[test]
    fn test_withdraw_twice() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track(addr(9), id, split(&[(1, 10_000)]))
            .expect("register");
        ledger.add_revenue(id, 77).expect("revenue");

        assert_eq!(ledger.withdraw(addr(1), &accept).expect("first"), 77);
        assert!(matches!(
            ledger.withdraw(addr(1), &accept),
            Err(LedgerError::NoPendingBalance { .. })
        ));
    }

    #[test]
    fn test_transfer_failure_rolls_back() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track(addr(9), id, split(&[(1, 10_000)]))
            .expect("register");
        ledger.add_revenue(id, 50).expect("revenue");
        let events_before = ledger.events().len();

        let err = ledger.withdraw(addr(1), &reject).expect_err("rejected");
        assert!(matches!(
            err,
            LedgerError::TransferFailed { amount: 50, .. }
        ));
        assert!(err.is_retryable());
        assert_eq!(ledger.pending_withdrawals(&addr(1)), 50);
        assert_eq!(ledger.in_flight(), 0);
        assert_eq!(ledger.events().len(), events_before);

        // Retry succeeds.
        assert_eq!(ledger.withdraw(addr(1), &accept).expect("retry"), 50);
    }

    #[test]
    fn test_transfer_sees_zeroed_balance() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track(addr(9), id, split(&[(1, 10_000)]))
            .expect("register");
        ledger.add_revenue(id, 50).expect("revenue");

        let observed = Cell::new(None);
        let reentrant_result = Cell::new(None);
        let probe = |to: &Address, _: Amount| -> std::result::Result<(), TransferError> {
            observed.set(Some(ledger.pending_withdrawals(to)));
            let nested = ledger.withdraw(*to, &accept);
            reentrant_result.set(Some(matches!(
                nested,
                Err(LedgerError::NoPendingBalance { .. })
            )));
            Ok(())
        };

        assert_eq!(ledger.withdraw(addr(1), &probe).expect("withdraw"), 50);
        assert_eq!(observed.get(), Some(0));
        assert_eq!(reentrant_result.get(), Some(true));
        assert_eq!(ledger.pending_withdrawals(&addr(1)), 0);
    }

    #[test]
    fn test_parallel_registration() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        ledger
            .register_track_parallel(addr(9), id, &[addr(1), addr(2)], &[6000, 4000])
            .expect("register");
        assert_eq!(
            ledger.track_right_holders(&id).expect("holders"),
            split(&[(1, 6000), (2, 4000)])
        );
        assert!(matches!(
            ledger.register_track_parallel(
                addr(9),
                TrackId::from_title("other"),
                &[addr(1)],
                &[]
            ),
            Err(LedgerError::HolderLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_track_info_and_earnings() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("song");
        assert_eq!(ledger.track_info(&id), TrackInfo::ABSENT);
        assert!(matches!(
            ledger.track_earnings(&id),
            Err(LedgerError::TrackNotFound { .. })
        ));

        ledger
            .register_track(addr(9), id, split(&[(1, 10_000)]))
            .expect("register");
        ledger.add_revenue(id, 5).expect("revenue");
        ledger.add_revenue(id, 6).expect("revenue");

        let info = ledger.track_info(&id);
        assert!(info.exists);
        assert_eq!(info.creator, addr(9));
        assert_eq!(info.total_received, 11);
        assert_eq!(ledger.track_earnings(&id).expect("earnings"), 11);
        assert!(ledger.track_exists(&id));
    }

    #[test]
    fn test_default_ledger_has_no_holder_cap() {
        let ledger = Ledger::default();
        let id = TrackId::from_title("ensemble");
        let mut holders: Vec<RightHolder> =
            (1..=64u8).map(|n| RightHolder::new(addr(n), 150)).collect();
        holders.push(RightHolder::new(addr(65), 400));

        ledger.register_track(addr(200), id, holders).expect("65 holders");
        assert_eq!(ledger.track_right_holders(&id).expect("holders").len(), 65);

        ledger.add_revenue(id, 10_000).expect("revenue");
        assert_eq!(ledger.pending_withdrawals(&addr(1)), 150);
        assert_eq!(ledger.pending_withdrawals(&addr(65)), 400);
    }

    #[test]
    fn test_holder_limit_from_config() {
        let mut config = LedgerConfig::default();
        config.limits.max_right_holders = 2;
        let ledger = Ledger::new(config);
        let err = ledger
            .register_track(
                addr(9),
                TrackId::from_title("song"),
                split(&[(1, 4000), (2, 3000), (3, 3000)]),
            )
            .expect_err("too many");
        assert!(matches!(err, LedgerError::TooManyHolders { count: 3, max: 2 }));
    }
}
