//! Pending balances and pull-payment withdrawal.
//!
//! A withdrawal is two-phase. [`PendingBalances::take`] zeroes the caller's
//! balance and moves the amount in flight; the transfer then runs with no
//! lock held. On success the in-flight amount is settled, on failure it is
//! restored to the caller. Anything that reads the balance between the two
//! phases, including a reentrant withdrawal from inside the transfer, sees
//! zero. An address has at most one transfer in flight: credits that land
//! mid-transfer stay pending until that transfer settles or is restored.

use std::collections::{HashMap, HashSet};

use royalty_types::{Address, Amount};

use crate::{LedgerError, Result};

/// Failure reported by a [`FundsTransfer`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct TransferError {
    /// Human-readable reason, e.g. "recipient rejected funds".
    pub reason: String,
}

impl TransferError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Moves funds out of the ledger's custody to a recipient.
///
/// May block. The ledger never holds a lock while calling it.
pub trait FundsTransfer {
    /// Send `amount` to `to`.
    fn transfer(&self, to: &Address, amount: Amount) -> std::result::Result<(), TransferError>;
}

impl<F> FundsTransfer for F
where
    F: Fn(&Address, Amount) -> std::result::Result<(), TransferError>,
{
    fn transfer(&self, to: &Address, amount: Amount) -> std::result::Result<(), TransferError> {
        self(to, amount)
    }
}

/// Withdrawable balance per address.
///
/// `total` is the sum of all balances; `in_flight` is the sum of amounts
/// taken for transfers that have not yet settled. Their sum never exceeds
/// `Amount::MAX`, which is what lets a failed transfer always be restored.
#[derive(Debug, Default, Clone)]
pub struct PendingBalances {
    balances: HashMap<Address, Amount>,
    total: Amount,
    in_flight: Amount,
    /// Accounts with a transfer that has not settled.
    withdrawing: HashSet<Address>,
}

impl PendingBalances {
    /// Balance of `account`, zero if never credited.
    pub fn balance_of(&self, account: &Address) -> Amount {
        self.balances.get(account).copied().unwrap_or(0)
    }

    /// Sum of all pending balances.
    pub fn total(&self) -> Amount {
        self.total
    }

    /// Sum of amounts currently being transferred.
    pub fn in_flight(&self) -> Amount {
        self.in_flight
    }

    /// Non-zero balances, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    /// Credit every `(address, amount)` pair, or none of them.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Overflow`] if any balance or the custody total
    ///   would overflow
    pub fn credit_all(&mut self, credits: &[(Address, Amount)]) -> Result<()> {
        let mut staged: HashMap<Address, Amount> = HashMap::with_capacity(credits.len());
        let mut added: Amount = 0;
        for (account, amount) in credits {
            if *amount == 0 {
                continue;
            }
            let current = match staged.get(account) {
                Some(v) => *v,
                None => self.balance_of(account),
            };
            let next = current.checked_add(*amount).ok_or(LedgerError::Overflow)?;
            staged.insert(*account, next);
            added = added.checked_add(*amount).ok_or(LedgerError::Overflow)?;
        }

        let new_total = self.total.checked_add(added).ok_or(LedgerError::Overflow)?;
        new_total
            .checked_add(self.in_flight)
            .ok_or(LedgerError::Overflow)?;

        self.balances.extend(staged);
        self.total = new_total;
        Ok(())
    }

    /// Whether `account` has a transfer that has not settled.
    pub fn is_withdrawing(&self, account: &Address) -> bool {
        self.withdrawing.contains(account)
    }

    /// Zero `account`'s balance and move it in flight.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NoPendingBalance`] if the balance is zero
    /// - [`LedgerError::WithdrawalInProgress`] if `account` already has a
    ///   transfer in flight
    /// - [`LedgerError::Overflow`] if the totals are inconsistent
    pub fn take(&mut self, account: &Address) -> Result<Amount> {
        let amount = self.balance_of(account);
        if amount == 0 {
            return Err(LedgerError::NoPendingBalance { account: *account });
        }
        if self.withdrawing.contains(account) {
            return Err(LedgerError::WithdrawalInProgress { account: *account });
        }

        let total = self.total.checked_sub(amount).ok_or(LedgerError::Overflow)?;
        let in_flight = self
            .in_flight
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.balances.remove(account);
        self.withdrawing.insert(*account);
        self.total = total;
        self.in_flight = in_flight;
        Ok(amount)
    }

    /// Finalize `account`'s successful transfer of `amount`.
    pub fn settle(&mut self, account: &Address, amount: Amount) -> Result<()> {
        self.in_flight = self
            .in_flight
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        self.withdrawing.remove(account);
        Ok(())
    }

    /// Return `amount` to `account` after a failed transfer.
    ///
    /// Credits that arrived while the transfer was in flight are kept.
    pub fn restore(&mut self, account: &Address, amount: Amount) -> Result<()> {
        let in_flight = self
            .in_flight
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow)?;
        let total = self.total.checked_add(amount).ok_or(LedgerError::Overflow)?;
        let balance = self
            .balance_of(account)
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.in_flight = in_flight;
        self.total = total;
        self.balances.insert(*account, balance);
        self.withdrawing.remove(account);
        Ok(())
    }

    /// Rebuild balances from stored entries.
    pub(crate) fn from_entries(entries: impl IntoIterator<Item = (Address, Amount)>) -> Result<Self> {
        let mut balances = Self::default();
        for (account, amount) in entries {
            if amount == 0 {
                continue;
            }
            if balances.balances.contains_key(&account) {
                return Err(LedgerError::CorruptSnapshot(format!(
                    "balance for {account} appears twice"
                )));
            }
            balances.credit_all(&[(account, amount)])?;
        }
        Ok(balances)
    }
}
