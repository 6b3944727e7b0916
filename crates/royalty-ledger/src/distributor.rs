//! Pro-rata revenue distribution.
//!
//! Every holder except the last receives `floor(amount * bp / 10000)`; the
//! last holder receives whatever is left. Credits therefore always sum to
//! exactly `amount`, and the rounding loss of floor division lands on one
//! well-defined holder.

use royalty_types::{Address, Amount, BasisPoints, RightHolder, TrackId, BASIS_POINTS_TOTAL};
use tracing::debug;

use crate::registry::{validate_split, TrackRegistry};
use crate::vault::PendingBalances;
use crate::{LedgerError, Result};

/// `floor(amount * basis_points / 10000)` without overflow.
///
/// Splitting `amount` into `q * 10000 + r` keeps every intermediate below
/// `amount` (for `basis_points <= 10000`), so this is exact for all `u128`.
pub fn share_of(amount: Amount, basis_points: BasisPoints) -> Amount {
    let total = Amount::from(BASIS_POINTS_TOTAL);
    let bp = Amount::from(basis_points);
    (amount / total) * bp + (amount % total) * bp / total
}

/// Divide `amount` across `holders`, remainder to the last holder.
///
/// Returns one `(address, credit)` pair per holder, in split order.
///
/// # Errors
///
/// - [`LedgerError::ZeroOrNegativeAmount`] if the amount is zero
/// - any error from [`validate_split`] if the split is malformed
pub fn distribute(amount: Amount, holders: &[RightHolder]) -> Result<Vec<(Address, Amount)>> {
    if amount == 0 {
        return Err(LedgerError::ZeroOrNegativeAmount);
    }
    validate_split(holders, None)?;

    let (last, rest) = holders.split_last().ok_or(LedgerError::EmptyHolderList)?;

    let mut credits = Vec::with_capacity(holders.len());
    let mut allocated: Amount = 0;
    for holder in rest {
        let share = share_of(amount, holder.basis_points);
        allocated += share;
        credits.push((holder.address, share));
    }

    // Floor shares of a valid split never exceed the amount.
    let remainder = amount.checked_sub(allocated).ok_or(LedgerError::Overflow)?;
    credits.push((last.address, remainder));

    Ok(credits)
}

/// Apply revenue to a registered track.
///
/// Computes the credits, checks that neither the track total nor any
/// balance would overflow, then commits both. On error nothing changes.
///
/// # Errors
///
/// - [`LedgerError::TrackNotFound`] if the track is not registered
/// - [`LedgerError::ZeroOrNegativeAmount`] if the amount is zero
/// - [`LedgerError::Overflow`] if the track total or a balance would overflow
pub(crate) fn add_revenue(
    registry: &mut TrackRegistry,
    vault: &mut PendingBalances,
    track_id: &TrackId,
    amount: Amount,
) -> Result<Vec<(Address, Amount)>> {
    let track = registry.get(track_id).ok_or(LedgerError::TrackNotFound {
        track_id: *track_id,
    })?;
    if amount == 0 {
        return Err(LedgerError::ZeroOrNegativeAmount);
    }

    let credits = distribute(amount, track.holders())?;
    let new_total = track
        .total_received()
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;

    vault.credit_all(&credits)?;
    for (holder, share) in &credits {
        debug!(track_id = %track_id, holder = %holder, share = %share, "credited");
    }

    if let Some(track) = registry.get_mut(track_id) {
        track.set_total_received(new_total);
    }

    Ok(credits)
}
