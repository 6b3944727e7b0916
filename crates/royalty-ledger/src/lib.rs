//! # royalty-ledger
//!
//! Royalty accounting for registered tracks.
//!
//! A track is registered once with an immutable, ordered split of right
//! holders in basis points. Revenue added to a track is divided among the
//! holders with exact integer arithmetic and credited to pending balances,
//! which holders later withdraw (pull payment).
//!
//! ## Modules
//!
//! - [`registry`]: Track registration and split validation
//! - [`distributor`]: Pro-rata revenue division, remainder to the last holder
//! - [`vault`]: Pending balances and the withdrawal transfer seam
//! - [`event_log`]: Append-only event log, live subscriptions, replay
//! - [`ledger`]: The [`Ledger`] handle tying the above together
//! - [`config`]: TOML configuration
//! - [`snapshot`]: JSON persistence of ledger state

pub mod config;
pub mod distributor;
pub mod event_log;
pub mod ledger;
pub mod registry;
pub mod snapshot;
pub mod vault;

pub use config::LedgerConfig;
pub use event_log::{EventFilter, LoggedEvent, ReplayedState};
pub use ledger::Ledger;
pub use snapshot::LedgerSnapshot;
pub use vault::{FundsTransfer, TransferError};

use royalty_types::{Address, Amount, TrackId};

/// Error types for ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A track with this identifier is already registered.
    #[error("track {track_id} is already registered")]
    DuplicateTrack {
        /// The colliding identifier.
        track_id: TrackId,
    },

    /// The right-holder list is empty.
    #[error("right-holder list is empty")]
    EmptyHolderList,

    /// A right holder address is the zero address.
    #[error("invalid right-holder address {address}")]
    InvalidAddress {
        /// The rejected address.
        address: Address,
    },

    /// An address appears more than once in the right-holder list.
    #[error("address {address} appears more than once")]
    DuplicateAddress {
        /// The repeated address.
        address: Address,
    },

    /// Basis points do not sum to 10000, or a single value exceeds 10000.
    #[error("basis points must sum to 10000, got {total}")]
    PercentageSumInvalid {
        /// The actual total.
        total: u64,
    },

    /// Holder and percentage lists have different lengths.
    #[error("{holders} holders but {percentages} percentages")]
    HolderLengthMismatch {
        /// Number of holder addresses.
        holders: usize,
        /// Number of percentages.
        percentages: usize,
    },

    /// More right holders than the configured limit.
    #[error("{count} right holders exceeds the limit of {max}")]
    TooManyHolders {
        /// Number of holders supplied.
        count: usize,
        /// Configured maximum.
        max: usize,
    },

    /// No track with this identifier is registered.
    #[error("track {track_id} not found")]
    TrackNotFound {
        /// The missing identifier.
        track_id: TrackId,
    },

    /// Revenue amount is zero.
    #[error("revenue amount must be positive")]
    ZeroOrNegativeAmount,

    /// The caller has nothing to withdraw.
    #[error("no pending balance for {account}")]
    NoPendingBalance {
        /// The caller.
        account: Address,
    },

    /// A previous withdrawal for this account has not finished its transfer.
    #[error("withdrawal for {account} already in progress")]
    WithdrawalInProgress {
        /// The caller.
        account: Address,
    },

    /// The external transfer failed; the pending balance was restored.
    #[error("transfer of {amount} to {account} failed: {reason}")]
    TransferFailed {
        /// The caller.
        account: Address,
        /// Amount that was attempted and restored.
        amount: Amount,
        /// Reason reported by the transfer.
        reason: String,
    },

    /// A balance or track total would exceed the representable range.
    #[error("arithmetic overflow in ledger accounting")]
    Overflow,

    /// A snapshot cannot be taken while a withdrawal transfer is in flight.
    #[error("withdrawal of {amount} in flight")]
    WithdrawalInFlight {
        /// Total amount currently being transferred.
        amount: Amount,
    },

    /// An event stream is not a valid ledger history.
    #[error("invalid event stream: {0}")]
    InvalidEventStream(String),

    /// A snapshot failed validation.
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Whether the caller may retry the same call later.
    ///
    /// Only [`LedgerError::TransferFailed`] qualifies: every other error is a
    /// usage mistake that retrying cannot fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::TransferFailed { .. })
    }
}

/// Convenience result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
