//! Integration test crate for the royalty ledger.
//!
//! This crate has no library code of its own beyond a few shared test
//! helpers; the tests in `tests/` exercise end-to-end flows across the
//! workspace crates.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p royalty-integration-tests
//! ```

use std::sync::Once;

use royalty_ledger::TransferError;
use royalty_types::{Address, Amount, RightHolder};

/// Install a test-friendly tracing subscriber once per test binary.
///
/// Respects `RUST_LOG`; output is captured by the test harness.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Deterministic non-zero test address.
pub fn addr(n: u8) -> Address {
    Address::new([n; 20])
}

/// Build a split from `(address byte, basis points)` pairs.
pub fn split(entries: &[(u8, u16)]) -> Vec<RightHolder> {
    entries
        .iter()
        .map(|(n, bp)| RightHolder::new(addr(*n), *bp))
        .collect()
}

/// A transfer that always succeeds.
pub fn accept(_: &Address, _: Amount) -> Result<(), TransferError> {
    Ok(())
}

/// A transfer that always fails.
pub fn reject(_: &Address, _: Amount) -> Result<(), TransferError> {
    Err(TransferError::new("recipient rejected funds"))
}
