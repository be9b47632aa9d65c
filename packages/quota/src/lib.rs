#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Credit quota gate.
//!
//! A scan costs one credit per grid point (`grid_size²`). [`check_quota`]
//! is a side-effect free pre-check against a known balance. Charging is
//! done separately through a [`ledger::CreditLedger`], and only after a
//! scan has produced its summary, so failed or abandoned scans are never
//! billed.

pub mod ledger;

use localrank_scan_models::GridSize;
use serde::{Deserialize, Serialize};

pub use ledger::{CreditLedger, DebitOutcome, InMemoryLedger, LedgerError};

/// Outcome of a quota pre-check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaCheck {
    /// Whether the balance covers the scan.
    pub allowed: bool,
    /// Credits the scan will consume.
    pub required: u64,
    /// Balance the check ran against.
    pub balance: u64,
    /// Human-readable explanation.
    pub message: String,
}

/// Credits needed for a grid of the given size.
#[must_use]
pub const fn required_credits(grid_size: GridSize) -> u64 {
    grid_size.point_count()
}

/// Checks whether `balance` covers a scan of `grid_size`.
#[must_use]
pub fn check_quota(grid_size: GridSize, balance: u64) -> QuotaCheck {
    let required = required_credits(grid_size);
    let allowed = balance >= required;

    let message = if allowed {
        format!("This scan will consume {required} credits.")
    } else {
        format!("Insufficient credits. Required: {required}, Available: {balance}")
    };

    if !allowed {
        log::info!("Quota check failed for {grid_size} grid: {message}");
    }

    QuotaCheck {
        allowed,
        required,
        balance,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: u32) -> GridSize {
        GridSize::new(n).unwrap()
    }

    #[test]
    fn exact_balance_is_enough() {
        let check = check_quota(size(5), 25);
        assert!(check.allowed);
        assert_eq!(check.required, 25);
        assert_eq!(check.message, "This scan will consume 25 credits.");
    }

    #[test]
    fn one_short_is_rejected() {
        let check = check_quota(size(5), 24);
        assert!(!check.allowed);
        assert_eq!(check.required, 25);
        assert_eq!(check.balance, 24);
        assert_eq!(
            check.message,
            "Insufficient credits. Required: 25, Available: 24"
        );
    }

    #[test]
    fn cost_is_grid_size_squared() {
        assert_eq!(required_credits(size(3)), 9);
        assert_eq!(required_credits(size(7)), 49);
        assert_eq!(required_credits(size(11)), 121);
    }
}
