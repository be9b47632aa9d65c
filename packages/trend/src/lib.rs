#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Rank trend across scans.
//!
//! Trend is the change in average rank position (ARP) between the previous
//! scan and the current one, computed as `previous - current`. Lower ranks
//! are better, so a **positive trend is an improvement**. Every function in
//! this crate goes through [`arp_delta`] so the sign convention lives in
//! one place.
//!
//! History is supplied read-only by the persistence layer, oldest first.

use chrono::{DateTime, Utc};
use localrank_scan_models::{HistoryEntry, Summary};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// ARP change from `previous` to `current`; positive means improvement.
#[must_use]
pub fn arp_delta(previous: f64, current: f64) -> f64 {
    previous - current
}

/// Computes the trend of `current` against project history.
///
/// `history` is ordered oldest first and includes the current scan as its
/// last entry, so the comparison point is the second-to-last entry. Returns
/// `None` with fewer than two entries or when the current scan has no ARP.
#[must_use]
pub fn compute_trend(current: &Summary, history: &[HistoryEntry]) -> Option<f64> {
    let current_arp = current.average_rank?;
    let [.., previous, _] = history else {
        return None;
    };
    Some(arp_delta(previous.average_rank, current_arp))
}

/// Direction of a trend value.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrendDirection {
    /// ARP went down (better).
    Improved,
    /// ARP went up (worse).
    Declined,
    /// ARP unchanged.
    Stable,
    /// Nothing to compare against.
    FirstScan,
    /// A previous scan exists but one side has no ARP.
    NoData,
}

impl TrendDirection {
    /// Classifies a trend value. `None` is [`TrendDirection::FirstScan`].
    #[must_use]
    pub fn from_trend(trend: Option<f64>) -> Self {
        match trend {
            None => Self::FirstScan,
            Some(t) if t.abs() < f64::EPSILON => Self::Stable,
            Some(t) if t > 0.0 => Self::Improved,
            Some(_) => Self::Declined,
        }
    }
}

/// One point of an ARP time series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// When the scan ran.
    pub timestamp: DateTime<Utc>,
    /// ARP of that scan.
    pub average_rank: f64,
    /// Trend against the previous point, `None` for the first.
    pub change: Option<f64>,
}

/// Turns history into a time-ordered series for chart renderers.
///
/// Entries are stably sorted by timestamp; `history` itself is untouched.
#[must_use]
pub fn history_series(history: &[HistoryEntry]) -> Vec<TrendPoint> {
    let mut ordered = history.to_vec();
    ordered.sort_by_key(|e| e.timestamp);

    let mut previous: Option<f64> = None;
    ordered
        .into_iter()
        .map(|entry| {
            let change = previous.map(|prev| arp_delta(prev, entry.average_rank));
            previous = Some(entry.average_rank);
            TrendPoint {
                timestamp: entry.timestamp,
                average_rank: entry.average_rank,
                change,
            }
        })
        .collect()
}

/// Week-over-week comparison of two scan summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyComparison {
    /// `previous ARP - current ARP`; positive is an improvement.
    pub arp_change: Option<f64>,
    /// `current - previous` top-3 count.
    pub top3_change: Option<i64>,
    /// `current - previous` top-10 count.
    pub top10_change: Option<i64>,
    /// `current - previous` visibility score, in percentage points.
    pub visibility_change: Option<f64>,
    /// ARP improvement relative to the previous ARP, in percent.
    pub improvement_percent: Option<f64>,
    /// Overall direction.
    pub direction: TrendDirection,
}

impl WeeklyComparison {
    /// Compares `current` against the `previous` scan, if there was one.
    #[must_use]
    pub fn between(current: &Summary, previous: Option<&Summary>) -> Self {
        let Some(previous) = previous else {
            return Self {
                arp_change: None,
                top3_change: None,
                top10_change: None,
                visibility_change: None,
                improvement_percent: None,
                direction: TrendDirection::FirstScan,
            };
        };

        let arps = previous.average_rank.zip(current.average_rank);
        let arp_change = arps.map(|(prev, cur)| arp_delta(prev, cur));
        let improvement_percent = arps
            .filter(|(prev, _)| *prev > 0.0)
            .map(|(prev, cur)| arp_delta(prev, cur) / prev * 100.0);

        let direction = if arp_change.is_some() {
            TrendDirection::from_trend(arp_change)
        } else {
            TrendDirection::NoData
        };

        log::debug!("Weekly comparison: arp_change={arp_change:?} direction={direction}");

        Self {
            arp_change,
            top3_change: Some(count_delta(current.top3_count, previous.top3_count)),
            top10_change: Some(count_delta(current.top10_count, previous.top10_count)),
            visibility_change: Some(current.visibility_score - previous.visibility_score),
            improvement_percent,
            direction,
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn count_delta(current: usize, previous: usize) -> i64 {
    current as i64 - previous as i64
}
