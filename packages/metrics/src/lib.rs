#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Visibility metrics for a sampled geogrid.
//!
//! Reduces per-point ranks into a [`Summary`]:
//!
//! - **ARP** (average rank position): mean of the detected ranks only.
//! - **Top-3 / Top-10 coverage**: points ranked `<= 3` / `<= 10`.
//! - **Visibility score**: `100 x top10 / total`, measured against *all*
//!   points. A point where the business was not found counts as not
//!   visible; absence is a ranking outcome, not missing data.
//!
//! Everything here is order independent and performs no I/O.

use localrank_scan_models::{GridPoint, PointStatus, Summary, TOP3_MAX_RANK, TOP10_MAX_RANK};

/// Point counts per visibility band.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandCounts {
    /// Points ranked 1-3.
    pub success: usize,
    /// Points ranked 4-10.
    pub warning: usize,
    /// Points ranked above 10 or not found.
    pub danger: usize,
}

/// Sets `status` and `color_hint` on a point from its rank.
pub fn classify_point(point: &mut GridPoint) {
    let status = PointStatus::from_rank(point.rank);
    point.status = Some(status);
    point.color_hint = Some(status.color());
}

/// Classifies every point.
pub fn classify(points: &mut [GridPoint]) {
    for point in points.iter_mut() {
        classify_point(point);
    }
}

/// Rolls per-point ranks up into a [`Summary`].
///
/// `trend` is left `None`; it is filled in by the trend engine.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate(points: &[GridPoint]) -> Summary {
    let total_points = points.len();

    let mut rank_sum = 0u64;
    let mut ranked = 0usize;
    let mut top3_count = 0usize;
    let mut top10_count = 0usize;

    for rank in points.iter().filter_map(|p| p.rank) {
        rank_sum += u64::from(rank);
        ranked += 1;
        if rank <= TOP3_MAX_RANK {
            top3_count += 1;
        }
        if rank <= TOP10_MAX_RANK {
            top10_count += 1;
        }
    }

    let average_rank = (ranked > 0).then(|| ratio(rank_sum as f64, ranked));
    let visibility_score = if total_points == 0 {
        0.0
    } else {
        100.0 * ratio(top10_count as f64, total_points)
    };

    log::debug!(
        "Aggregated {total_points} points: {ranked} ranked, top3={top3_count}, \
         top10={top10_count}, visibility={visibility_score:.2}"
    );

    Summary {
        average_rank,
        visibility_score,
        top3_count,
        top10_count,
        total_points,
        trend: None,
    }
}

/// Counts points per visibility band, straight from their ranks.
#[must_use]
pub fn band_counts(points: &[GridPoint]) -> BandCounts {
    points
        .iter()
        .fold(BandCounts::default(), |mut counts, point| {
            match PointStatus::from_rank(point.rank) {
                PointStatus::Success => counts.success += 1,
                PointStatus::Warning => counts.warning += 1,
                PointStatus::Danger => counts.danger += 1,
            }
            counts
        })
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: f64, denominator: usize) -> f64 {
    numerator / denominator as f64
}
