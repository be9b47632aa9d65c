#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Rank sampling across a geogrid.
//!
//! Queries an injected [`RankLookup`] for every grid point. Points are
//! dispatched in fixed-size batches: every lookup in a batch runs
//! concurrently, and the next batch starts only after the current one has
//! drained (plus an optional pause), which keeps third-party SERP
//! providers under their rate limits.
//!
//! Failure handling:
//!
//! - a lookup that times out leaves the point without a rank and the scan
//!   continues;
//! - a rank outside `1..=max_rank`, or no match at all, also leaves the
//!   point without a rank;
//! - any other lookup error is terminal. In-flight lookups of the current
//!   batch are dropped (which cancels them), no further batch is
//!   dispatched, and points already resolved keep their ranks.

pub mod progress;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt as _};
use localrank_scan_models::{Coordinate, GridPoint};
use thiserror::Error;

use crate::progress::ProgressCallback;

/// Errors a single rank lookup can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// The lookup did not answer in time. Recorded as "not found".
    #[error("Lookup timed out")]
    Timeout,

    /// Hard failure (malformed response, auth failure, ...). Aborts the scan.
    #[error("Lookup failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Source of search rankings, typically a SERP API client.
///
/// Implementations return the 1-based position of `business_name` in the
/// results for `keyword` as seen from `coord`, or `None` if the business
/// is not on the result page.
#[async_trait]
pub trait RankLookup: Send + Sync {
    /// Looks up the rank at a single coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Timeout`] if the provider timed out, or
    /// [`LookupError::Failed`] for any non-recoverable failure.
    async fn lookup_rank(
        &self,
        coord: Coordinate,
        keyword: &str,
        business_name: &str,
    ) -> Result<Option<u32>, LookupError>;
}

/// Tuning for a sampling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerOptions {
    /// Lookups dispatched concurrently per batch.
    pub batch_size: usize,
    /// Pause between consecutive batches (not after the last one).
    pub batch_delay: Duration,
    /// Per-lookup timeout; an elapsed timeout counts as "not found".
    pub lookup_timeout: Duration,
    /// Deepest rank on the queried result page.
    pub max_rank: u32,
}

impl Default for SamplerOptions {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_delay: Duration::from_millis(500),
            lookup_timeout: Duration::from_secs(30),
            max_rank: 20,
        }
    }
}

/// Counts from a completed sampling run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleReport {
    /// Points that received a rank.
    pub resolved: usize,
    /// Points where the business was not found (or ranked beyond the page).
    pub not_found: usize,
    /// Points whose lookup timed out.
    pub timed_out: usize,
}

/// A hard lookup failure that aborted sampling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Sampling failed at point {point_id}: {source}")]
pub struct SamplingError {
    /// Id of the point whose lookup failed.
    pub point_id: u32,
    /// The failure reported by the lookup.
    pub source: LookupError,
    /// Counts for the lookups that finished before the failure.
    pub report: SampleReport,
}

/// Samples ranks for every point, writing each result back to its point.
///
/// Points are processed in `options.batch_size` chunks in slice order.
///
/// # Errors
///
/// Returns [`SamplingError`] on the first hard lookup failure. `points` is
/// left partially populated: ranks resolved before the failure are kept,
/// every other point stays without a rank.
pub async fn sample(
    points: &mut [GridPoint],
    keyword: &str,
    business_name: &str,
    lookup: &dyn RankLookup,
    options: &SamplerOptions,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<SampleReport, SamplingError> {
    let batch_size = options.batch_size.max(1);
    let batch_count = points.len().div_ceil(batch_size);
    let mut report = SampleReport::default();

    if let Some(p) = progress {
        p.set_total(points.len() as u64);
    }

    for (batch_idx, batch) in points.chunks_mut(batch_size).enumerate() {
        if batch_idx > 0 && !options.batch_delay.is_zero() {
            tokio::time::sleep(options.batch_delay).await;
        }

        log::debug!(
            "Sampling batch {}/{batch_count} ({} points)",
            batch_idx + 1,
            batch.len()
        );
        if let Some(p) = progress {
            p.set_message(format!("Batch {}/{batch_count}", batch_idx + 1));
        }

        let timeout = options.lookup_timeout;
        let mut in_flight: FuturesUnordered<_> = batch
            .iter()
            .enumerate()
            .map(|(idx, point)| {
                let coord = point.coord;
                async move {
                    let outcome = tokio::time::timeout(
                        timeout,
                        lookup.lookup_rank(coord, keyword, business_name),
                    )
                    .await
                    .unwrap_or(Err(LookupError::Timeout));
                    (idx, outcome)
                }
            })
            .collect();

        while let Some((idx, outcome)) = in_flight.next().await {
            let point = &mut batch[idx];

            match outcome {
                Ok(Some(rank)) if (1..=options.max_rank).contains(&rank) => {
                    point.rank = Some(rank);
                    report.resolved += 1;
                }
                Ok(Some(rank)) => {
                    log::debug!(
                        "Point {}: rank {rank} outside 1..={}, recording as not found",
                        point.id,
                        options.max_rank
                    );
                    report.not_found += 1;
                }
                Ok(None) => {
                    report.not_found += 1;
                }
                Err(LookupError::Timeout) => {
                    log::warn!("Point {}: rank lookup timed out", point.id);
                    report.timed_out += 1;
                }
                Err(source) => {
                    log::error!("Point {}: rank lookup failed: {source}", point.id);
                    if let Some(p) = progress {
                        p.finish(format!("Sampling aborted at point {}", point.id));
                    }
                    return Err(SamplingError {
                        point_id: point.id,
                        source,
                        report,
                    });
                }
            }

            if let Some(p) = progress {
                p.inc(1);
            }
        }
    }

    log::info!(
        "Sampled {} points: {} ranked, {} not found, {} timed out",
        points.len(),
        report.resolved,
        report.not_found,
        report.timed_out
    );
    if let Some(p) = progress {
        p.finish(format!("{} of {} points ranked", report.resolved, points.len()));
    }

    Ok(report)
}
