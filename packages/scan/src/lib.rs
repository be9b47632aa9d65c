#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geogrid rank scan pipeline.
//!
//! A scan runs validate → quota gate → grid generation → sampling →
//! classification → aggregation → trend. Rank lookups, credit balances
//! and project history are injected through [`RankLookup`],
//! [`CreditLedger`] and [`store::HistoryReader`].
//!
//! [`ScanPipeline::run`] charges credits with a single atomic debit after
//! the summary exists. Nothing is charged for a scan that ends before
//! that point, including one whose future is dropped.

pub mod config;
pub mod store;

use std::sync::Arc;

use chrono::Utc;
use localrank_geogrid::{GridError, estimate_credits};
use localrank_quota::{CreditLedger, DebitOutcome, LedgerError, check_quota};
use localrank_sampler::progress::ProgressCallback;
use localrank_sampler::{RankLookup, SamplingError, sample};
use localrank_scan_models::{
    GridPoint, HistoryEntry, ScanRequest, ScanRequestError, ScanResult, Summary,
};
use serde::Serialize;
use uuid::Uuid;

pub use config::{ConfigError, ScanConfig};
pub use localrank_geogrid::generate as generate_grid;
pub use localrank_scan_models as models;
pub use localrank_trend::compute_trend;
pub use store::{HistoryError, HistoryReader, InMemoryHistory};

/// Errors that end a scan.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The request was malformed. Raised before any I/O.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// What was wrong with the request.
        message: String,
    },

    /// The balance does not cover the scan. No lookup was made and nothing
    /// was charged.
    #[error("Insufficient credits. Required: {required}, Available: {available}")]
    QuotaExceeded {
        /// Credits the scan needs.
        required: u64,
        /// Credits on the account.
        available: u64,
    },

    /// A hard lookup failure aborted sampling. `partial` holds the points
    /// resolved before the failure and a summary over them.
    #[error("Sampling failed: {source}")]
    SamplingFailed {
        /// The partially populated result; `credits_used` is 0.
        partial: Box<ScanResult>,
        /// The lookup failure.
        source: SamplingError,
    },

    /// The credit ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<ScanRequestError> for ScanError {
    fn from(value: ScanRequestError) -> Self {
        Self::InvalidParameter {
            message: value.to_string(),
        }
    }
}

impl From<GridError> for ScanError {
    fn from(value: GridError) -> Self {
        match value {
            GridError::InvalidParameter { message } => Self::InvalidParameter { message },
        }
    }
}

/// Grid and cost shown before a scan is committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPreview {
    /// Grid points, row-major, without ranks.
    pub points: Vec<GridPoint>,
    /// Number of points in the grid.
    pub total_points: usize,
    /// Credits the scan would consume.
    pub estimated_credits: u64,
}

/// Validates `request` and returns its grid and cost without sampling.
///
/// # Errors
///
/// Returns [`ScanError::InvalidParameter`] if the request is invalid.
pub fn preview_grid(request: &ScanRequest, config: &ScanConfig) -> Result<GridPreview, ScanError> {
    request.validate(config.max_radius_km, config.max_grid_size)?;
    let points = generate_grid(request.center, request.radius_km, request.grid_size.get())?;

    Ok(GridPreview {
        total_points: points.len(),
        estimated_credits: estimate_credits(request.grid_size),
        points,
    })
}

/// Runs a scan against a known `balance`.
///
/// Does not charge anything: on success the returned result carries the
/// amount in `credits_used` and the caller is responsible for debiting it.
/// [`ScanPipeline`] does both in one call.
///
/// # Errors
///
/// * [`ScanError::InvalidParameter`] for a malformed request
/// * [`ScanError::QuotaExceeded`] if `balance` does not cover the scan
/// * [`ScanError::SamplingFailed`] on a hard lookup failure
pub async fn run_scan(
    request: &ScanRequest,
    balance: u64,
    project: &str,
    lookup: &dyn RankLookup,
    history: &dyn HistoryReader,
    config: &ScanConfig,
) -> Result<ScanResult, ScanError> {
    request.validate(config.max_radius_km, config.max_grid_size)?;
    execute(request, balance, project, lookup, history, config, None).await
}

/// Scan runner bound to its collaborators.
pub struct ScanPipeline {
    config: ScanConfig,
    lookup: Arc<dyn RankLookup>,
    history: Arc<dyn HistoryReader>,
    ledger: Arc<dyn CreditLedger>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl ScanPipeline {
    /// Creates a pipeline without progress reporting.
    #[must_use]
    pub fn new(
        config: ScanConfig,
        lookup: Arc<dyn RankLookup>,
        history: Arc<dyn HistoryReader>,
        ledger: Arc<dyn CreditLedger>,
    ) -> Self {
        Self {
            config,
            lookup,
            history,
            ledger,
            progress: None,
        }
    }

    /// Reports sampling progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Configuration the pipeline validates and samples with.
    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Runs a scan for `project`, charging `account` once it succeeds.
    ///
    /// The balance is read up front so that an unaffordable scan is
    /// rejected before any lookup. The charge itself is an atomic debit
    /// after aggregation; if a concurrent scan has drained the account in
    /// the meantime this one fails with [`ScanError::QuotaExceeded`] and
    /// nothing is charged.
    ///
    /// # Errors
    ///
    /// Same as [`run_scan`], plus [`ScanError::Ledger`] if the ledger
    /// cannot be read or debited.
    pub async fn run(
        &self,
        account: &str,
        project: &str,
        request: &ScanRequest,
    ) -> Result<ScanResult, ScanError> {
        request.validate(self.config.max_radius_km, self.config.max_grid_size)?;

        let balance = self.ledger.balance(account).await?;
        let result = execute(
            request,
            balance,
            project,
            self.lookup.as_ref(),
            self.history.as_ref(),
            &self.config,
            self.progress.as_ref(),
        )
        .await?;

        match self.ledger.try_debit(account, result.credits_used).await? {
            DebitOutcome::Debited { remaining } => {
                log::info!(
                    "Scan {} charged {} credits to {account}, {remaining} remaining",
                    result.id,
                    result.credits_used
                );
                Ok(result)
            }
            DebitOutcome::Insufficient { available } => {
                log::warn!(
                    "Scan {} discarded: {account} has {available} credits left, {} required",
                    result.id,
                    result.credits_used
                );
                Err(ScanError::QuotaExceeded {
                    required: result.credits_used,
                    available,
                })
            }
        }
    }
}

/// Everything after validation. `request` must already be validated.
async fn execute(
    request: &ScanRequest,
    balance: u64,
    project: &str,
    lookup: &dyn RankLookup,
    history: &dyn HistoryReader,
    config: &ScanConfig,
    progress: Option<&Arc<dyn ProgressCallback>>,
) -> Result<ScanResult, ScanError> {
    let quota = check_quota(request.grid_size, balance);
    if !quota.allowed {
        return Err(ScanError::QuotaExceeded {
            required: quota.required,
            available: quota.balance,
        });
    }

    log::info!(
        "Starting {} scan for {project:?}: keyword={:?} radius={} km",
        request.grid_size,
        request.keyword,
        request.radius_km
    );

    let mut points = generate_grid(request.center, request.radius_km, request.grid_size.get())?;

    let sampled = sample(
        &mut points,
        &request.keyword,
        &request.business_name,
        lookup,
        &config.sampler_options(),
        progress,
    )
    .await;

    if let Err(source) = sampled {
        localrank_metrics::classify(&mut points);
        let summary = localrank_metrics::aggregate(&points);
        log::warn!(
            "Scan for {project:?} aborted with {} of {} points ranked",
            summary.total_points - count_unranked(&points),
            summary.total_points
        );
        return Err(ScanError::SamplingFailed {
            partial: Box::new(build_result(request, points, summary, 0)),
            source,
        });
    }

    localrank_metrics::classify(&mut points);
    let mut summary = localrank_metrics::aggregate(&points);
    let finished_at = Utc::now();
    summary.trend = load_trend(history, project, &summary, finished_at).await;

    let mut result = build_result(request, points, summary, quota.required);
    result.created_at = finished_at;

    log::info!(
        "Scan {} for {project:?} done: arp={:?} visibility={:.1}% trend={:?}",
        result.id,
        result.summary.average_rank,
        result.summary.visibility_score,
        result.summary.trend
    );

    Ok(result)
}

/// Best-effort trend; an unreadable history yields `None`.
async fn load_trend(
    history: &dyn HistoryReader,
    project: &str,
    summary: &Summary,
    finished_at: chrono::DateTime<Utc>,
) -> Option<f64> {
    let current_arp = summary.average_rank?;

    match history.load_history(project).await {
        Ok(mut entries) => {
            entries.push(HistoryEntry {
                timestamp: finished_at,
                average_rank: current_arp,
            });
            compute_trend(summary, &entries)
        }
        Err(e) => {
            log::warn!("Skipping trend for {project:?}: {e}");
            None
        }
    }
}

fn build_result(
    request: &ScanRequest,
    points: Vec<GridPoint>,
    summary: Summary,
    credits_used: u64,
) -> ScanResult {
    ScanResult {
        id: Uuid::new_v4(),
        keyword: request.keyword.clone(),
        grid_size: request.grid_size,
        radius_km: request.radius_km,
        points,
        summary,
        credits_used,
        created_at: Utc::now(),
    }
}

fn count_unranked(points: &[GridPoint]) -> usize {
    points.iter().filter(|p| p.rank.is_none()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone as _;
    use localrank_quota::InMemoryLedger;
    use localrank_sampler::LookupError;
    use localrank_sampler::progress::LogProgress;
    use localrank_scan_models::{Coordinate, GridSize, PointStatus};

    /// Answers every lookup with `rank` after `delay`, failing from call
    /// number `fail_from` (0-based) onwards.
    struct TestLookup {
        rank: Option<u32>,
        delay: Duration,
        fail_from: Option<usize>,
        calls: AtomicUsize,
    }

    impl TestLookup {
        fn ranking(rank: u32) -> Self {
            Self {
                rank: Some(rank),
                delay: Duration::from_millis(10),
                fail_from: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RankLookup for TestLookup {
        async fn lookup_rank(
            &self,
            _coord: Coordinate,
            _keyword: &str,
            _business_name: &str,
        ) -> Result<Option<u32>, LookupError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_from.is_some_and(|n| call >= n) {
                return Err(LookupError::Failed {
                    message: "401 Unauthorized".to_string(),
                });
            }
            tokio::time::sleep(self.delay).await;
            Ok(self.rank)
        }
    }

    struct UnavailableHistory;

    #[async_trait]
    impl HistoryReader for UnavailableHistory {
        async fn load_history(&self, _project: &str) -> Result<Vec<HistoryEntry>, HistoryError> {
            Err(HistoryError::Unavailable {
                message: "connection refused".to_string(),
            })
        }
    }

    fn config() -> ScanConfig {
        ScanConfig {
            batch_size: 5,
            batch_delay_ms: 0,
            lookup_timeout_ms: 1_000,
            max_rank: 20,
            max_grid_size: 7,
            max_radius_km: 50.0,
        }
    }

    fn request(grid_size: u32) -> ScanRequest {
        ScanRequest {
            center: Coordinate::new(-22.9711, -43.1825).unwrap(),
            radius_km: 2.0,
            grid_size: GridSize::new(grid_size).unwrap(),
            keyword: "dentist".to_string(),
            business_name: "Sorriso Copacabana".to_string(),
        }
    }

    fn pipeline(lookup: Arc<TestLookup>, ledger: Arc<InMemoryLedger>) -> ScanPipeline {
        ScanPipeline::new(config(), lookup, Arc::new(InMemoryHistory::new()), ledger)
    }

    #[tokio::test(start_paused = true)]
    async fn full_scan_produces_summary() {
        let lookup = TestLookup::ranking(2);
        let history = InMemoryHistory::new();

        let result = run_scan(&request(5), 100, "clinic", &lookup, &history, &config())
            .await
            .unwrap();

        assert_eq!(lookup.calls(), 25);
        assert_eq!(result.points.len(), 25);
        assert_eq!(result.credits_used, 25);
        assert_eq!(result.summary.average_rank, Some(2.0));
        assert_eq!(result.summary.top3_count, 25);
        assert_eq!(result.summary.top10_count, 25);
        assert!((result.summary.visibility_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(result.summary.trend, None);
        assert!(
            result
                .points
                .iter()
                .all(|p| p.status == Some(PointStatus::Success))
        );
        // Center of a 5x5 grid is point 13.
        let center = result.points[12].coord;
        assert!((center.lat - request(5).center.lat).abs() < 1e-6);
        assert!((center.lng - request(5).center.lng).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn trend_against_previous_scan() {
        let lookup = TestLookup::ranking(4);
        let history = InMemoryHistory::new();
        history
            .record(
                "clinic",
                HistoryEntry {
                    timestamp: Utc.with_ymd_and_hms(2026, 9, 1, 8, 0, 0).unwrap(),
                    average_rank: 8.0,
                },
            )
            .unwrap();

        let result = run_scan(&request(3), 100, "clinic", &lookup, &history, &config())
            .await
            .unwrap();

        assert_eq!(result.summary.trend, Some(4.0));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_history_only_drops_trend() {
        let lookup = TestLookup::ranking(4);

        let result = run_scan(
            &request(3),
            100,
            "clinic",
            &lookup,
            &UnavailableHistory,
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(result.summary.trend, None);
        assert_eq!(result.summary.average_rank, Some(4.0));
    }

    #[tokio::test(start_paused = true)]
    async fn quota_exceeded_makes_no_lookups() {
        let lookup = TestLookup::ranking(1);
        let history = InMemoryHistory::new();

        let err = run_scan(&request(5), 24, "clinic", &lookup, &history, &config())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ScanError::QuotaExceeded {
                required: 25,
                available: 24
            }
        ));
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_requests_make_no_lookups() {
        let lookup = TestLookup::ranking(1);
        let history = InMemoryHistory::new();

        let mut blank_keyword = request(3);
        blank_keyword.keyword = "  ".to_string();
        let mut too_far = request(3);
        too_far.radius_km = 80.0;

        for bad in [blank_keyword, too_far, request(9)] {
            let err = run_scan(&bad, 1_000, "clinic", &lookup, &history, &config())
                .await
                .unwrap_err();
            assert!(matches!(err, ScanError::InvalidParameter { .. }), "{err}");
        }
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn grid_past_antimeridian_is_rejected_before_lookups() {
        let lookup = TestLookup::ranking(1);
        let history = InMemoryHistory::new();
        let mut fiji = request(7);
        fiji.center = Coordinate::new(-17.0, 179.9).unwrap();
        fiji.radius_km = 40.0;

        let err = run_scan(&fiji, 1_000, "resort", &lookup, &history, &config())
            .await
            .unwrap_err();

        assert!(matches!(err, ScanError::InvalidParameter { .. }), "{err}");
        assert_eq!(lookup.calls(), 0);
        assert!(matches!(
            preview_grid(&fiji, &config()),
            Err(ScanError::InvalidParameter { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hard_failure_returns_partial_result_and_charges_nothing() {
        let lookup = Arc::new(TestLookup {
            fail_from: Some(10),
            ..TestLookup::ranking(3)
        });
        let ledger = Arc::new(InMemoryLedger::with_balance("acme", 100));
        let pipeline = pipeline(Arc::clone(&lookup), Arc::clone(&ledger));

        let err = pipeline.run("acme", "clinic", &request(5)).await.unwrap_err();

        let ScanError::SamplingFailed { partial, source } = err else {
            panic!("expected SamplingFailed");
        };
        assert_eq!(source.report.resolved, 10);
        assert_eq!(partial.points.len(), 25);
        assert_eq!(partial.ranked_points().count(), 10);
        assert!(partial.points[..10].iter().all(|p| p.rank == Some(3)));
        assert!(partial.points[10..].iter().all(|p| p.rank.is_none()));
        assert_eq!(partial.summary.top3_count, 10);
        assert!((partial.summary.visibility_score - 40.0).abs() < 1e-9);
        assert_eq!(partial.summary.trend, None);
        assert_eq!(partial.credits_used, 0);
        assert_eq!(ledger.balance("acme").await.unwrap(), 100);
    }

    #[tokio::test(start_paused = true)]
    async fn successful_run_debits_once() {
        let lookup = Arc::new(TestLookup::ranking(6));
        let ledger = Arc::new(InMemoryLedger::with_balance("acme", 100));
        let progress = Arc::new(LogProgress::new("clinic"));
        let pipeline = pipeline(lookup, Arc::clone(&ledger)).with_progress(progress.clone());

        let result = pipeline.run("acme", "clinic", &request(5)).await.unwrap();

        assert_eq!(result.credits_used, 25);
        assert_eq!(ledger.balance("acme").await.unwrap(), 75);
        assert_eq!(progress.done(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_runs_cannot_share_credits() {
        let lookup = Arc::new(TestLookup::ranking(6));
        let ledger = Arc::new(InMemoryLedger::with_balance("acme", 30));
        let pipeline = pipeline(lookup, Arc::clone(&ledger));
        let req = request(5);

        let (a, b) = tokio::join!(
            pipeline.run("acme", "clinic", &req),
            pipeline.run("acme", "clinic", &req),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes.iter().any(|r| matches!(
            r,
            Err(ScanError::QuotaExceeded {
                required: 25,
                available: 5
            })
        )));
        assert_eq!(ledger.balance("acme").await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_run_is_not_charged() {
        let lookup = Arc::new(TestLookup {
            delay: Duration::from_millis(800),
            ..TestLookup::ranking(2)
        });
        let ledger = Arc::new(InMemoryLedger::with_balance("acme", 100));
        let pipeline = pipeline(Arc::clone(&lookup), Arc::clone(&ledger));

        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            pipeline.run("acme", "clinic", &request(5)),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(lookup.calls(), 5);
        assert_eq!(ledger.balance("acme").await.unwrap(), 100);
    }

    #[tokio::test]
    async fn unknown_account_is_a_ledger_error() {
        let pipeline = pipeline(
            Arc::new(TestLookup::ranking(1)),
            Arc::new(InMemoryLedger::new()),
        );

        let err = pipeline.run("ghost", "clinic", &request(3)).await.unwrap_err();
        assert!(matches!(
            err,
            ScanError::Ledger(LedgerError::UnknownAccount { .. })
        ));
    }

    #[test]
    fn preview_reports_grid_and_cost() {
        let preview = preview_grid(&request(3), &config()).unwrap();
        assert_eq!(preview.total_points, 9);
        assert_eq!(preview.estimated_credits, 9);
        assert_eq!(preview.points[4].id, 5);
        assert!((preview.points[4].coord.lat - request(3).center.lat).abs() < 1e-6);
        assert!(preview.points.iter().all(|p| p.rank.is_none()));

        assert!(matches!(
            preview_grid(&request(9), &config()),
            Err(ScanError::InvalidParameter { .. })
        ));
    }
}
