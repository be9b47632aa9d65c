#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geogrid scan data model.
//!
//! These types describe a single rank-tracking scan: the request that
//! starts it, the grid of sample points it produces, the per-point rank
//! outcome and the rolled-up [`Summary`]. They are shared by the grid
//! generator, the rank sampler, the metrics aggregator and the trend
//! engine, and serialize to camelCase JSON for renderers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Highest rank (inclusive) counted as "top 3".
pub const TOP3_MAX_RANK: u32 = 3;

/// Highest rank (inclusive) counted as "top 10" (visible).
pub const TOP10_MAX_RANK: u32 = 10;

/// A geographic coordinate in WGS84 decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude, `[-90, 90]`.
    pub lat: f64,
    /// Longitude, `[-180, 180]`.
    pub lng: f64,
}

impl Coordinate {
    /// Creates a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if either component is not finite
    /// or falls outside its range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinateError> {
        let coord = Self { lat, lng };
        coord.validate()?;
        Ok(coord)
    }

    /// Creates a coordinate without validation. Use with trusted inputs only.
    #[must_use]
    pub const fn new_unchecked(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Checks that both components are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinateError`] if the coordinate is out of range.
    pub fn validate(&self) -> Result<(), InvalidCoordinateError> {
        let lat_ok = self.lat.is_finite() && (-90.0..=90.0).contains(&self.lat);
        let lng_ok = self.lng.is_finite() && (-180.0..=180.0).contains(&self.lng);
        if lat_ok && lng_ok {
            Ok(())
        } else {
            Err(InvalidCoordinateError {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }
}

impl From<Coordinate> for geo::Point<f64> {
    fn from(coord: Coordinate) -> Self {
        Self::new(coord.lng, coord.lat)
    }
}

/// Error returned when a coordinate is outside the valid WGS84 range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvalidCoordinateError {
    /// The rejected latitude.
    pub lat: f64,
    /// The rejected longitude.
    pub lng: f64,
}

impl std::fmt::Display for InvalidCoordinateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid coordinate ({}, {}): expected lat in [-90, 90] and lng in [-180, 180]",
            self.lat, self.lng
        )
    }
}

impl std::error::Error for InvalidCoordinateError {}

/// Side length of a scan grid: odd and at least 3.
///
/// The upper bound is a deployment setting (`max_grid_size`), not part of
/// the type, so larger grids only need a configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct GridSize(u32);

impl GridSize {
    /// Smallest grid a scan may request.
    pub const MIN: u32 = 3;

    /// Creates a validated grid size.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidGridSizeError`] if `value` is even or below
    /// [`GridSize::MIN`].
    pub const fn new(value: u32) -> Result<Self, InvalidGridSizeError> {
        if value < Self::MIN || value % 2 == 0 {
            return Err(InvalidGridSizeError { value });
        }
        Ok(Self(value))
    }

    /// Returns the side length.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Number of sample points in the grid (`size²`).
    #[must_use]
    pub const fn point_count(self) -> u64 {
        (self.0 as u64) * (self.0 as u64)
    }
}

impl TryFrom<u32> for GridSize {
    type Error = InvalidGridSizeError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<GridSize> for u32 {
    fn from(size: GridSize) -> Self {
        size.0
    }
}

impl std::fmt::Display for GridSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.0, self.0)
    }
}

/// Error returned when a grid size is even or too small.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidGridSizeError {
    /// The rejected value.
    pub value: u32,
}

impl std::fmt::Display for InvalidGridSizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid grid size {}: expected an odd number >= {}",
            self.value,
            GridSize::MIN
        )
    }
}

impl std::error::Error for InvalidGridSizeError {}

/// Input for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    /// Grid center, usually the business location.
    pub center: Coordinate,
    /// Distance from the center to the grid edge, in kilometers.
    pub radius_km: f64,
    /// Grid side length.
    pub grid_size: GridSize,
    /// Search query issued at every point.
    pub keyword: String,
    /// Business to locate in the results.
    pub business_name: String,
}

impl ScanRequest {
    /// Validates the request against deployment limits.
    ///
    /// # Errors
    ///
    /// Returns [`ScanRequestError`] for an invalid center, a radius outside
    /// `(0, max_radius_km]`, a grid larger than `max_grid_size`, or a blank
    /// keyword/business name.
    pub fn validate(&self, max_radius_km: f64, max_grid_size: u32) -> Result<(), ScanRequestError> {
        self.center.validate()?;

        if !self.radius_km.is_finite() || self.radius_km <= 0.0 || self.radius_km > max_radius_km {
            return Err(ScanRequestError::RadiusOutOfRange {
                radius_km: self.radius_km,
                max_radius_km,
            });
        }

        if self.grid_size.get() > max_grid_size {
            return Err(ScanRequestError::GridSizeTooLarge {
                grid_size: self.grid_size.get(),
                max_grid_size,
            });
        }

        if self.keyword.trim().is_empty() {
            return Err(ScanRequestError::EmptyKeyword);
        }

        if self.business_name.trim().is_empty() {
            return Err(ScanRequestError::EmptyBusinessName);
        }

        Ok(())
    }
}

/// Reasons a [`ScanRequest`] is rejected before any I/O.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScanRequestError {
    /// Center outside the WGS84 range.
    #[error(transparent)]
    Coordinate(#[from] InvalidCoordinateError),

    /// Grid size even or below the minimum.
    #[error(transparent)]
    GridSize(#[from] InvalidGridSizeError),

    /// Radius not in `(0, max_radius_km]`.
    #[error("radius {radius_km} km out of range: expected (0, {max_radius_km}]")]
    RadiusOutOfRange {
        /// Requested radius.
        radius_km: f64,
        /// Configured maximum.
        max_radius_km: f64,
    },

    /// Grid larger than the configured maximum.
    #[error("grid size {grid_size} exceeds the maximum of {max_grid_size}")]
    GridSizeTooLarge {
        /// Requested grid size.
        grid_size: u32,
        /// Configured maximum.
        max_grid_size: u32,
    },

    /// Keyword is empty or whitespace.
    #[error("keyword must not be empty")]
    EmptyKeyword,

    /// Business name is empty or whitespace.
    #[error("business name must not be empty")]
    EmptyBusinessName,
}

/// Visibility band of a single grid point.
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
pub enum PointStatus {
    /// Rank 1-3 (local pack).
    Success,
    /// Rank 4-10 (visible, outside the local pack).
    Warning,
    /// Rank above 10 or not found.
    Danger,
}

impl PointStatus {
    /// Classifies a rank. Absent ranks are [`PointStatus::Danger`].
    #[must_use]
    pub const fn from_rank(rank: Option<u32>) -> Self {
        match rank {
            Some(r) if r <= TOP3_MAX_RANK => Self::Success,
            Some(r) if r <= TOP10_MAX_RANK => Self::Warning,
            _ => Self::Danger,
        }
    }

    /// Display color for this band.
    #[must_use]
    pub const fn color(self) -> RankColor {
        match self {
            Self::Success => RankColor::Green,
            Self::Warning => RankColor::Yellow,
            Self::Danger => RankColor::Red,
        }
    }
}

/// Color hint handed to map and report renderers.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RankColor {
    /// `#22c55e`
    Green,
    /// `#eab308`
    Yellow,
    /// `#ef4444`
    Red,
}

impl RankColor {
    /// Hex form used by marker renderers.
    #[must_use]
    pub const fn hex(self) -> &'static str {
        match self {
            Self::Green => "#22c55e",
            Self::Yellow => "#eab308",
            Self::Red => "#ef4444",
        }
    }
}

/// One sample location in a scan grid.
///
/// Created by the grid generator with no rank, given a rank (or left
/// without one) by the sampler, then classified once by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPoint {
    /// 1-based id in row-major order.
    pub id: u32,
    /// 0-based row, 0 = northernmost.
    pub row: u32,
    /// 0-based column, 0 = westernmost.
    pub col: u32,
    /// Location of the sample.
    pub coord: Coordinate,
    /// Detected rank, `None` when not found or not resolved.
    pub rank: Option<u32>,
    /// Visibility band, set by classification.
    pub status: Option<PointStatus>,
    /// Color hint, set by classification.
    pub color_hint: Option<RankColor>,
}

impl GridPoint {
    /// Creates an unranked, unclassified point.
    #[must_use]
    pub const fn new(id: u32, row: u32, col: u32, coord: Coordinate) -> Self {
        Self {
            id,
            row,
            col,
            coord,
            rank: None,
            status: None,
            color_hint: None,
        }
    }
}

/// Rolled-up visibility metrics for one scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Mean of all detected ranks (ARP), `None` if no point has a rank.
    pub average_rank: Option<f64>,
    /// Percentage of all points ranked within the top 10, `[0, 100]`.
    pub visibility_score: f64,
    /// Points ranked 1-3.
    pub top3_count: usize,
    /// Points ranked 1-10.
    pub top10_count: usize,
    /// All points in the scan, ranked or not.
    pub total_points: usize,
    /// Change in ARP against the previous scan; positive is an improvement.
    pub trend: Option<f64>,
}

/// A completed (or partially completed) scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Unique scan id.
    pub id: Uuid,
    /// Keyword that was searched.
    pub keyword: String,
    /// Grid side length.
    pub grid_size: GridSize,
    /// Grid radius in kilometers.
    pub radius_km: f64,
    /// Points in row-major order.
    pub points: Vec<GridPoint>,
    /// Aggregated metrics.
    pub summary: Summary,
    /// Credits charged (or to be charged) for this scan; 0 for a failed scan.
    pub credits_used: u64,
    /// When the scan finished.
    pub created_at: DateTime<Utc>,
}

impl ScanResult {
    /// Points with a detected rank.
    pub fn ranked_points(&self) -> impl Iterator<Item = &GridPoint> {
        self.points.iter().filter(|p| p.rank.is_some())
    }
}

/// One persisted ARP snapshot, in project history order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// When the scan ran.
    pub timestamp: DateTime<Utc>,
    /// ARP of that scan.
    pub average_rank: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_range_checked() {
        assert!(Coordinate::new(-22.9711, -43.1825).is_ok());
        assert!(Coordinate::new(90.0, 180.0).is_ok());
        assert!(Coordinate::new(90.1, 0.0).is_err());
        assert!(Coordinate::new(0.0, -180.5).is_err());
        assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn coordinate_converts_to_geo_point_as_lng_lat() {
        let point: geo::Point<f64> = Coordinate::new_unchecked(10.0, 20.0).into();
        assert!((point.x() - 20.0).abs() < f64::EPSILON);
        assert!((point.y() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn grid_size_must_be_odd_and_at_least_three() {
        for v in [3, 5, 7, 9, 11] {
            assert_eq!(GridSize::new(v).unwrap().get(), v);
        }
        for v in [0, 1, 2, 4, 6, 8] {
            assert_eq!(GridSize::new(v), Err(InvalidGridSizeError { value: v }));
        }
        assert_eq!(GridSize::new(7).unwrap().point_count(), 49);
    }

    #[test]
    fn grid_size_deserialization_is_validated() {
        let ok: GridSize = serde_json::from_str("5").unwrap();
        assert_eq!(ok.get(), 5);
        assert!(serde_json::from_str::<GridSize>("4").is_err());
    }

    #[test]
    fn status_band_boundaries() {
        assert_eq!(PointStatus::from_rank(None), PointStatus::Danger);
        assert_eq!(PointStatus::from_rank(Some(1)), PointStatus::Success);
        assert_eq!(PointStatus::from_rank(Some(3)), PointStatus::Success);
        assert_eq!(PointStatus::from_rank(Some(4)), PointStatus::Warning);
        assert_eq!(PointStatus::from_rank(Some(10)), PointStatus::Warning);
        assert_eq!(PointStatus::from_rank(Some(11)), PointStatus::Danger);
        assert_eq!(PointStatus::from_rank(Some(20)), PointStatus::Danger);
    }

    #[test]
    fn status_colors() {
        assert_eq!(PointStatus::Success.color(), RankColor::Green);
        assert_eq!(PointStatus::Warning.color(), RankColor::Yellow);
        assert_eq!(PointStatus::Danger.color().hex(), "#ef4444");
        assert_eq!(RankColor::Yellow.to_string(), "yellow");
        assert_eq!(PointStatus::Danger.as_ref(), "danger");
    }

    fn request() -> ScanRequest {
        ScanRequest {
            center: Coordinate::new_unchecked(-22.9711, -43.1825),
            radius_km: 2.0,
            grid_size: GridSize::new(5).unwrap(),
            keyword: "dentista".to_string(),
            business_name: "Clinica Sorriso".to_string(),
        }
    }

    #[test]
    fn request_validation() {
        assert!(request().validate(50.0, 7).is_ok());

        let mut r = request();
        r.radius_km = 0.0;
        assert!(matches!(
            r.validate(50.0, 7),
            Err(ScanRequestError::RadiusOutOfRange { .. })
        ));

        let mut r = request();
        r.radius_km = 50.5;
        assert!(r.validate(50.0, 7).is_err());

        let mut r = request();
        r.grid_size = GridSize::new(9).unwrap();
        assert_eq!(
            r.validate(50.0, 7),
            Err(ScanRequestError::GridSizeTooLarge {
                grid_size: 9,
                max_grid_size: 7
            })
        );

        let mut r = request();
        r.keyword = "   ".to_string();
        assert_eq!(r.validate(50.0, 7), Err(ScanRequestError::EmptyKeyword));

        let mut r = request();
        r.business_name = String::new();
        assert_eq!(r.validate(50.0, 7), Err(ScanRequestError::EmptyBusinessName));
    }

    #[test]
    fn summary_serializes_camel_case() {
        let summary = Summary {
            average_rank: None,
            visibility_score: 0.0,
            top3_count: 0,
            top10_count: 0,
            total_points: 9,
            trend: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalPoints"], 9);
        assert!(json["averageRank"].is_null());
    }
}
