#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geogrid generation.
//!
//! Lays out a square lattice of sample coordinates around a center point.
//! The lattice spans the square that bounds a circle of the given radius,
//! so a 2 km radius produces a 4 km x 4 km grid.
//!
//! Meter offsets are converted to degrees with a linear (equirectangular)
//! approximation:
//!
//! - latitude: 1 degree = [`METERS_PER_LAT_DEGREE`] meters
//! - longitude: 1 degree = [`METERS_PER_LAT_DEGREE`] x cos(center latitude)
//!
//! This is accurate for the short radii used by local scans (up to ~50 km)
//! and degrades at high latitudes and large radii. No correction is applied.

use localrank_scan_models::{Coordinate, GridPoint, GridSize, ScanRequest};
use thiserror::Error;

/// Meters in one degree of latitude (constant in the linear approximation).
pub const METERS_PER_LAT_DEGREE: f64 = 111_111.0;

/// Decimal places kept on generated coordinates (~0.1 m).
const COORD_DECIMALS: i32 = 6;

/// Errors from grid generation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GridError {
    /// A generation parameter was out of range.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the rejected parameter.
        message: String,
    },
}

/// Generates a `grid_size` x `grid_size` grid around `center`.
///
/// Points are ordered row-major from north-west to south-east and carry
/// ids `1..=grid_size²`. A grid of size 1 is the center alone. Even sizes
/// are accepted here; the lattice is then offset half a step so that no
/// point sits exactly on the center.
///
/// Every coordinate, the center point included, is rounded to 6 decimals.
///
/// # Errors
///
/// Returns [`GridError::InvalidParameter`] if `grid_size` is 0, the radius
/// is not a positive finite number, the center is invalid or on a pole
/// (where longitude degrees have no width), or the grid would reach past
/// a pole or the antimeridian. Such grids are rejected, never wrapped.
pub fn generate(
    center: Coordinate,
    radius_km: f64,
    grid_size: u32,
) -> Result<Vec<GridPoint>, GridError> {
    if grid_size < 1 {
        return Err(invalid(format!("grid size must be at least 1, got {grid_size}")));
    }
    if !radius_km.is_finite() || radius_km <= 0.0 {
        return Err(invalid(format!("radius must be positive, got {radius_km} km")));
    }
    if let Err(e) = center.validate() {
        return Err(invalid(e.to_string()));
    }
    if center.lat.abs() >= 90.0 {
        return Err(invalid("grid cannot be centered on a pole".to_string()));
    }

    if grid_size == 1 {
        return Ok(vec![GridPoint::new(1, 0, 0, rounded(center.lat, center.lng)?)]);
    }

    let step_m = step_distance_m(radius_km, grid_size);
    let half = f64::from(grid_size - 1) / 2.0;
    let meters_per_lng_degree = METERS_PER_LAT_DEGREE * center.lat.to_radians().cos();

    let mut points = Vec::with_capacity((grid_size as usize) * (grid_size as usize));
    let mut id = 1;

    for row in 0..grid_size {
        for col in 0..grid_size {
            // Positive north / east.
            let offset_lat_m = (half - f64::from(row)) * step_m;
            let offset_lng_m = (f64::from(col) - half) * step_m;

            let lat = center.lat + offset_lat_m / METERS_PER_LAT_DEGREE;
            let lng = center.lng + offset_lng_m / meters_per_lng_degree;

            points.push(GridPoint::new(id, row, col, rounded(lat, lng)?));
            id += 1;
        }
    }

    log::debug!(
        "Generated {grid_size}x{grid_size} grid around ({}, {}) with {step_m:.1} m spacing",
        center.lat,
        center.lng
    );

    Ok(points)
}

/// Generates the grid described by a scan request.
///
/// # Errors
///
/// Returns [`GridError`] under the same conditions as [`generate`].
pub fn generate_for(request: &ScanRequest) -> Result<Vec<GridPoint>, GridError> {
    generate(request.center, request.radius_km, request.grid_size.get())
}

/// Distance in meters between adjacent points of a grid.
///
/// The grid spans `2 x radius_km`, split into `grid_size - 1` intervals.
/// Returns `0.0` for a single-point grid.
#[must_use]
pub fn step_distance_m(radius_km: f64, grid_size: u32) -> f64 {
    if grid_size <= 1 {
        return 0.0;
    }
    (radius_km * 2_000.0) / f64::from(grid_size - 1)
}

/// Credits needed to scan a grid: one lookup per point.
#[must_use]
pub const fn estimate_credits(grid_size: GridSize) -> u64 {
    grid_size.point_count()
}

fn round_coord(value: f64) -> f64 {
    let factor = 10f64.powi(COORD_DECIMALS);
    (value * factor).round() / factor
}

fn rounded(lat: f64, lng: f64) -> Result<Coordinate, GridError> {
    Coordinate::new(round_coord(lat), round_coord(lng)).map_err(|e| {
        invalid(format!(
            "grid extends outside valid coordinates ({e}); reduce the radius or move the center"
        ))
    })
}

fn invalid(message: String) -> GridError {
    GridError::InvalidParameter { message }
}
