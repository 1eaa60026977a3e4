//! # Geographic Utilities
//!
//! Small geographic helpers shared by the simplifier.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`meters_to_degrees`] | Convert a tolerance in meters to degrees at a latitude |
//! | [`haversine_distance`] | Great-circle distance between two track points |
//! | [`polyline_length`] | Total length of a segment in meters |
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees), which is
//! what GPX files carry.

use geo::{Distance, Haversine, Point};

use crate::TrackPoint;

/// Meters per degree of longitude at the equator.
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Convert meters to approximate degrees at a given latitude.
///
/// Equirectangular approximation: `meters / (111320 * cos(latitude))`. It is
/// only meant for local tolerances of tens to a few hundred meters and degrades
/// towards the poles, where the divisor approaches zero.
///
/// # Example
///
/// ```rust
/// use trail_redux::geo_utils::meters_to_degrees;
///
/// let deg = meters_to_degrees(111_320.0, 0.0);
/// assert!((deg - 1.0).abs() < 1e-9);
/// ```
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    meters / (METERS_PER_DEGREE * lat_rad.cos())
}

/// Great-circle distance between two track points in meters.
#[inline]
pub fn haversine_distance(p1: &TrackPoint, p2: &TrackPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Total length of a polyline in meters. Empty or single-point input is 0.
pub fn polyline_length(points: &[TrackPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}
