//! # Geographic Utilities
//!
//! Distance and bounding-box helpers shared by every stage of course construction.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine`] | Great-circle distance in meters between two lat/lon pairs |
//! | [`haversine_distance`] | Same, for two [`GpsPoint`]s |
//! | [`polyline_length`] | Total length of a polyline in kilometers |
//! | [`bbox_from_center`] | Query box around a center point and radius |
//! | [`bbox_intersects`] | Separating-axis overlap test for two boxes |
//!
//! ## Example
//!
//! ```rust
//! use trek_courses::{GpsPoint, geo_utils};
//!
//! let ridge = vec![
//!     GpsPoint::new(37.6588, 126.9779),
//!     GpsPoint::new(37.6612, 126.9801),
//!     GpsPoint::new(37.6640, 126.9825),
//! ];
//!
//! let km = geo_utils::polyline_length(&ridge);
//! assert!(km > 0.5 && km < 1.0);
//!
//! let area = geo_utils::bbox_from_center(37.5665, 126.9780, 8.0);
//! assert!(area.south < area.north && area.west < area.east);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the haversine formula on a sphere of radius 6,371,000 m. This is the
//! only distance metric in the crate, so stitching tolerances, length filters and
//! endpoint matching all agree with each other.
//!
//! Bounding boxes use a planar approximation of 111 km per degree, with the longitude
//! span widened by `1 / cos(latitude)` (floored at 0.2 so boxes near the poles stay finite).

use crate::{BoundingBox, GpsPoint};

/// Earth radius used by [`haversine`], in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Kilometers per degree used when building query boxes.
pub const KM_PER_DEGREE: f64 = 111.0;

/// Lower bound on `cos(latitude)` when widening longitude spans.
const MIN_LON_SCALE: f64 = 0.2;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between `(lat1, lon1)` and `(lat2, lon2)`.
///
/// # Example
///
/// ```rust
/// use trek_courses::geo_utils::haversine;
///
/// // Seoul City Hall to Bukhansan Baegundae
/// let d = haversine(37.5663, 126.9779, 37.6588, 126.9779);
/// assert!((d - 10_285.0).abs() < 10.0);
/// assert_eq!(haversine(37.5, 127.0, 37.5, 127.0), 0.0);
/// ```
#[inline]
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}

/// [`haversine`] for two points.
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine(p1.latitude, p1.longitude, p2.latitude, p2.longitude)
}

/// Total length of a polyline in kilometers.
///
/// Sums the haversine distance between consecutive points. Fewer than two points
/// yield 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let meters: f64 = points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum();
    meters / 1000.0
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Build a `(south, west, north, east)` box around a center point.
///
/// The latitude half-span is `radius_km / 111`; the longitude half-span is
/// `radius_km / (111 * max(0.2, cos(lat)))`.
pub fn bbox_from_center(lat: f64, lon: f64, radius_km: f64) -> BoundingBox {
    let dlat = radius_km / KM_PER_DEGREE;
    let dlon = radius_km / (KM_PER_DEGREE * lat.to_radians().cos().max(MIN_LON_SCALE));

    BoundingBox {
        south: lat - dlat,
        west: lon - dlon,
        north: lat + dlat,
        east: lon + dlon,
    }
}

/// Check whether two boxes overlap. Touching edges count as overlapping.
pub fn bbox_intersects(a: &BoundingBox, b: &BoundingBox) -> bool {
    !(a.north < b.south || b.north < a.south || a.east < b.west || b.east < a.west)
}

/// Bounding box of a set of points, or `None` for an empty slice.
pub fn compute_bounds(points: &[GpsPoint]) -> Option<BoundingBox> {
    let first = points.first()?;
    let mut bbox = BoundingBox {
        south: first.latitude,
        west: first.longitude,
        north: first.latitude,
        east: first.longitude,
    };

    for p in &points[1..] {
        bbox.south = bbox.south.min(p.latitude);
        bbox.north = bbox.north.max(p.latitude);
        bbox.west = bbox.west.min(p.longitude);
        bbox.east = bbox.east.max(p.longitude);
    }

    Some(bbox)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn sample_pairs() -> Vec<(GpsPoint, GpsPoint)> {
        vec![
            (GpsPoint::new(37.5665, 126.9780), GpsPoint::new(37.6588, 126.9779)),
            (GpsPoint::new(37.55, 126.98), GpsPoint::new(37.70, 127.05)),
            (GpsPoint::new(-33.8688, 151.2093), GpsPoint::new(51.5074, -0.1278)),
            (GpsPoint::new(0.0, 179.9), GpsPoint::new(0.0, -179.9)),
            (GpsPoint::new(89.9, 10.0), GpsPoint::new(-89.9, -170.0)),
        ]
    }

    #[test]
    fn test_haversine_same_point() {
        for (p, _) in sample_pairs() {
            assert_eq!(haversine_distance(&p, &p), 0.0);
        }
    }

    #[test]
    fn test_haversine_symmetric() {
        for (a, b) in sample_pairs() {
            assert_eq!(haversine_distance(&a, &b), haversine_distance(&b, &a));
        }
    }

    #[test]
    fn test_haversine_along_meridian() {
        // One degree of latitude on a 6,371 km sphere
        let d = haversine(37.0, 127.0, 38.0, 127.0);
        let expected = EARTH_RADIUS_M * 1.0_f64.to_radians();
        assert!(approx_eq(d, expected, 1e-6));
    }

    #[test]
    fn test_haversine_known_value() {
        // London to Paris is approximately 344 km
        let d = haversine(51.5074, -0.1278, 48.8566, 2.3522);
        assert!(approx_eq(d, 343_560.0, 5000.0));
    }

    #[test]
    fn test_polyline_length_short_inputs() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(37.5, 127.0)]), 0.0);
    }

    #[test]
    fn test_polyline_length_in_km() {
        let track = vec![
            GpsPoint::new(37.0, 127.0),
            GpsPoint::new(37.5, 127.0),
            GpsPoint::new(38.0, 127.0),
        ];
        let expected = EARTH_RADIUS_M * 1.0_f64.to_radians() / 1000.0;
        assert!(approx_eq(polyline_length(&track), expected, 1e-9));
    }

    #[test]
    fn test_bbox_from_center_spans() {
        let bbox = bbox_from_center(0.0, 0.0, 111.0);
        assert!(approx_eq(bbox.south, -1.0, 1e-12));
        assert!(approx_eq(bbox.north, 1.0, 1e-12));
        assert!(approx_eq(bbox.west, -1.0, 1e-12));
        assert!(approx_eq(bbox.east, 1.0, 1e-12));

        // Longitude span widens with latitude
        let seoul = bbox_from_center(37.5665, 126.9780, 5.0);
        assert!(seoul.east - seoul.west > seoul.north - seoul.south);
    }

    #[test]
    fn test_bbox_from_center_polar_floor() {
        let bbox = bbox_from_center(89.99, 0.0, 11.1);
        // cos(89.99) is tiny; the 0.2 floor caps the half-span at 0.5 degrees
        assert!(approx_eq(bbox.east, 0.5, 1e-9));
        assert!(bbox.east.is_finite() && bbox.west.is_finite());
    }

    #[test]
    fn test_bbox_monotonic_in_radius() {
        for (lat, lon) in [(37.5665, 126.978), (0.0, 0.0), (-45.0, 170.0), (85.0, 10.0)] {
            let small = bbox_from_center(lat, lon, 2.0);
            let large = bbox_from_center(lat, lon, 3.0);
            assert!(large.strictly_contains(&small));
            assert!(!small.strictly_contains(&large));
        }
    }

    #[test]
    fn test_bbox_intersects() {
        let a = BoundingBox::new(37.50, 126.90, 37.60, 127.00);
        let b = BoundingBox::new(37.55, 126.95, 37.65, 127.05);
        let c = BoundingBox::new(37.70, 127.10, 37.80, 127.20);
        assert!(bbox_intersects(&a, &b));
        assert!(bbox_intersects(&b, &a));
        assert!(!bbox_intersects(&a, &c));
        assert!(!bbox_intersects(&c, &a));

        // Shared edge
        let d = BoundingBox::new(37.60, 126.90, 37.70, 127.00);
        assert!(bbox_intersects(&a, &d));
    }

    #[test]
    fn test_compute_bounds() {
        let pts = vec![
            GpsPoint::new(37.60, 127.01),
            GpsPoint::new(37.58, 127.03),
            GpsPoint::new(37.62, 126.99),
        ];
        let bbox = compute_bounds(&pts).unwrap();
        assert_eq!(bbox, BoundingBox::new(37.58, 126.99, 37.62, 127.03));
        assert!(compute_bounds(&[]).is_none());
    }
}
