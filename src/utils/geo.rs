// src/utils/geo.rs
use crate::models::ride::GeoPoint;

/// Radius within which a candidate ride's pickup is considered reachable.
pub const MAX_PICKUP_RADIUS_KM: f64 = 10.0;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Coordinate precision kept when forwarding location updates.
/// Five decimal places is roughly 1.1 m at the equator.
const COORD_SCALE: f64 = 1e5;

/// Great-circle distance between two points (haversine formula).
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

/// Whether a pickup point can be used for distance filtering.
///
/// (0, 0) is the null-island sentinel some backends emit for missing
/// geocoding, so it is rejected along with out-of-range values.
pub fn is_plausible(point: &GeoPoint) -> bool {
    if point.latitude == 0.0 && point.longitude == 0.0 {
        return false;
    }
    (-90.0..=90.0).contains(&point.latitude) && (-180.0..=180.0).contains(&point.longitude)
}

/// Whether `pickup` lies within the candidate radius of `driver`.
/// The boundary at exactly `MAX_PICKUP_RADIUS_KM` is inclusive.
pub fn within_pickup_radius(driver: &GeoPoint, pickup: &GeoPoint) -> bool {
    haversine_km(driver, pickup) <= MAX_PICKUP_RADIUS_KM
}

/// Round coordinates to five decimal places before they are forwarded to
/// consumers, so jittery GPS noise below ~1.1 m does not churn the UI.
pub fn normalize_precision(point: &GeoPoint) -> GeoPoint {
    GeoPoint {
        latitude: (point.latitude * COORD_SCALE).round() / COORD_SCALE,
        longitude: (point.longitude * COORD_SCALE).round() / COORD_SCALE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint {
            latitude,
            longitude,
        }
    }

    #[test]
    fn test_haversine_zero_distance() {
        let p = point(5.6037, -0.1870);
        assert!(haversine_km(&p, &p) < 1e-9);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Accra to Kumasi is roughly 200 km as the crow flies.
        let accra = point(5.6037, -0.1870);
        let kumasi = point(6.6885, -1.6244);
        let d = haversine_km(&accra, &kumasi);
        assert!((d - 200.0).abs() < 10.0, "got {d}");
    }

    #[test]
    fn test_radius_boundary_is_inclusive() {
        let driver = point(0.0, 10.0);
        // One degree of longitude on the equator is ~111.19 km, so
        // 10 km is ~0.0899321 degrees. Move in until we are at or
        // just inside the boundary.
        let mut delta = 10.0 / (EARTH_RADIUS_KM * std::f64::consts::PI / 180.0);
        while haversine_km(&driver, &point(0.0, 10.0 + delta)) > MAX_PICKUP_RADIUS_KM {
            delta *= 0.999_999_9;
        }
        let boundary = point(0.0, 10.0 + delta);
        assert!(haversine_km(&driver, &boundary) <= MAX_PICKUP_RADIUS_KM);
        assert!(within_pickup_radius(&driver, &boundary));
    }

    #[test]
    fn test_radius_rejects_outside() {
        let driver = point(0.0, 10.0);
        // ~0.2 degrees of longitude at the equator is ~22 km.
        assert!(!within_pickup_radius(&driver, &point(0.0, 10.2)));
    }

    #[test]
    fn test_null_island_is_not_plausible() {
        assert!(!is_plausible(&point(0.0, 0.0)));
    }

    #[test]
    fn test_out_of_range_is_not_plausible() {
        assert!(!is_plausible(&point(91.0, 0.1)));
        assert!(!is_plausible(&point(-91.0, 0.1)));
        assert!(!is_plausible(&point(0.1, 181.0)));
        assert!(!is_plausible(&point(0.1, -181.0)));
    }

    #[test]
    fn test_valid_coordinates_are_plausible() {
        assert!(is_plausible(&point(5.6037, -0.1870)));
        assert!(is_plausible(&point(-33.86, 151.21)));
        // A zero latitude alone is fine, only the (0, 0) pair is a sentinel.
        assert!(is_plausible(&point(0.0, 10.0)));
    }

    #[test]
    fn test_normalize_precision_rounds_to_five_decimals() {
        let noisy = point(5.603_712_345_6, -0.187_098_765_4);
        let normalized = normalize_precision(&noisy);
        assert_eq!(normalized.latitude, 5.60371);
        assert_eq!(normalized.longitude, -0.18710);
    }

    #[test]
    fn test_normalize_precision_is_idempotent() {
        let p = normalize_precision(&point(40.700_004, -74.000_009));
        assert_eq!(normalize_precision(&p), p);
    }
}
