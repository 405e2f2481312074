use crate::model::zone::Coordinates;

/// Mean Earth radius used for geofence checks.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance in meters (haversine formula).
pub fn haversine_distance(a: Coordinates, b: Coordinates) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lng - a.lng).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Inclusive containment: a point exactly on the boundary is inside.
#[inline]
pub fn within_radius(distance_meters: f64, radius_meters: f64) -> bool {
    distance_meters <= radius_meters
}
