//! Geographic primitives: coordinates and great-circle distance
//!
//! Distances use the haversine formula with a spherical Earth model.
//! Good to well under 0.5% error at city scale, which is all the
//! candidate search needs.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Great-circle distance to another coordinate in kilometers.
    pub fn haversine_km(&self, other: &Coordinate) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());
        let dlat = lat2 - lat1;
        let dlon = lon2 - lon1;
        let sin_dlat = (dlat * 0.5).sin();
        let sin_dlon = (dlon * 0.5).sin();
        let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
        let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// Distance in meters, rounded to the nearest meter.
    pub fn haversine_m(&self, other: &Coordinate) -> u32 {
        (self.haversine_km(other) * 1000.0).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance_to_self() {
        let p = Coordinate::new(14.5995, 120.9842);
        assert_eq!(p.haversine_km(&p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Coordinate::new(14.50, 121.00);
        let b = Coordinate::new(14.60, 121.10);
        let ab = a.haversine_km(&b);
        let ba = b.haversine_km(&a);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_known_short_hop() {
        // Pickup scenario from the dispatch acceptance checks: ~0.7 km apart.
        let pickup = Coordinate::new(14.50, 121.00);
        let driver = Coordinate::new(14.505, 121.005);
        let d = pickup.haversine_km(&driver);
        assert!(d > 0.6 && d < 0.9, "expected ~0.7 km, got {d}");
    }

    #[test]
    fn test_known_city_distance() {
        // Manila to Quezon City center, roughly 10-12 km.
        let manila = Coordinate::new(14.5995, 120.9842);
        let qc = Coordinate::new(14.6760, 121.0437);
        let d = manila.haversine_km(&qc);
        assert!(d > 9.0 && d < 13.0, "expected ~10 km, got {d}");
    }

    #[test]
    fn test_meters_rounding() {
        let a = Coordinate::new(14.50, 121.00);
        let b = Coordinate::new(14.505, 121.005);
        let m = a.haversine_m(&b);
        let km = a.haversine_km(&b);
        assert_eq!(m, (km * 1000.0).round() as u32);
    }
}
