//! Geographic coordinates and the east-up-south alignment handed to rooftop
//! anchor requests.

use nalgebra::UnitQuaternion;
use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters (WGS84 sphere approximation).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// WGS84 latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// True when both components are finite and inside their WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance in meters (haversine).
    pub fn distance_to(&self, other: &GeoCoordinate) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().asin()
    }

    /// Local east/north offset in meters of `self` from `origin`
    /// (equirectangular, good to a few centimeters over a campus).
    pub fn east_north_from(&self, origin: &GeoCoordinate) -> (f64, f64) {
        let mean_lat = ((self.latitude + origin.latitude) / 2.0).to_radians();
        let east = (self.longitude - origin.longitude).to_radians() * mean_lat.cos() * EARTH_RADIUS_M;
        let north = (self.latitude - origin.latitude).to_radians() * EARTH_RADIUS_M;
        (east, north)
    }

    /// Inverse of [`GeoCoordinate::east_north_from`].
    pub fn offset_by(&self, east: f64, north: f64) -> GeoCoordinate {
        let latitude = self.latitude + (north / EARTH_RADIUS_M).to_degrees();
        let mean_lat = ((self.latitude + latitude) / 2.0).to_radians();
        let longitude = self.longitude + (east / (EARTH_RADIUS_M * mean_lat.cos())).to_degrees();
        GeoCoordinate::new(latitude, longitude)
    }
}

impl std::fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Orientation of the current camera frame expressed in the east-up-south
/// (EUS) geospatial frame.
///
/// Captured from the tracking frame that triggered resolution. Anchors built
/// from an alignment taken on an earlier frame come out rotated; callers must
/// not cache it across ticks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseAlignment(pub UnitQuaternion<f64>);

impl PoseAlignment {
    pub fn identity() -> Self {
        Self(UnitQuaternion::identity())
    }

    pub fn quaternion(&self) -> &UnitQuaternion<f64> {
        &self.0
    }
}
