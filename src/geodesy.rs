//! # Spherical geodesy and local projection
//!
//! Two tools are provided:
//!
//! - [`delazi`]: great-circle distance (degrees), azimuth and back-azimuth between two
//!   geographic points on the reference sphere.
//! - [`LocalProjection`]: an **azimuthal equidistant** projection centred on the network
//!   center. Hypocenters and stations are handled as local Cartesian vectors
//!   `(x = east km, y = north km, z = depth km)` so that the octree search works in a box.
//!
//! ## Conventions
//!
//! - Latitudes/longitudes in **degrees**, east and north positive.
//! - Distances from the projection center are exact (equidistant property); distances
//!   between two arbitrary projected points are approximate, with an error that stays
//!   well below the location accuracy within a few hundred kilometres of the center.
//! - Station elevations are converted to negative depths (`z = -elevation_km`).
//!
//! ## See also
//! ------------
//! * [`crate::constants::EARTH_RADIUS_KM`] – radius of the reference sphere.
//! * [`crate::octree::SearchVolume`] – bounding volume expressed in the projected frame.
use nalgebra::Vector3;

use crate::constants::{Degree, Kilometer, EARTH_RADIUS_KM, KM_PER_DEG, RADEG};

/// Great-circle distance and azimuths between two points.
///
/// Arguments
/// -----------------
/// * `lat1`, `lon1`: first point (degrees).
/// * `lat2`, `lon2`: second point (degrees).
///
/// Return
/// ----------
/// * `(delta, azimuth, back_azimuth)` in degrees. `delta` is the angular distance;
///   `azimuth` is measured at point 1 towards point 2, `back_azimuth` at point 2 towards
///   point 1, both in `[0, 360)`.
pub fn delazi(lat1: Degree, lon1: Degree, lat2: Degree, lon2: Degree) -> (Degree, Degree, Degree) {
    let (phi1, phi2) = (lat1 * RADEG, lat2 * RADEG);
    let dlon = (lon2 - lon1) * RADEG;

    // Haversine form is well conditioned for small distances
    let a = ((phi2 - phi1) / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (dlon / 2.0).sin().powi(2);
    let delta = 2.0 * a.sqrt().min(1.0).asin();

    let azimuth = forward_azimuth(phi1, phi2, dlon);
    let back_azimuth = forward_azimuth(phi2, phi1, -dlon);

    (delta / RADEG, azimuth, back_azimuth)
}

fn forward_azimuth(phi1: f64, phi2: f64, dlon: f64) -> Degree {
    let y = dlon.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlon.cos();
    (y.atan2(x) / RADEG).rem_euclid(360.0)
}

/// Great-circle distance in kilometres.
#[inline]
pub fn distance_km(lat1: Degree, lon1: Degree, lat2: Degree, lon2: Degree) -> Kilometer {
    delazi(lat1, lon1, lat2, lon2).0 * KM_PER_DEG
}

/// Azimuthal equidistant projection centred on a geographic point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalProjection {
    center_lat: Degree,
    center_lon: Degree,
}

impl LocalProjection {
    pub fn new(center_lat: Degree, center_lon: Degree) -> Self {
        LocalProjection {
            center_lat,
            center_lon,
        }
    }

    pub fn center(&self) -> (Degree, Degree) {
        (self.center_lat, self.center_lon)
    }

    /// Project a geographic point to local `(x, y)` kilometres.
    ///
    /// The distance from the center is the exact great-circle distance and the direction
    /// follows the azimuth seen from the center.
    pub fn forward(&self, lat: Degree, lon: Degree) -> (Kilometer, Kilometer) {
        let (delta, azimuth, _) = delazi(self.center_lat, self.center_lon, lat, lon);
        let r = delta * KM_PER_DEG;
        let az = azimuth * RADEG;
        (r * az.sin(), r * az.cos())
    }

    /// Inverse projection of local `(x, y)` kilometres to `(lat, lon)` degrees.
    ///
    /// Longitudes are normalised to `(-180, 180]`.
    pub fn inverse(&self, x: Kilometer, y: Kilometer) -> (Degree, Degree) {
        let c = (x * x + y * y).sqrt() / EARTH_RADIUS_KM;
        if c == 0.0 {
            return (self.center_lat, self.center_lon);
        }
        let az = x.atan2(y);
        let phi0 = self.center_lat * RADEG;

        let phi = (phi0.sin() * c.cos() + phi0.cos() * c.sin() * az.cos()).asin();
        let lambda = self.center_lon * RADEG
            + (az.sin() * c.sin() * phi0.cos()).atan2(c.cos() - phi0.sin() * phi.sin());

        let mut lon = lambda / RADEG;
        if lon > 180.0 {
            lon -= 360.0;
        } else if lon <= -180.0 {
            lon += 360.0;
        }
        (phi / RADEG, lon)
    }

    /// Local Cartesian position of a station.
    ///
    /// Arguments
    /// -----------------
    /// * `lat`, `lon`: station coordinates (degrees).
    /// * `elevation_km`: station elevation above sea level (km); stored as negative depth.
    pub fn station_position(&self, lat: Degree, lon: Degree, elevation_km: Kilometer) -> Vector3<f64> {
        let (x, y) = self.forward(lat, lon);
        Vector3::new(x, y, -elevation_km)
    }
}

#[cfg(test)]
mod geodesy_test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_delazi_cardinal_directions() {
        let (delta, az, baz) = delazi(0.0, 0.0, 1.0, 0.0);
        assert_relative_eq!(delta, 1.0, epsilon = 1e-12);
        assert_relative_eq!(az, 0.0, epsilon = 1e-9);
        assert_relative_eq!(baz, 180.0, epsilon = 1e-9);

        let (delta, az, baz) = delazi(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(delta, 1.0, epsilon = 1e-12);
        assert_relative_eq!(az, 90.0, epsilon = 1e-9);
        assert_relative_eq!(baz, 270.0, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_km_one_degree() {
        assert_relative_eq!(distance_km(10.0, 20.0, 11.0, 20.0), KM_PER_DEG, epsilon = 1e-9);
    }

    #[test]
    fn test_projection_round_trip() {
        let proj = LocalProjection::new(-22.5, -68.9);
        for &(lat, lon) in &[(-22.5, -68.9), (-21.0, -69.5), (-24.2, -67.1), (-22.6, -68.8)] {
            let (x, y) = proj.forward(lat, lon);
            let (lat2, lon2) = proj.inverse(x, y);
            assert_relative_eq!(lat, lat2, epsilon = 1e-9);
            assert_relative_eq!(lon, lon2, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_projection_is_equidistant_from_center() {
        let proj = LocalProjection::new(45.0, 7.0);
        let (x, y) = proj.forward(46.0, 8.0);
        assert_relative_eq!(
            (x * x + y * y).sqrt(),
            distance_km(45.0, 7.0, 46.0, 8.0),
            epsilon = 1e-9
        );
        assert!(x > 0.0 && y > 0.0);
    }
}
