//! # Spherical-Earth geodesy
//!
//! Every collocation decision of the crate goes through this module: occultation
//! locations and footprint centers are turned into unit vectors of the Earth-fixed
//! frame, and the separation between two points is the central angle between their
//! unit vectors scaled by [`EARTH_MEAN_RADIUS`].
//!
//! The central angle is computed as `atan2(|a × b|, a · b)`, which stays accurate for
//! both tiny and near-antipodal separations (the `acos` of a dot product loses about
//! half of the significant digits below one kilometer).
use nalgebra::Vector3;

use crate::constants::{Degree, Meter, Radian, EARTH_MEAN_RADIUS, RADEG};

/// Unit vector of the Earth-fixed frame pointing at a geocentric latitude/longitude.
///
/// Arguments
/// -----------------
/// * `latitude`: latitude in degrees, north positive.
/// * `longitude`: longitude in degrees, east positive.
///
/// Return
/// ----------
/// * The unit vector `(cosφ cosλ, cosφ sinλ, sinφ)`.
#[inline]
pub fn unit_vector(latitude: Degree, longitude: Degree) -> Vector3<f64> {
    let (slat, clat) = (latitude * RADEG).sin_cos();
    let (slon, clon) = (longitude * RADEG).sin_cos();
    Vector3::new(clat * clon, clat * slon, slat)
}

/// Latitude/longitude (degrees) of the direction of `v`; longitude in (-180°, 180°].
pub fn lat_lon(v: &Vector3<f64>) -> (Degree, Degree) {
    let horizontal = (v.x * v.x + v.y * v.y).sqrt();
    let latitude = v.z.atan2(horizontal) / RADEG;
    let mut longitude = v.y.atan2(v.x) / RADEG;
    if longitude <= -180.0 {
        longitude += 360.0;
    }
    (latitude, longitude)
}

/// Angle in radians between two (not necessarily unit) vectors.
#[inline]
pub fn central_angle(a: &Vector3<f64>, b: &Vector3<f64>) -> Radian {
    a.cross(b).norm().atan2(a.dot(b))
}

/// Convert a surface distance (meters) into an Earth central angle (radians).
#[inline]
pub fn distance_to_angle(distance: Meter) -> Radian {
    distance / EARTH_MEAN_RADIUS
}

/// Convert an Earth central angle (radians) into a surface distance (meters).
#[inline]
pub fn angle_to_distance(angle: Radian) -> Meter {
    angle * EARTH_MEAN_RADIUS
}

#[cfg(test)]
mod geodesy_test {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_unit_vector_round_trip() {
        for &(lat, lon) in &[(0.0, 0.0), (45.0, 120.0), (-60.5, -170.25), (89.0, 10.0)] {
            let v = unit_vector(lat, lon);
            assert_relative_eq!(v.norm(), 1.0, epsilon = 1e-15);
            let (lat2, lon2) = lat_lon(&v);
            assert_relative_eq!(lat2, lat, epsilon = 1e-10);
            assert_relative_eq!(lon2, lon, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_central_angle_distances() {
        let distance = |lat1: f64, lon1: f64, lat2: f64, lon2: f64| {
            angle_to_distance(central_angle(&unit_vector(lat1, lon1), &unit_vector(lat2, lon2)))
        };
        // one degree of arc along the equator
        assert_relative_eq!(
            distance(0.0, 0.0, 0.0, 1.0),
            EARTH_MEAN_RADIUS * RADEG,
            epsilon = 1e-6
        );

        // across the date line
        assert_relative_eq!(
            distance(10.0, 179.5, 10.0, -179.5),
            distance(10.0, -0.5, 10.0, 0.5),
            epsilon = 1e-6
        );

        assert_eq!(distance(12.0, 34.0, 12.0, 34.0), 0.0);
        assert_relative_eq!(
            distance_to_angle(distance(0.0, 0.0, 0.0, 90.0)),
            PI / 2.0,
            epsilon = 1e-15
        );
    }
}
