//! # Keplerian orbital elements
//!
//! Classical element set `(a, e, i, Ω, ω, M)` of an Earth satellite, propagated as a
//! two-body orbit perturbed by the **secular J2 drift** of the ascending node, the
//! argument of perigee and the mean anomaly.
//!
//! This is the propagator of choice when no TLE is at hand: synthetic constellations,
//! test scenarios and benchmarks all build their orbits from a [`KeplerianElements`].
//!
//! ## Units
//!
//! - Lengths: **km**
//! - Angles: **radians**
//! - Epoch: [`hifitime::Epoch`] (UTC)
//!
//! ## Frame
//!
//! The propagated state is expressed in the Earth-centered inertial frame of date
//! (equator and equinox of date), the same frame SGP4 produces.
use std::fmt;

use hifitime::Epoch;
use nalgebra::{Rotation3, Vector3};

use crate::{
    constants::{Kilometer, Radian, EARTH_EQUATORIAL_RADIUS_KM, EARTH_J2, EARTH_MU, RADEG},
    kepler::{principal_angle, solve_kepler_equation},
    rotcol_errors::RotcolError,
    time::{format_utc, seconds_between},
};

/// Keplerian orbital elements (mean elements, Earth-centered).
///
/// Units
/// -----
/// * `reference_epoch`: epoch of validity.
/// * `semi_major_axis`: km.
/// * `eccentricity`: unitless.
/// * `inclination`: radians.
/// * `ascending_node_longitude`: radians (Ω).
/// * `periapsis_argument`: radians (ω).
/// * `mean_anomaly`: radians (M).
#[derive(Debug, PartialEq, Clone)]
pub struct KeplerianElements {
    pub reference_epoch: Epoch,
    pub semi_major_axis: Kilometer,
    pub eccentricity: f64,
    pub inclination: Radian,
    pub ascending_node_longitude: Radian,
    pub periapsis_argument: Radian,
    pub mean_anomaly: Radian,
}

impl KeplerianElements {
    /// Circular orbit at a given altitude above the equatorial radius.
    ///
    /// Arguments
    /// -----------------
    /// * `reference_epoch`: epoch of validity.
    /// * `altitude`: altitude in km above [`EARTH_EQUATORIAL_RADIUS_KM`].
    /// * `inclination`: inclination in degrees.
    /// * `ascending_node_longitude`: right ascension of the ascending node in degrees.
    /// * `argument_of_latitude`: position along the orbit at epoch, in degrees from the node.
    pub fn circular(
        reference_epoch: Epoch,
        altitude: Kilometer,
        inclination: f64,
        ascending_node_longitude: f64,
        argument_of_latitude: f64,
    ) -> Self {
        KeplerianElements {
            reference_epoch,
            semi_major_axis: EARTH_EQUATORIAL_RADIUS_KM + altitude,
            eccentricity: 0.0,
            inclination: inclination * RADEG,
            ascending_node_longitude: principal_angle(ascending_node_longitude * RADEG),
            periapsis_argument: 0.0,
            mean_anomaly: principal_angle(argument_of_latitude * RADEG),
        }
    }

    /// Unperturbed mean motion in rad/s.
    pub fn mean_motion(&self) -> f64 {
        (EARTH_MU / self.semi_major_axis.powi(3)).sqrt()
    }

    /// Secular J2 rates `(Ω̇, ω̇, Ṁ)` in rad/s.
    ///
    /// Return
    /// ----------
    /// * Node regression, apsidal rotation and perturbed mean motion, from the
    ///   first-order averaged J2 equations.
    pub fn secular_rates(&self) -> (f64, f64, f64) {
        let n = self.mean_motion();
        let e2 = self.eccentricity * self.eccentricity;
        let p = self.semi_major_axis * (1.0 - e2);
        let k = 1.5 * EARTH_J2 * (EARTH_EQUATORIAL_RADIUS_KM / p).powi(2);
        let cos_i = self.inclination.cos();

        let node_rate = -k * n * cos_i;
        let periapsis_rate = 0.5 * k * n * (5.0 * cos_i * cos_i - 1.0);
        let mean_anomaly_rate =
            n * (1.0 + 0.5 * k * (1.0 - e2).sqrt() * (3.0 * cos_i * cos_i - 1.0));

        (node_rate, periapsis_rate, mean_anomaly_rate)
    }

    /// Propagate the elements to `time`.
    ///
    /// Arguments
    /// -----------------
    /// * `time`: target epoch (before or after the reference epoch).
    ///
    /// Return
    /// ----------
    /// * `(position km, velocity km/s)` in the inertial frame of date, or
    ///   [`RotcolError::KeplerSolverFailed`] when Kepler's equation does not converge.
    pub fn propagate(
        &self,
        time: Epoch,
    ) -> Result<(Vector3<Kilometer>, Vector3<f64>), RotcolError> {
        let dt = seconds_between(time, self.reference_epoch);
        let (node_rate, periapsis_rate, mean_anomaly_rate) = self.secular_rates();

        let node = self.ascending_node_longitude + node_rate * dt;
        let periapsis = self.periapsis_argument + periapsis_rate * dt;
        let mean_anomaly = self.mean_anomaly + mean_anomaly_rate * dt;

        let a = self.semi_major_axis;
        let e = self.eccentricity;
        let ecc_anomaly = solve_kepler_equation(mean_anomaly, e)?;
        let (sin_e, cos_e) = ecc_anomaly.sin_cos();
        let beta = (1.0 - e * e).sqrt();

        let radius = a * (1.0 - e * cos_e);
        let perifocal_position = Vector3::new(a * (cos_e - e), a * beta * sin_e, 0.0);
        let speed_factor = (EARTH_MU * a).sqrt() / radius;
        let perifocal_velocity =
            Vector3::new(-speed_factor * sin_e, speed_factor * beta * cos_e, 0.0);

        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), node)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), self.inclination)
            * Rotation3::from_axis_angle(&Vector3::z_axis(), periapsis);

        Ok((rotation * perifocal_position, rotation * perifocal_velocity))
    }
}

impl fmt::Display for KeplerianElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rad_to_deg = 1.0 / RADEG;
        writeln!(
            f,
            "Keplerian Elements @ epoch: {}",
            format_utc(&self.reference_epoch)
        )?;
        writeln!(f, "-------------------------------------------")?;
        writeln!(
            f,
            "  a   (semi-major axis)       = {:.3} km",
            self.semi_major_axis
        )?;
        writeln!(
            f,
            "  e   (eccentricity)          = {:.6}",
            self.eccentricity
        )?;
        writeln!(
            f,
            "  i   (inclination)           = {:.6}°",
            self.inclination * rad_to_deg
        )?;
        writeln!(
            f,
            "  Ω   (longitude of node)     = {:.6}°",
            self.ascending_node_longitude * rad_to_deg
        )?;
        writeln!(
            f,
            "  ω   (argument of periapsis) = {:.6}°",
            self.periapsis_argument * rad_to_deg
        )?;
        writeln!(
            f,
            "  M   (mean anomaly)          = {:.6}°",
            self.mean_anomaly * rad_to_deg
        )
    }
}
