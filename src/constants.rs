//! # Constants and type definitions for rotcol
//!
//! This module centralizes the **geophysical constants**, **conversion factors**, and
//! **common type aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Earth shape and gravity constants (WGS84 / EGM96 values)
//! - Unit conversions (degrees ↔ radians, minutes ↔ seconds)
//! - Type aliases documenting the unit carried by a plain `f64`
//!
//! All distances on the ground are measured on a **spherical Earth** of radius
//! [`EARTH_MEAN_RADIUS`]; orbit propagation works in kilometers and seconds.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Number of seconds in a minute
pub const SECONDS_PER_MINUTE: f64 = 60.0;

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Earth equatorial radius in meters (WGS84)
pub const EARTH_MAJOR_AXIS: f64 = 6_378_137.0;

/// IUGG mean Earth radius in meters, used for every surface distance and footprint projection
pub const EARTH_MEAN_RADIUS: f64 = 6_371_008.8;

/// Earth standard gravitational parameter in km³/s²
pub const EARTH_MU: f64 = 398_600.4418;

/// Earth equatorial radius in kilometers, reference radius of the J2 term
pub const EARTH_EQUATORIAL_RADIUS_KM: f64 = EARTH_MAJOR_AXIS / 1000.0;

/// Second zonal harmonic of the geopotential
pub const EARTH_J2: f64 = 1.082_626_68e-3;

/// Earth rotation rate in rad/s (sidereal)
pub const EARTH_ROTATION_RATE: f64 = 7.292_115_146_706_979e-5;

/// Tolerance above which rotation-collocation must split occultations, in seconds
pub const SUB_OCCULTATION_SPAN: f64 = 1800.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in kilometers
pub type Kilometer = f64;
/// Distance in meters
pub type Meter = f64;
/// Duration in seconds
pub type Second = f64;
/// Modified Julian Date (days)
pub type MJD = f64;

/// Identifier of a satellite as used by the element provider (e.g. `"JPSS-1"`)
pub type SatelliteId = String;

/// Identifier of a radio occultation sounding, as issued by the metadata service
pub type OccId = String;
