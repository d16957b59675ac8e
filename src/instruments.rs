//! # Nadir-scanning instruments
//!
//! The closed set of cross-track microwave sounders the crate knows how to collocate,
//! with their nominal scan parameters and the satellites that carry them.
//!
//! | Instrument | Footprints | Spacing   | Scan period | Max scan angle |
//! |------------|-----------:|----------:|------------:|---------------:|
//! | ATMS       | 96         | 1.11°     | 8/3 s       | 52.725°        |
//! | AMSU-A     | 30         | 3.333°    | 8 s         | 48.33°         |
//! | MHS        | 90         | 10/9°     | 8/3 s       | 49.445°        |
use std::fmt;
use std::str::FromStr;

use hifitime::Epoch;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{Degree, Second},
    rotcol_errors::RotcolError,
};

/// Cross-track scanning sounder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Instrument {
    #[serde(rename = "AMSU-A")]
    AmsuA,
    #[serde(rename = "ATMS")]
    Atms,
    #[serde(rename = "MHS")]
    Mhs,
}

/// Geometry of one scan line of a cross-track scanner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    /// Time between the starts of two consecutive scan lines, in seconds.
    pub scan_period: Second,
    pub footprints_per_scan: usize,
    /// Off-nadir angular step between adjacent footprints, in degrees.
    pub footprint_spacing: Degree,
    /// Largest off-nadir angle the instrument observes, in degrees.
    pub max_scan_angle: Degree,
}

impl ScanParameters {
    /// Off-nadir angle of footprint `index`, in degrees (negative to the right of track).
    #[inline]
    pub fn scan_angle(&self, index: usize) -> Degree {
        (index as f64 - (self.footprints_per_scan as f64 - 1.0) / 2.0) * self.footprint_spacing
    }

    /// Fractional footprint index of a scan angle; inverse of [`ScanParameters::scan_angle`].
    #[inline]
    pub fn footprint_position(&self, scan_angle: Degree) -> f64 {
        scan_angle / self.footprint_spacing + (self.footprints_per_scan as f64 - 1.0) / 2.0
    }

    /// Largest absolute scan angle of the footprints actually generated.
    pub fn outermost_angle(&self) -> Degree {
        self.scan_angle(0).abs().min(self.max_scan_angle)
    }

    pub fn validate(&self) -> Result<(), RotcolError> {
        if !(self.scan_period > 0.0) {
            return Err(RotcolError::InvalidConfiguration(format!(
                "scan period must be positive, got {}",
                self.scan_period
            )));
        }
        if self.footprints_per_scan == 0 {
            return Err(RotcolError::InvalidConfiguration(
                "an instrument needs at least one footprint per scan".into(),
            ));
        }
        if !(self.footprint_spacing > 0.0) || !(self.max_scan_angle >= 0.0) {
            return Err(RotcolError::InvalidConfiguration(format!(
                "footprint spacing ({}) must be positive and maximum scan angle ({}) non-negative",
                self.footprint_spacing, self.max_scan_angle
            )));
        }
        if self.max_scan_angle >= 90.0 {
            return Err(RotcolError::InvalidConfiguration(format!(
                "maximum scan angle {}° is not below the horizon",
                self.max_scan_angle
            )));
        }
        Ok(())
    }
}

impl Instrument {
    pub const ALL: [Instrument; 3] = [Instrument::AmsuA, Instrument::Atms, Instrument::Mhs];

    pub fn name(&self) -> &'static str {
        match self {
            Instrument::AmsuA => "AMSU-A",
            Instrument::Atms => "ATMS",
            Instrument::Mhs => "MHS",
        }
    }

    /// Nominal scan parameters.
    pub fn scan_parameters(&self) -> ScanParameters {
        match self {
            Instrument::Atms => ScanParameters {
                scan_period: 8.0 / 3.0,
                footprints_per_scan: 96,
                footprint_spacing: 1.11,
                max_scan_angle: 52.725,
            },
            Instrument::AmsuA => ScanParameters {
                scan_period: 8.0,
                footprints_per_scan: 30,
                footprint_spacing: 3.333,
                max_scan_angle: 48.33,
            },
            Instrument::Mhs => ScanParameters {
                scan_period: 8.0 / 3.0,
                footprints_per_scan: 90,
                footprint_spacing: 10.0 / 9.0,
                max_scan_angle: 49.445,
            },
        }
    }

    /// Satellites that carry the instrument.
    pub fn valid_satellites(&self) -> &'static [&'static str] {
        match self {
            Instrument::Atms => &["Suomi-NPP", "JPSS-1", "JPSS-2"],
            Instrument::AmsuA => &["Metop-A", "Metop-B", "Metop-C", "NOAA-18", "NOAA-19", "Aqua"],
            Instrument::Mhs => &["Metop-A", "Metop-B", "Metop-C", "NOAA-18", "NOAA-19"],
        }
    }

    pub fn is_carried_by(&self, satellite: &str) -> bool {
        self.valid_satellites().contains(&satellite)
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Instrument {
    type Err = RotcolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase().replace(['_', ' '], "-");
        match key.as_str() {
            "AMSU-A" | "AMSUA" => Ok(Instrument::AmsuA),
            "ATMS" => Ok(Instrument::Atms),
            "MHS" => Ok(Instrument::Mhs),
            _ => Err(RotcolError::InvalidConfiguration(format!(
                "unknown instrument {s:?}"
            ))),
        }
    }
}

/// NORAD catalog number of a known host satellite.
pub fn norad_id(satellite: &str) -> Option<u64> {
    match satellite {
        "Suomi-NPP" => Some(37849),
        "JPSS-1" => Some(43013),
        "JPSS-2" => Some(54234),
        "Metop-A" => Some(29499),
        "Metop-B" => Some(38771),
        "Metop-C" => Some(43689),
        "NOAA-18" => Some(28654),
        "NOAA-19" => Some(33591),
        "Aqua" => Some(27424),
        _ => None,
    }
}

/// One instrument on one satellite, with the scan grid anchor.
///
/// Scan line `k` starts at `scan_epoch + k · scan_period`; `margin_scans` extra scan
/// periods are added on both sides of every requested interval.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentConfig {
    pub instrument: Instrument,
    pub satellite: String,
    pub scan: ScanParameters,
    pub scan_epoch: Epoch,
    pub margin_scans: u32,
}

impl InstrumentConfig {
    /// Nominal configuration of `instrument` on `satellite`.
    ///
    /// Return
    /// ----------
    /// * The configuration, or [`RotcolError::InvalidConfiguration`] if the satellite
    ///   does not carry the instrument.
    pub fn new(
        instrument: Instrument,
        satellite: &str,
        scan_epoch: Epoch,
    ) -> Result<Self, RotcolError> {
        let config = InstrumentConfig {
            instrument,
            satellite: satellite.to_string(),
            scan: instrument.scan_parameters(),
            scan_epoch,
            margin_scans: 1,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_margin_scans(mut self, margin_scans: u32) -> Self {
        self.margin_scans = margin_scans;
        self
    }

    /// Override the nominal scan parameters (simulations, tests).
    pub fn with_scan_parameters(mut self, scan: ScanParameters) -> Result<Self, RotcolError> {
        scan.validate()?;
        self.scan = scan;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), RotcolError> {
        if !self.instrument.is_carried_by(&self.satellite) {
            return Err(RotcolError::InvalidConfiguration(format!(
                "{} is not carried by {} (valid: {})",
                self.instrument,
                self.satellite,
                self.instrument.valid_satellites().join(", ")
            )));
        }
        self.scan.validate()
    }
}
