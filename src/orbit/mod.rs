//! # Orbit model
//!
//! Position and velocity of the instrument-carrying satellites at arbitrary times.
//!
//! ## Overview
//!
//! - [`OrbitProvider`]: the seam used by the scan geometry and the matchers. It answers
//!   `position_at(satellite, time)` with an Earth-fixed [`OrbitState`].
//! - [`OrbitModel`]: the standard provider, built once per session from element sets
//!   (TLEs through SGP4, or [`KeplerianElements`]) and read-only afterwards.
//! - [`ElementSource`]: the seam to an external TLE provider; [`TleTextSource`] reads
//!   element files from a local directory.
//!
//! ## Element selection
//!
//! For each request the element set whose epoch is nearest to the requested time is
//! propagated. Requests farther than `validity_days` from that epoch still return a
//! state, with a `tracing` warning. A satellite without element sets yields
//! [`RotcolError::OrbitDataUnavailable`].
//!
//! ## Frames
//!
//! Propagators work in the inertial frame of date ([`RefFrame::Eci`]); the provider
//! rotates the result into the Earth-fixed frame ([`RefFrame::Ecef`]) with the
//! Greenwich Mean Sidereal Time (polar motion neglected).
pub mod keplerian_element;
pub mod tle;

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use hifitime::Epoch;
use nalgebra::{Rotation3, Vector3};
use tracing::{debug, warn};

use crate::{
    constants::{Kilometer, SatelliteId, EARTH_ROTATION_RATE, SECONDS_PER_DAY},
    rotcol_errors::RotcolError,
    time::{format_utc, gmst_at, seconds_between, TimeRange},
};

pub use keplerian_element::KeplerianElements;
pub use tle::{parse_tle_text, Tle};

/// Default half-width, in days, of the interval around an element-set epoch within
/// which propagation is considered reliable.
pub const DEFAULT_VALIDITY_DAYS: f64 = 5.0;

/// Reference frame of an [`OrbitState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefFrame {
    /// Earth-centered, Earth-fixed.
    Ecef,
    /// Earth-centered inertial, equator and equinox of date (TEME for SGP4 states).
    Eci,
}

/// Satellite state at one epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitState {
    pub satellite: SatelliteId,
    pub epoch: Epoch,
    /// Position in km.
    pub position: Vector3<Kilometer>,
    /// Velocity in km/s, relative to the frame's own axes.
    pub velocity: Vector3<f64>,
    pub frame: RefFrame,
}

impl OrbitState {
    /// Express the state in the Earth-fixed frame.
    ///
    /// `r_ecef = Rz(−θ) r_eci` and `v_ecef = Rz(−θ) v_eci − ω⊕ × r_ecef`, θ being GMST.
    pub fn to_ecef(&self) -> OrbitState {
        match self.frame {
            RefFrame::Ecef => self.clone(),
            RefFrame::Eci => {
                let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), -gmst_at(&self.epoch));
                let position = rot * self.position;
                let velocity = rot * self.velocity - earth_rotation().cross(&position);
                OrbitState {
                    position,
                    velocity,
                    frame: RefFrame::Ecef,
                    ..self.clone()
                }
            }
        }
    }

    /// Express the state in the inertial frame of date.
    pub fn to_eci(&self) -> OrbitState {
        match self.frame {
            RefFrame::Eci => self.clone(),
            RefFrame::Ecef => {
                let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), gmst_at(&self.epoch));
                let inertial_velocity = self.velocity + earth_rotation().cross(&self.position);
                OrbitState {
                    position: rot * self.position,
                    velocity: rot * inertial_velocity,
                    frame: RefFrame::Eci,
                    ..self.clone()
                }
            }
        }
    }

    /// Distance from the Earth center in km.
    pub fn radius(&self) -> Kilometer {
        self.position.norm()
    }
}

/// Earth angular velocity vector in rad/s.
#[inline]
pub fn earth_rotation() -> Vector3<f64> {
    Vector3::new(0.0, 0.0, EARTH_ROTATION_RATE)
}

/// Anything able to tell where a satellite is.
///
/// Implementations must be deterministic: the same `(satellite, time)` request always
/// yields the same state.
pub trait OrbitProvider: Send + Sync {
    /// Earth-fixed state of `satellite` at `time`.
    fn position_at(&self, satellite: &str, time: Epoch) -> Result<OrbitState, RotcolError>;
}

/// One set of orbital elements for one satellite.
#[derive(Debug)]
pub enum ElementSet {
    Tle(Tle),
    Keplerian(KeplerianElements),
}

impl ElementSet {
    /// Epoch of validity of the element set.
    pub fn epoch(&self) -> Epoch {
        match self {
            ElementSet::Tle(tle) => tle.epoch,
            ElementSet::Keplerian(kep) => kep.reference_epoch,
        }
    }

    /// Propagate to `time`, in the inertial frame of date.
    pub fn propagate(&self, satellite: &str, time: Epoch) -> Result<OrbitState, RotcolError> {
        let (position, velocity) = match self {
            ElementSet::Tle(tle) => tle.propagate(time)?,
            ElementSet::Keplerian(kep) => kep.propagate(time)?,
        };
        Ok(OrbitState {
            satellite: satellite.to_string(),
            epoch: time,
            position,
            velocity,
            frame: RefFrame::Eci,
        })
    }
}

impl From<Tle> for ElementSet {
    fn from(tle: Tle) -> Self {
        ElementSet::Tle(tle)
    }
}

impl From<KeplerianElements> for ElementSet {
    fn from(kep: KeplerianElements) -> Self {
        ElementSet::Keplerian(kep)
    }
}

/// External provider of orbital element sets (a TLE archive or service).
pub trait ElementSource {
    /// Element sets of `satellite` relevant to `range`, in any order.
    fn elements(&self, satellite: &str, range: &TimeRange)
        -> Result<Vec<ElementSet>, RotcolError>;
}

/// Element sets per satellite, loaded once and shared read-only between threads.
#[derive(Debug)]
pub struct OrbitModel {
    elements: HashMap<SatelliteId, Vec<ElementSet>>,
    validity_days: f64,
}

impl Default for OrbitModel {
    fn default() -> Self {
        OrbitModel::new()
    }
}

impl OrbitModel {
    pub fn new() -> Self {
        OrbitModel {
            elements: HashMap::new(),
            validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    /// Change the validity half-width beyond which propagation logs a warning.
    pub fn with_validity_days(mut self, validity_days: f64) -> Self {
        self.validity_days = validity_days;
        self
    }

    /// Register an element set for `satellite`. Sets are kept sorted by epoch.
    pub fn insert(&mut self, satellite: &str, set: impl Into<ElementSet>) {
        let sets = self.elements.entry(satellite.to_string()).or_default();
        let set = set.into();
        let position = sets.partition_point(|s| s.epoch() <= set.epoch());
        sets.insert(position, set);
    }

    /// Build a model from an [`ElementSource`] for every satellite of `satellites`.
    ///
    /// Arguments
    /// -----------------
    /// * `source`: the element provider.
    /// * `satellites`: satellite identifiers to load.
    /// * `range`: time interval the session will cover.
    ///
    /// Return
    /// ----------
    /// * The loaded model. Satellites for which the source has no element sets are
    ///   simply absent; requests for them fail with [`RotcolError::OrbitDataUnavailable`].
    pub fn load<S: ElementSource + ?Sized>(
        source: &S,
        satellites: &[&str],
        range: &TimeRange,
    ) -> Result<Self, RotcolError> {
        let mut model = OrbitModel::new();
        for satellite in satellites {
            let sets = source.elements(satellite, range)?;
            debug!(satellite, count = sets.len(), "loaded element sets");
            for set in sets {
                model.insert(satellite, set);
            }
        }
        Ok(model)
    }

    /// Identifiers of the satellites with at least one element set.
    pub fn satellites(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }

    /// Element sets of `satellite`, sorted by epoch.
    pub fn element_sets(&self, satellite: &str) -> &[ElementSet] {
        self.elements
            .get(satellite)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Element set with epoch nearest to `time`.
    fn nearest(&self, satellite: &str, time: Epoch) -> Result<&ElementSet, RotcolError> {
        let sets = self.element_sets(satellite);
        let after = sets.partition_point(|s| s.epoch() <= time);
        let candidates = [after.checked_sub(1), Some(after)];
        candidates
            .into_iter()
            .flatten()
            .filter_map(|i| sets.get(i))
            .min_by(|a, b| {
                let da = seconds_between(time, a.epoch()).abs();
                let db = seconds_between(time, b.epoch()).abs();
                da.total_cmp(&db)
            })
            .ok_or_else(|| RotcolError::OrbitDataUnavailable {
                satellite: satellite.to_string(),
                time,
            })
    }
}

impl OrbitProvider for OrbitModel {
    fn position_at(&self, satellite: &str, time: Epoch) -> Result<OrbitState, RotcolError> {
        let set = self.nearest(satellite, time)?;
        let age_days = seconds_between(time, set.epoch()).abs() / SECONDS_PER_DAY;
        if age_days > self.validity_days {
            warn!(
                satellite,
                time = %format_utc(&time),
                element_epoch = %format_utc(&set.epoch()),
                age_days,
                "propagating element set beyond its validity window"
            );
        }
        Ok(set.propagate(satellite, time)?.to_ecef())
    }
}

/// Element source reading TLE files `{directory}/{satellite}.tle`.
///
/// Each file may hold any number of two-line or three-line sets of one satellite.
/// Only the sets whose epoch lies within the requested range widened by `margin_days`
/// are returned.
#[derive(Debug, Clone)]
pub struct TleTextSource {
    directory: PathBuf,
    margin_days: f64,
}

impl TleTextSource {
    pub fn new(directory: impl AsRef<Path>) -> Self {
        TleTextSource {
            directory: directory.as_ref().to_path_buf(),
            margin_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    pub fn with_margin_days(mut self, margin_days: f64) -> Self {
        self.margin_days = margin_days;
        self
    }

    /// Path of the TLE file of `satellite`.
    pub fn path_for(&self, satellite: &str) -> PathBuf {
        self.directory.join(format!("{satellite}.tle"))
    }
}

impl ElementSource for TleTextSource {
    fn elements(
        &self,
        satellite: &str,
        range: &TimeRange,
    ) -> Result<Vec<ElementSet>, RotcolError> {
        let path = self.path_for(satellite);
        if !path.exists() {
            debug!(satellite, path = %path.display(), "no TLE file");
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        let window = range.expanded(self.margin_days * SECONDS_PER_DAY);
        Ok(parse_tle_text(&text)?
            .into_iter()
            .filter(|tle| window.contains(tle.epoch))
            .map(ElementSet::Tle)
            .collect())
    }
}

#[cfg(test)]
mod orbit_test {
    use super::*;
    use crate::time::{parse_utc, shift};
    use approx::assert_relative_eq;

    fn model() -> (OrbitModel, Epoch) {
        let t0 = parse_utc("2023-06-05T00:00:00").unwrap();
        let mut model = OrbitModel::new();
        model.insert("TEST-1", KeplerianElements::circular(t0, 824.0, 98.7, 10.0, 0.0));
        model.insert(
            "TEST-1",
            KeplerianElements::circular(shift(t0, 86400.0), 824.0, 98.7, 200.0, 0.0),
        );
        (model, t0)
    }

    #[test]
    fn test_frame_round_trip() {
        let (model, t0) = model();
        let state = model.position_at("TEST-1", shift(t0, 1234.0)).unwrap();
        assert_eq!(state.frame, RefFrame::Ecef);

        let back = state.to_eci().to_ecef();
        assert_relative_eq!(back.position, state.position, epsilon = 1e-8);
        assert_relative_eq!(back.velocity, state.velocity, epsilon = 1e-11);
    }

    #[test]
    fn test_ecef_radius_preserved() {
        let (model, t0) = model();
        let sets = model.element_sets("TEST-1");
        let inertial = sets[0].propagate("TEST-1", shift(t0, 100.0)).unwrap();
        let fixed = inertial.to_ecef();
        assert_relative_eq!(fixed.radius(), inertial.radius(), epsilon = 1e-9);
        // Earth-fixed velocity differs by ω⊕ × r
        assert!((fixed.velocity.norm() - inertial.velocity.norm()).abs() > 1e-3);
    }

    #[test]
    fn test_nearest_element_set_selected() {
        let (model, t0) = model();
        let early = shift(t0, 3600.0);
        let late = shift(t0, 80000.0);
        assert_eq!(model.nearest("TEST-1", early).unwrap().epoch(), t0);
        assert_eq!(
            model.nearest("TEST-1", late).unwrap().epoch(),
            shift(t0, 86400.0)
        );
    }

    #[test]
    fn test_deterministic() {
        let (model, t0) = model();
        let t = shift(t0, 4321.5);
        assert_eq!(
            model.position_at("TEST-1", t).unwrap(),
            model.position_at("TEST-1", t).unwrap()
        );
    }

    #[test]
    fn test_unknown_satellite() {
        let (model, t0) = model();
        assert_eq!(
            model.position_at("NOPE", t0),
            Err(RotcolError::OrbitDataUnavailable {
                satellite: "NOPE".to_string(),
                time: t0,
            })
        );
    }
}
