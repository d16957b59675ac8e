//! # Scan geometry
//!
//! Time-dependent footprint model of a cross-track scanner.
//!
//! ## Scan grid
//!
//! Scan line `k` (any integer, negative before the anchor) starts at
//! `scan_epoch + k · scan_period`. For each line the satellite is propagated once, and the
//! **orbital frame** of the line is built from its Earth-fixed state:
//!
//! ```text
//! up    = r / |r|
//! along = unit(v − (v·up) up)
//! cross = up × along          (left of the ground track)
//! ```
//!
//! ## Footprints
//!
//! Footprint `i` of a line looks at the off-nadir angle
//! `η_i = (i − (N − 1)/2) · spacing`, positive towards `cross`. On a spherical Earth of
//! radius `R`, a satellite at radius `r_s` sees the ground at Earth central angle
//!
//! ```text
//! λ = sign(η) · (asin((r_s / R) · sin|η|) − |η|)
//! ```
//!
//! and the footprint center is `cos λ · up + sin λ · cross`. Angles beyond the instrument
//! maximum or beyond the Earth horizon yield [`RotcolError::GeometryOutOfRange`]; such
//! footprints are never generated by [`ScanGeometry::footprints_in_interval`].
use std::{fmt, ops::RangeInclusive};

use hifitime::Epoch;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{Degree, Radian, EARTH_MEAN_RADIUS, RADEG},
    geodesy::lat_lon,
    instruments::{Instrument, InstrumentConfig, ScanParameters},
    orbit::{OrbitProvider, OrbitState},
    rotcol_errors::RotcolError,
    time::{seconds_between, shift, TimeRange},
};

/// Position of a footprint in the scan grid: scan line index and footprint index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct FootprintId {
    pub scan: i64,
    pub footprint: usize,
}

impl FootprintId {
    pub fn new(scan: i64, footprint: usize) -> Self {
        FootprintId { scan, footprint }
    }
}

impl fmt::Display for FootprintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.scan, self.footprint)
    }
}

/// Ground center of one instrument footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanFootprint {
    pub satellite: String,
    pub instrument: Instrument,
    pub id: FootprintId,
    /// Nominal start time of the scan line.
    pub time: Epoch,
    pub latitude: Degree,
    pub longitude: Degree,
    /// Off-nadir cross-scan angle, positive to the left of the ground track.
    pub scan_angle: Degree,
    /// Along-scan tilt of the beam; zero for the cross-track scanners supported.
    pub along_scan_angle: Degree,
    direction: Vector3<f64>,
}

impl ScanFootprint {
    /// Build a footprint from its ground coordinates.
    pub fn new(
        satellite: &str,
        instrument: Instrument,
        id: FootprintId,
        time: Epoch,
        latitude: Degree,
        longitude: Degree,
        scan_angle: Degree,
    ) -> Self {
        ScanFootprint {
            satellite: satellite.to_string(),
            instrument,
            id,
            time,
            latitude,
            longitude,
            scan_angle,
            along_scan_angle: 0.0,
            direction: crate::geodesy::unit_vector(latitude, longitude),
        }
    }

    /// Earth-fixed unit vector of the footprint center.
    #[inline]
    pub fn direction(&self) -> &Vector3<f64> {
        &self.direction
    }
}

/// Local orbital frame of a scan line (Earth-fixed unit vectors).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitalFrame {
    pub up: Vector3<f64>,
    pub along: Vector3<f64>,
    pub cross: Vector3<f64>,
}

impl OrbitalFrame {
    /// Frame of an Earth-fixed state.
    pub fn from_state(state: &OrbitState) -> Self {
        let up = state.position.normalize();
        let along = (state.velocity - state.velocity.dot(&up) * up).normalize();
        let cross = up.cross(&along);
        OrbitalFrame { up, along, cross }
    }

    /// Components `(up, along, cross)` of `v` in this frame.
    #[inline]
    pub fn components(&self, v: &Vector3<f64>) -> (f64, f64, f64) {
        (v.dot(&self.up), v.dot(&self.along), v.dot(&self.cross))
    }

    /// Ground direction at central angle `lambda` along the cross-track great circle.
    #[inline]
    pub fn cross_track_point(&self, lambda: Radian) -> Vector3<f64> {
        let (s, c) = lambda.sin_cos();
        c * self.up + s * self.cross
    }
}

/// Earth central angle between nadir and the ground point seen at off-nadir angle `eta`.
///
/// Arguments
/// -----------------
/// * `eta`: signed off-nadir angle in radians.
/// * `radius_ratio`: satellite geocentric radius over the Earth radius (`> 1`).
///
/// Return
/// ----------
/// * The signed central angle, or `None` when the line of sight misses the Earth.
pub fn central_angle_for_scan_angle(eta: Radian, radius_ratio: f64) -> Option<Radian> {
    let s = radius_ratio * eta.abs().sin();
    if s >= 1.0 {
        return None;
    }
    Some(eta.signum() * (s.asin() - eta.abs()))
}

/// Off-nadir angle looking at the ground point at Earth central angle `lambda`.
///
/// Inverse of [`central_angle_for_scan_angle`] on the visible cap:
/// `tan η = sin λ / (r_s/R − cos λ)`.
pub fn scan_angle_for_central_angle(lambda: Radian, radius_ratio: f64) -> Radian {
    lambda.sin().atan2(radius_ratio - lambda.cos())
}

/// Central angle of the Earth horizon seen from `radius_ratio`.
pub fn horizon_central_angle(radius_ratio: f64) -> Radian {
    (1.0 / radius_ratio).clamp(-1.0, 1.0).acos()
}

/// One scan line: its nominal time, the propagated state and the derived frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanLine {
    pub index: i64,
    pub time: Epoch,
    pub state: OrbitState,
    pub frame: OrbitalFrame,
    radius_ratio: f64,
    instrument: Instrument,
    scan: ScanParameters,
}

impl ScanLine {
    /// Satellite radius over the Earth radius.
    pub fn radius_ratio(&self) -> f64 {
        self.radius_ratio
    }

    pub fn scan_parameters(&self) -> &ScanParameters {
        &self.scan
    }

    /// Footprint `footprint` of the line.
    ///
    /// Return
    /// ----------
    /// * The footprint, or [`RotcolError::GeometryOutOfRange`] when its scan angle exceeds
    ///   the instrument maximum or looks above the horizon.
    pub fn footprint(&self, footprint: usize) -> Result<ScanFootprint, RotcolError> {
        let scan_angle = self.scan.scan_angle(footprint);
        let out_of_range = || RotcolError::GeometryOutOfRange {
            scan_angle,
            max_scan_angle: self.scan.max_scan_angle,
        };
        if footprint >= self.scan.footprints_per_scan
            || scan_angle.abs() > self.scan.max_scan_angle + 1e-9
        {
            return Err(out_of_range());
        }
        let lambda = central_angle_for_scan_angle(scan_angle * RADEG, self.radius_ratio)
            .ok_or_else(out_of_range)?;

        let direction = self.frame.cross_track_point(lambda);
        let (latitude, longitude) = lat_lon(&direction);
        Ok(ScanFootprint {
            satellite: self.state.satellite.clone(),
            instrument: self.instrument,
            id: FootprintId::new(self.index, footprint),
            time: self.time,
            latitude,
            longitude,
            scan_angle,
            along_scan_angle: 0.0,
            direction,
        })
    }

    /// Every valid footprint of the line, in footprint order.
    pub fn footprints(&self) -> impl Iterator<Item = ScanFootprint> + '_ {
        (0..self.scan.footprints_per_scan).filter_map(|i| self.footprint(i).ok())
    }
}

/// Footprint model of one instrument on one satellite.
#[derive(Clone, Copy)]
pub struct ScanGeometry<'a> {
    config: &'a InstrumentConfig,
    orbit: &'a dyn OrbitProvider,
}

impl fmt::Debug for ScanGeometry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanGeometry")
            .field("config", self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> ScanGeometry<'a> {
    /// Arguments
    /// -----------------
    /// * `config`: instrument, satellite, scan parameters and grid anchor.
    /// * `orbit`: provider of the satellite states.
    ///
    /// Return
    /// ----------
    /// * The geometry, or [`RotcolError::InvalidConfiguration`] if `config` is inconsistent.
    pub fn new(
        config: &'a InstrumentConfig,
        orbit: &'a dyn OrbitProvider,
    ) -> Result<Self, RotcolError> {
        config.validate()?;
        Ok(ScanGeometry { config, orbit })
    }

    pub fn config(&self) -> &'a InstrumentConfig {
        self.config
    }

    pub fn satellite(&self) -> &'a str {
        &self.config.satellite
    }

    pub fn instrument(&self) -> Instrument {
        self.config.instrument
    }

    pub fn scan_parameters(&self) -> &'a ScanParameters {
        &self.config.scan
    }

    pub fn orbit(&self) -> &'a dyn OrbitProvider {
        self.orbit
    }

    /// Nominal start time of scan line `index`.
    #[inline]
    pub fn line_time(&self, index: i64) -> Epoch {
        shift(self.config.scan_epoch, index as f64 * self.config.scan.scan_period)
    }

    /// Fractional scan-line index of an epoch.
    #[inline]
    pub fn line_position(&self, time: Epoch) -> f64 {
        seconds_between(time, self.config.scan_epoch) / self.config.scan.scan_period
    }

    /// Scan lines whose nominal time lies in `range`, widened by `margin_scans` periods
    /// (at least one) on both sides. Empty when the widened range holds no grid point.
    pub fn line_range(&self, range: &TimeRange) -> RangeInclusive<i64> {
        let margin = self.config.margin_scans.max(1) as f64;
        let first = (self.line_position(range.start) - margin).ceil() as i64;
        let last = (self.line_position(range.end) + margin).floor() as i64;
        first..=last
    }

    /// Propagate scan line `index`.
    pub fn scan_line(&self, index: i64) -> Result<ScanLine, RotcolError> {
        let time = self.line_time(index);
        let state = self.orbit.position_at(&self.config.satellite, time)?;
        let frame = OrbitalFrame::from_state(&state);
        let radius_ratio = state.radius() * 1000.0 / EARTH_MEAN_RADIUS;
        Ok(ScanLine {
            index,
            time,
            state,
            frame,
            radius_ratio,
            instrument: self.config.instrument,
            scan: self.config.scan,
        })
    }

    /// A single footprint of the grid.
    pub fn footprint(&self, id: FootprintId) -> Result<ScanFootprint, RotcolError> {
        self.scan_line(id.scan)?.footprint(id.footprint)
    }

    /// Earth central angle (radians) from nadir to the outermost footprint, for a
    /// satellite at `radius_ratio` Earth radii.
    pub fn swath_half_angle(&self, radius_ratio: f64) -> Radian {
        let outermost = self.config.scan.outermost_angle() * RADEG;
        central_angle_for_scan_angle(outermost, radius_ratio)
            .unwrap_or_else(|| horizon_central_angle(radius_ratio))
            .abs()
    }

    /// Lazy iterator over every footprint of every scan line of `range` (with margin).
    ///
    /// Footprints come in scan-line order, then footprint order. Orbit failures are
    /// yielded as errors for the line concerned and the iteration continues with the
    /// next line. The iterator is `Clone`: a clone restarts from the clone point.
    pub fn footprints_in_interval(
        &self,
        range: &TimeRange,
    ) -> Result<FootprintIter<'a>, RotcolError> {
        self.config.validate()?;
        let lines = self.line_range(range);
        Ok(FootprintIter {
            geometry: *self,
            next_line: *lines.start(),
            last_line: *lines.end(),
            current: None,
            next_footprint: 0,
        })
    }
}

/// Iterator returned by [`ScanGeometry::footprints_in_interval`].
#[derive(Debug, Clone)]
pub struct FootprintIter<'a> {
    geometry: ScanGeometry<'a>,
    next_line: i64,
    last_line: i64,
    current: Option<ScanLine>,
    next_footprint: usize,
}

impl Iterator for FootprintIter<'_> {
    type Item = Result<ScanFootprint, RotcolError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = &self.current {
                while self.next_footprint < line.scan.footprints_per_scan {
                    let i = self.next_footprint;
                    self.next_footprint += 1;
                    match line.footprint(i) {
                        Ok(footprint) => return Some(Ok(footprint)),
                        Err(RotcolError::GeometryOutOfRange { .. }) => continue,
                        Err(e) => return Some(Err(e)),
                    }
                }
                self.current = None;
            }

            if self.next_line > self.last_line {
                return None;
            }
            let index = self.next_line;
            self.next_line += 1;
            match self.geometry.scan_line(index) {
                Ok(line) => {
                    self.current = Some(line);
                    self.next_footprint = 0;
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.geometry.config.scan.footprints_per_scan;
        let pending_lines = (self.last_line - self.next_line + 1).max(0) as usize;
        let current = self
            .current
            .as_ref()
            .map_or(0, |_| n.saturating_sub(self.next_footprint));
        (0, Some(current + pending_lines * n))
    }
}

/// Collect every footprint of `range`, failing on the first orbit error.
pub fn collect_footprints(
    geometry: &ScanGeometry<'_>,
    range: &TimeRange,
) -> Result<Vec<ScanFootprint>, RotcolError> {
    geometry.footprints_in_interval(range)?.collect()
}

#[cfg(test)]
mod scan_geometry_test {
    use super::*;
    use crate::{
        constants::EARTH_MEAN_RADIUS,
        geodesy::central_angle,
        orbit::{KeplerianElements, OrbitModel},
        time::parse_utc,
    };
    use approx::assert_relative_eq;

    fn setup() -> (InstrumentConfig, OrbitModel) {
        let t0 = parse_utc("2023-06-05T00:00:00").unwrap();
        let mut model = OrbitModel::new();
        model.insert(
            "JPSS-1",
            KeplerianElements::circular(t0, 824.0, 98.7, 45.0, 10.0),
        );
        let config = InstrumentConfig::new(Instrument::Atms, "JPSS-1", t0).unwrap();
        (config, model)
    }

    #[test]
    fn test_projection_inverse() {
        let ratio = (EARTH_MEAN_RADIUS + 824e3) / EARTH_MEAN_RADIUS;
        for eta_deg in [-52.7, -20.0, -1.11, 0.0, 0.555, 33.3, 52.725] {
            let eta = eta_deg * RADEG;
            let lambda = central_angle_for_scan_angle(eta, ratio).unwrap();
            assert_relative_eq!(
                scan_angle_for_central_angle(lambda, ratio),
                eta,
                epsilon = 1e-12
            );
            assert!(lambda.abs() < horizon_central_angle(ratio));
        }
        // beyond the horizon
        assert!(central_angle_for_scan_angle(70.0 * RADEG, ratio).is_none());
    }

    #[test]
    fn test_line_range_with_margin() {
        let (config, model) = setup();
        let geometry = ScanGeometry::new(&config, &model).unwrap();
        let t0 = config.scan_epoch;
        let range = TimeRange::new(t0, shift(t0, 8.0)).unwrap();
        // 8 s is exactly three ATMS periods; one margin line on each side
        assert_eq!(geometry.line_range(&range), -1..=4);
        assert_eq!(geometry.line_time(3), shift(t0, 8.0));
    }

    #[test]
    fn test_footprint_geometry() {
        let (config, model) = setup();
        let geometry = ScanGeometry::new(&config, &model).unwrap();
        let line = geometry.scan_line(12).unwrap();
        let footprints: Vec<_> = line.footprints().collect();
        assert_eq!(footprints.len(), 96);

        let nadir = line.state.position.normalize();
        let swath = geometry.swath_half_angle(line.radius_ratio());
        for fp in &footprints {
            let offset = central_angle(fp.direction(), &nadir);
            assert!(offset <= swath + 1e-12);
            // the footprint lies on the side its scan angle points to
            let side = fp.direction().dot(&line.frame.cross);
            assert_eq!(side > 0.0, fp.scan_angle > 0.0);
        }
        // ATMS swath is about 2 × 1300 km at 824 km altitude
        let width = swath * EARTH_MEAN_RADIUS;
        assert!(width > 1150e3 && width < 1400e3, "half swath {width}");
    }

    #[test]
    fn test_out_of_range_footprints_skipped() {
        let (config, model) = setup();
        let narrow = ScanParameters {
            max_scan_angle: 30.0,
            ..config.scan
        };
        let config = config.with_scan_parameters(narrow).unwrap();
        let geometry = ScanGeometry::new(&config, &model).unwrap();
        let line = geometry.scan_line(0).unwrap();
        assert!(matches!(
            line.footprint(0),
            Err(RotcolError::GeometryOutOfRange { .. })
        ));

        let range = TimeRange::around(config.scan_epoch, 1.0);
        let all: Vec<_> = collect_footprints(&geometry, &range).unwrap();
        assert!(all.iter().all(|fp| fp.scan_angle.abs() <= 30.0));
        // |η| ≤ 30° keeps 2·floor(30/1.11 + 0.5) = 54 footprints per line
        let lines = geometry.line_range(&range).count();
        assert_eq!(all.len(), lines * 54);
    }

    #[test]
    fn test_iterator_restartable() {
        let (config, model) = setup();
        let geometry = ScanGeometry::new(&config, &model).unwrap();
        let range = TimeRange::around(config.scan_epoch, 5.0);
        let mut iter = geometry.footprints_in_interval(&range).unwrap();
        let _ = iter.nth(100);
        let rest: Vec<_> = iter.clone().map(Result::unwrap).collect();
        let again: Vec<_> = iter.map(Result::unwrap).collect();
        assert_eq!(rest, again);
    }
}
