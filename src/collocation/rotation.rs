//! # Rotation-collocation matcher
//!
//! Finds the same pairs as the brute-force matcher while propagating the orbit for only
//! a small fraction of the scan lines.
//!
//! ## Algorithm
//!
//! For each occultation:
//!
//! 1. **Candidate lines**: the scan lines whose nominal time is within the time
//!    tolerance of the occultation, found by grid arithmetic and confirmed with the
//!    shared time test.
//! 2. **Sub-occultations**: the candidate lines are split into `k` contiguous windows
//!    (see [`effective_sub_occultations`]). The orbit is propagated once at the central
//!    line of each window and the occultation is rotated into that line's inertial
//!    orbital frame, giving its along-track angle `α` and its angle `β` to the orbit
//!    plane. A line at `Δt` from the center can only see the occultation if
//!
//!    ```text
//!    |β|                   ≤ L + ω⊕|Δt|
//!    |wrap(α − ω_s Δt)|    ≤ L + ω⊕|Δt|
//!    ```
//!
//!    where `L` is the swath half-angle plus the tolerance angle plus a margin, `ω_s`
//!    the angular rate of the satellite and `ω⊕` the Earth rotation rate bounding the
//!    motion of the occultation in inertial space. Other lines are rejected unpropagated.
//! 3. **Exact step**: surviving lines are propagated. In the line's Earth-fixed frame the
//!    footprints lie on the great circle spanned by `up` and `cross`; with the
//!    occultation components `(u, c)` on that plane, the footprint at central angle `λ`
//!    is at angular distance `d` with `cos d = ρ cos(λ − λ*)`, `ρ = √(u² + c²)`,
//!    `λ* = atan2(c, u)`. The footprints within `τ` therefore span
//!    `λ* ± acos(cos τ / ρ)`, mapped to scan angles and then to footprint indices. Each
//!    index of that range (widened by one on each side) is confirmed with the shared
//!    matching rule.
//! 4. Hits of all windows are coalesced per occultation and sorted by footprint id.
//!
//! Orbit failures skip the occultation, which is reported in
//! [`MatchOutcome::skipped`](crate::collocation::MatchOutcome).
use std::f64::consts::FRAC_PI_2;

use nalgebra::{Rotation3, Vector3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    collocation::{
        CandidatePair, CollocationMetadata, CollocationSet, MatchOutcome, SkippedOccultation,
        Tolerances,
    },
    constants::{Radian, Second, EARTH_ROTATION_RATE, RADEG, SUB_OCCULTATION_SPAN},
    kepler::angle_diff,
    occultation::Occultation,
    rotcol_errors::RotcolError,
    scan_geometry::{
        horizon_central_angle, scan_angle_for_central_angle, ScanGeometry, ScanLine,
    },
    time::{gmst_at, seconds_between, TimeRange},
};

/// Extra angle added to the pruning limits, covering eccentricity, J2 and the tilt of
/// the Earth-fixed ground track with respect to the inertial orbit plane.
const PRUNING_MARGIN: Radian = 1.0 * RADEG;

/// Padding of the tolerance angle in the exact step (about 6 m on the ground).
const ANGLE_PAD: Radian = 1e-6;

/// Number of sub-occultations actually used for a time tolerance.
///
/// Above [`SUB_OCCULTATION_SPAN`] (30 min) a single orbital frame cannot be trusted over
/// the whole candidate window: the count is raised to at least `ceil(tol / 30 min)` and
/// never below 2. Otherwise the configured count is used (at least 1).
pub fn effective_sub_occultations(configured: usize, time_tolerance: Second) -> usize {
    if time_tolerance > SUB_OCCULTATION_SPAN {
        let needed = (time_tolerance / SUB_OCCULTATION_SPAN).ceil() as usize;
        configured.max(needed).max(2)
    } else {
        configured.max(1)
    }
}

/// Occultation position relative to the inertial orbit plane of a reference line.
#[derive(Debug, Clone, Copy)]
struct OrbitPlaneOffset {
    /// Along-track angle from the satellite, in the orbit plane.
    along: Radian,
    /// Angle to the orbit plane.
    normal: Radian,
    /// Angular rate of the satellite along its orbit, rad/s.
    angular_rate: f64,
}

impl OrbitPlaneOffset {
    fn new(line: &ScanLine, occultation: &Vector3<f64>) -> Self {
        let inertial = line.state.to_eci();
        let r = inertial.position;
        let h = r.cross(&inertial.velocity);

        let x = r.normalize();
        let n = h.normalize();
        let y = n.cross(&x);

        let o = Rotation3::from_axis_angle(&Vector3::z_axis(), gmst_at(&line.time)) * occultation;
        OrbitPlaneOffset {
            along: o.dot(&y).atan2(o.dot(&x)),
            normal: o.dot(&n).clamp(-1.0, 1.0).asin(),
            angular_rate: h.norm() / r.norm_squared(),
        }
    }

    /// Whether a line `dt` seconds away may hold a footprint within `limit` of the
    /// occultation.
    fn may_collocate(&self, dt: Second, limit: Radian) -> bool {
        let slack = limit + EARTH_ROTATION_RATE * dt.abs();
        if slack >= FRAC_PI_2 {
            return true;
        }
        // cos d = cos β · cos(α − a) for the nadir at along-track angle a
        self.normal.abs() <= slack
            && angle_diff(self.along, self.angular_rate * dt).abs() <= slack
    }
}

/// Footprint indices of `line` that may lie within `tau` of `occultation`.
fn footprint_window(
    line: &ScanLine,
    occultation: &Vector3<f64>,
    tau: Radian,
) -> Option<(usize, usize)> {
    let scan = line.scan_parameters();
    let last = scan.footprints_per_scan.checked_sub(1)?;
    let tau = tau + ANGLE_PAD;
    if tau >= FRAC_PI_2 {
        return Some((0, last));
    }

    let (u, _, c) = line.frame.components(occultation);
    let rho = u.hypot(c);
    let cos_tau = tau.cos();
    if rho < cos_tau {
        return None;
    }
    let closest = c.atan2(u);
    let half_width = (cos_tau / rho).min(1.0).acos();

    let ratio = line.radius_ratio();
    let horizon = horizon_central_angle(ratio);
    let lo = (closest - half_width).max(-horizon);
    let hi = (closest + half_width).min(horizon);
    if lo > hi {
        return None;
    }

    let eta_lo = scan_angle_for_central_angle(lo, ratio) / RADEG;
    let eta_hi = scan_angle_for_central_angle(hi, ratio) / RADEG;
    let first = scan.footprint_position(eta_lo).floor() - 1.0;
    let end = scan.footprint_position(eta_hi).ceil() + 1.0;
    if end < 0.0 || first > last as f64 {
        return None;
    }
    Some((first.max(0.0) as usize, (end as usize).min(last)))
}

/// Pruning statistics of one occultation.
#[derive(Debug, Default, Clone, Copy)]
struct LineStats {
    candidates: usize,
    pruned: usize,
    propagated: usize,
}

/// The rotation-collocation matcher over the scan lines of one time range.
#[derive(Debug, Clone)]
pub struct RotationMatcher<'a> {
    geometry: ScanGeometry<'a>,
    range: TimeRange,
    sub_occultations: usize,
    parallel: bool,
}

impl<'a> RotationMatcher<'a> {
    pub const ALGORITHM: &'static str = "rotation-collocation";

    /// Arguments
    /// -----------------
    /// * `geometry`: scan geometry of the instrument.
    /// * `range`: time range whose scan lines (with margin) are searched; use the same
    ///   range as the footprints given to the brute-force matcher to compare both.
    pub fn new(geometry: ScanGeometry<'a>, range: TimeRange) -> Self {
        RotationMatcher {
            geometry,
            range,
            sub_occultations: 2,
            parallel: true,
        }
    }

    pub fn with_sub_occultations(mut self, sub_occultations: usize) -> Self {
        self.sub_occultations = sub_occultations;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn metadata(&self, tolerances: &Tolerances) -> CollocationMetadata {
        CollocationMetadata {
            algorithm: Self::ALGORITHM.to_string(),
            tolerances: *tolerances,
            satellite: self.geometry.satellite().to_string(),
            instrument: self.geometry.instrument(),
        }
    }

    /// Find every collocation of `occultations`.
    ///
    /// Return
    /// ----------
    /// * The collocations, grouped by occultation in input order and sorted by footprint
    ///   id, plus the occultations skipped because their orbit could not be computed.
    pub fn find(&self, occultations: &[Occultation], tolerances: &Tolerances) -> MatchOutcome {
        let k = effective_sub_occultations(self.sub_occultations, tolerances.time);
        if k != self.sub_occultations {
            debug!(
                configured = self.sub_occultations,
                effective = k,
                time_tolerance = tolerances.time,
                "sub-occultation count adjusted"
            );
        }

        let run = |(index, occ): (usize, &Occultation)| self.match_one(index, occ, tolerances, k);
        let results: Vec<Result<(Vec<CandidatePair>, LineStats), RotcolError>> = if self.parallel
        {
            occultations.par_iter().enumerate().map(run).collect()
        } else {
            occultations.iter().enumerate().map(run).collect()
        };

        let mut per_occultation = Vec::with_capacity(results.len());
        let mut skipped = Vec::new();
        let mut totals = LineStats::default();
        for (occ, result) in occultations.iter().zip(results) {
            match result {
                Ok((hits, stats)) => {
                    totals.candidates += stats.candidates;
                    totals.pruned += stats.pruned;
                    totals.propagated += stats.propagated;
                    per_occultation.push(hits);
                }
                Err(error) => {
                    warn!(occid = %occ.occid, %error, "skipping occultation");
                    skipped.push(SkippedOccultation {
                        occid: occ.occid.clone(),
                        error,
                    });
                }
            }
        }

        let collocations =
            CollocationSet::from_candidates(self.metadata(tolerances), occultations, per_occultation);
        info!(
            algorithm = Self::ALGORITHM,
            occultations = occultations.len(),
            skipped = skipped.len(),
            sub_occultations = k,
            candidate_lines = totals.candidates,
            pruned_lines = totals.pruned,
            propagated_lines = totals.propagated,
            collocations = collocations.len(),
            "rotation-collocation matching done"
        );
        MatchOutcome {
            collocations,
            skipped,
        }
    }

    /// Scan lines within the time tolerance of `occ`, restricted to the matcher range.
    fn candidate_lines(&self, occ: &Occultation, tolerances: &Tolerances) -> Vec<i64> {
        let window = self.geometry.line_range(&self.range);
        let center = self.geometry.line_position(occ.time);
        let half_width = tolerances.time / self.geometry.scan_parameters().scan_period;
        // clamp in f64 before casting, half_width may be infinite
        let first = ((center - half_width).floor() - 1.0).max(*window.start() as f64) as i64;
        let last = ((center + half_width).ceil() + 1.0).min(*window.end() as f64) as i64;

        (first..=last)
            .filter(|&k| {
                tolerances.time_ok(seconds_between(self.geometry.line_time(k), occ.time))
            })
            .collect()
    }

    fn match_one(
        &self,
        index: usize,
        occ: &Occultation,
        tolerances: &Tolerances,
        sub_occultations: usize,
    ) -> Result<(Vec<CandidatePair>, LineStats), RotcolError> {
        let lines = self.candidate_lines(occ, tolerances);
        let mut stats = LineStats {
            candidates: lines.len(),
            ..LineStats::default()
        };
        if lines.is_empty() {
            return Ok((Vec::new(), stats));
        }

        let direction = occ.direction();
        let tau = tolerances.angle();
        let window_len = lines.len().div_ceil(sub_occultations.min(lines.len()));

        let mut hits = Vec::new();
        for window in lines.chunks(window_len) {
            let center = self.geometry.scan_line(window[window.len() / 2])?;
            stats.propagated += 1;
            let offset = OrbitPlaneOffset::new(&center, &direction);
            let limit = self.geometry.swath_half_angle(center.radius_ratio()) + tau + PRUNING_MARGIN;

            for &k in window {
                let dt = seconds_between(self.geometry.line_time(k), center.time);
                if !offset.may_collocate(dt, limit) {
                    stats.pruned += 1;
                    continue;
                }
                let propagated;
                let line = if k == center.index {
                    &center
                } else {
                    propagated = self.geometry.scan_line(k)?;
                    stats.propagated += 1;
                    &propagated
                };

                let Some((first, last)) = footprint_window(line, &direction, tau) else {
                    continue;
                };
                for i in first..=last {
                    match line.footprint(i) {
                        Ok(fp) => hits.extend(tolerances.evaluate(index, &direction, occ.time, &fp)),
                        Err(RotcolError::GeometryOutOfRange { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        hits.sort_by_key(|pair| pair.footprint.id);
        hits.dedup_by_key(|pair| pair.footprint.id);
        debug!(
            occid = %occ.occid,
            candidate_lines = stats.candidates,
            pruned = stats.pruned,
            propagated = stats.propagated,
            hits = hits.len(),
            "occultation matched"
        );
        Ok((hits, stats))
    }
}
