//! # Collocations
//!
//! Shared vocabulary of the two matchers and of everything that consumes their output.
//!
//! ## Matching rule
//!
//! An occultation and a footprint collocate when **both**
//!
//! * their great-circle surface distance is at most `spatial` meters, and
//! * `|t_footprint − t_occultation|` is at most `time` seconds.
//!
//! [`Tolerances::evaluate`] is the single implementation of this rule; the brute-force
//! and rotation matchers both call it, which is what makes their outputs comparable
//! pair by pair.
//!
//! ## Ordering
//!
//! A [`CollocationSet`] produced by a matcher lists its collocations by occultation input
//! order, then by [`FootprintId`] (scan line, then footprint).
pub mod brute_force;
pub mod payload;
pub mod rotation;
pub mod validator;

use std::{
    collections::{HashMap, HashSet},
    ops::Index,
};

use hifitime::Epoch;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    constants::{Meter, OccId, Radian, Second},
    geodesy::{angle_to_distance, central_angle, distance_to_angle},
    instruments::Instrument,
    occultation::Occultation,
    rotcol_errors::RotcolError,
    scan_geometry::{FootprintId, ScanFootprint},
    time::seconds_between,
};

pub use brute_force::BruteForceMatcher;
pub use payload::{
    OccultationProfile, Payload, PayloadSources, PopulationFailure, SounderMeasurement,
};
pub use rotation::{effective_sub_occultations, RotationMatcher};
pub use validator::{confusion, ConfusionMatrix, PairAgreement};

/// Time and distance tolerances of a collocation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerances {
    /// Maximum |Δt| in seconds.
    pub time: Second,
    /// Maximum great-circle surface distance in meters.
    pub spatial: Meter,
}

impl Tolerances {
    pub fn new(time: Second, spatial: Meter) -> Self {
        Tolerances { time, spatial }
    }

    pub fn validate(&self) -> Result<(), RotcolError> {
        let valid = |value: f64| value >= 0.0 && value.is_finite();
        if !valid(self.time) || !valid(self.spatial) {
            return Err(RotcolError::InvalidConfiguration(format!(
                "tolerances must be finite and non-negative (time {} s, spatial {} m)",
                self.time, self.spatial
            )));
        }
        Ok(())
    }

    /// Spatial tolerance as an Earth central angle.
    pub fn angle(&self) -> Radian {
        distance_to_angle(self.spatial)
    }

    #[inline]
    pub fn time_ok(&self, time_difference: Second) -> bool {
        time_difference.abs() <= self.time
    }

    #[inline]
    pub fn distance_ok(&self, distance: Meter) -> bool {
        distance <= self.spatial
    }

    /// Apply the matching rule to one occultation/footprint pair.
    ///
    /// Arguments
    /// -----------------
    /// * `occultation`: input index of the occultation.
    /// * `direction`: Earth-fixed unit vector of the occultation.
    /// * `time`: occultation time.
    /// * `footprint`: the footprint to test.
    ///
    /// Return
    /// ----------
    /// * `Some(pair)` when both tolerances are met, `None` otherwise.
    #[inline]
    pub fn evaluate(
        &self,
        occultation: usize,
        direction: &Vector3<f64>,
        time: Epoch,
        footprint: &ScanFootprint,
    ) -> Option<CandidatePair> {
        let time_difference = seconds_between(footprint.time, time);
        if !self.time_ok(time_difference) {
            return None;
        }
        let distance = separation(direction, footprint.direction());
        if !self.distance_ok(distance) {
            return None;
        }
        Some(CandidatePair {
            occultation,
            footprint: footprint.clone(),
            distance,
            time_difference,
        })
    }
}

/// Great-circle surface distance (m) between two Earth-fixed unit vectors.
#[inline]
pub fn separation(a: &Vector3<f64>, b: &Vector3<f64>) -> Meter {
    angle_to_distance(central_angle(a, b))
}

/// A pair that passed the matching rule, before it becomes a [`Collocation`].
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    /// Input index of the occultation.
    pub occultation: usize,
    pub footprint: ScanFootprint,
    /// Great-circle separation in meters.
    pub distance: Meter,
    /// `t_footprint − t_occultation` in seconds.
    pub time_difference: Second,
}

/// An accepted occultation/footprint pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Collocation {
    pub occultation: Occultation,
    pub footprint: ScanFootprint,
    pub distance: Meter,
    pub time_difference: Second,
    /// Observations attached by [`CollocationSet::populate_payload`].
    pub payload: Option<Payload>,
    /// Message of the last failed population attempt.
    pub population_error: Option<String>,
}

impl Collocation {
    pub fn new(occultation: Occultation, pair: CandidatePair) -> Self {
        Collocation {
            occultation,
            footprint: pair.footprint,
            distance: pair.distance,
            time_difference: pair.time_difference,
            payload: None,
            population_error: None,
        }
    }

    /// Identity of the collocation within a set.
    pub fn key(&self) -> (&str, FootprintId) {
        (&self.occultation.occid, self.footprint.id)
    }

    /// Group name used by exports: `{occid}+{satellite}-{instrument}+{scan}-{footprint}`.
    pub fn name(&self) -> String {
        format!(
            "{}+{}-{}+{}",
            self.occultation.occid, self.footprint.satellite, self.footprint.instrument,
            self.footprint.id
        )
    }
}

/// Provenance of a [`CollocationSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollocationMetadata {
    pub algorithm: String,
    pub tolerances: Tolerances,
    pub satellite: String,
    pub instrument: Instrument,
}

/// Ordered collection of collocations without duplicate `(occid, footprint)` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct CollocationSet {
    metadata: CollocationMetadata,
    collocations: Vec<Collocation>,
    keys: HashSet<(OccId, FootprintId)>,
}

impl CollocationSet {
    pub fn new(metadata: CollocationMetadata) -> Self {
        CollocationSet {
            metadata,
            collocations: Vec::new(),
            keys: HashSet::new(),
        }
    }

    /// Build a set from matcher output, grouped per occultation in input order.
    ///
    /// Duplicated keys are dropped with a warning.
    pub(crate) fn from_candidates(
        metadata: CollocationMetadata,
        occultations: &[Occultation],
        per_occultation: Vec<Vec<CandidatePair>>,
    ) -> Self {
        let mut set = CollocationSet::new(metadata);
        for pair in per_occultation.into_iter().flatten() {
            let occultation = occultations[pair.occultation].clone();
            if let Err(e) = set.push(Collocation::new(occultation, pair)) {
                warn!(error = %e, "dropping duplicate collocation");
            }
        }
        set
    }

    pub fn metadata(&self) -> &CollocationMetadata {
        &self.metadata
    }

    pub fn algorithm(&self) -> &str {
        &self.metadata.algorithm
    }

    /// Append a collocation, refusing a duplicate `(occid, footprint)` key.
    pub fn push(&mut self, collocation: Collocation) -> Result<(), RotcolError> {
        let key = (collocation.occultation.occid.clone(), collocation.footprint.id);
        if self.keys.contains(&key) {
            return Err(RotcolError::DuplicateCollocation {
                occid: key.0,
                footprint: key.1,
            });
        }
        self.keys.insert(key);
        self.collocations.push(collocation);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.collocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collocations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Collocation> {
        self.collocations.get(index)
    }

    pub(crate) fn get_mut(&mut self, index: usize) -> Result<&mut Collocation, RotcolError> {
        let size = self.collocations.len();
        self.collocations
            .get_mut(index)
            .ok_or(RotcolError::CollocationIndexOutOfRange { index, size })
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [Collocation] {
        &mut self.collocations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Collocation> {
        self.collocations.iter()
    }

    pub fn contains(&self, occid: &str, footprint: FootprintId) -> bool {
        self.keys.contains(&(occid.to_string(), footprint))
    }

    /// `(occid, footprint)` keys, in set order.
    pub fn pairs(&self) -> Vec<(OccId, FootprintId)> {
        self.iter()
            .map(|c| (c.occultation.occid.clone(), c.footprint.id))
            .collect()
    }

    /// Identifiers of the occultations with at least one collocation.
    pub fn occultation_ids(&self) -> HashSet<&str> {
        self.iter().map(|c| c.occultation.occid.as_str()).collect()
    }

    /// Every collocation of `self`, followed by those of `other` not already present.
    pub fn union(&self, other: &CollocationSet) -> CollocationSet {
        let mut set = self.clone();
        for c in other.iter() {
            if !set.contains(&c.occultation.occid, c.footprint.id) {
                set.keys
                    .insert((c.occultation.occid.clone(), c.footprint.id));
                set.collocations.push(c.clone());
            }
        }
        set
    }

    /// Collocations of `self` whose key is also in `other`, in `self` order.
    pub fn intersection(&self, other: &CollocationSet) -> CollocationSet {
        let mut set = CollocationSet::new(self.metadata.clone());
        for c in self.iter().filter(|c| other.contains(&c.occultation.occid, c.footprint.id)) {
            set.keys
                .insert((c.occultation.occid.clone(), c.footprint.id));
            set.collocations.push(c.clone());
        }
        set
    }

    /// Keep, for each occultation, only its closest footprint.
    ///
    /// Occultations keep the order of their first appearance; ties go to the earlier
    /// footprint.
    pub fn nearest_per_occultation(&self) -> CollocationSet {
        let mut best: Vec<&Collocation> = Vec::new();
        let mut slot: HashMap<&str, usize> = HashMap::new();
        for c in self.iter() {
            match slot.get(c.occultation.occid.as_str()) {
                Some(&i) => {
                    if c.distance < best[i].distance {
                        best[i] = c;
                    }
                }
                None => {
                    slot.insert(&c.occultation.occid, best.len());
                    best.push(c);
                }
            }
        }

        let mut set = CollocationSet::new(self.metadata.clone());
        for c in best {
            set.keys
                .insert((c.occultation.occid.clone(), c.footprint.id));
            set.collocations.push(c.clone());
        }
        set
    }
}

impl Index<usize> for CollocationSet {
    type Output = Collocation;

    fn index(&self, index: usize) -> &Self::Output {
        &self.collocations[index]
    }
}

impl<'a> IntoIterator for &'a CollocationSet {
    type Item = &'a Collocation;
    type IntoIter = std::slice::Iter<'a, Collocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An occultation the rotation matcher could not process.
#[derive(Debug)]
pub struct SkippedOccultation {
    pub occid: OccId,
    pub error: RotcolError,
}

/// Result of a matcher run: the collocations and the occultations that were skipped.
#[derive(Debug)]
pub struct MatchOutcome {
    pub collocations: CollocationSet,
    pub skipped: Vec<SkippedOccultation>,
}

impl MatchOutcome {
    pub fn skipped_ids(&self) -> HashSet<&str> {
        self.skipped.iter().map(|s| s.occid.as_str()).collect()
    }
}
