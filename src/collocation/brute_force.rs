//! Reference matcher: every occultation against every footprint.
//!
//! Quadratic in the number of inputs, and the baseline the rotation matcher is
//! validated against.
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    collocation::{
        CandidatePair, CollocationMetadata, CollocationSet, MatchOutcome, SkippedOccultation,
        Tolerances,
    },
    instruments::Instrument,
    occultation::Occultation,
    rotcol_errors::RotcolError,
    scan_geometry::{ScanFootprint, ScanGeometry},
    time::{seconds_between, TimeRange},
};

#[derive(Debug, Clone)]
pub struct BruteForceMatcher {
    satellite: String,
    instrument: Instrument,
    parallel: bool,
}

impl BruteForceMatcher {
    pub const ALGORITHM: &'static str = "brute-force";

    pub fn new(satellite: &str, instrument: Instrument) -> Self {
        BruteForceMatcher {
            satellite: satellite.to_string(),
            instrument,
            parallel: true,
        }
    }

    /// Matcher for the instrument described by `geometry`.
    pub fn for_geometry(geometry: &ScanGeometry<'_>) -> Self {
        BruteForceMatcher::new(geometry.satellite(), geometry.instrument())
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn metadata(&self, tolerances: &Tolerances) -> CollocationMetadata {
        CollocationMetadata {
            algorithm: Self::ALGORITHM.to_string(),
            tolerances: *tolerances,
            satellite: self.satellite.clone(),
            instrument: self.instrument,
        }
    }

    /// Compare every occultation with every footprint.
    ///
    /// Arguments
    /// -----------------
    /// * `occultations`: the occultations, in the order the output follows.
    /// * `footprints`: every candidate footprint.
    /// * `tolerances`: time and distance tolerances.
    ///
    /// Return
    /// ----------
    /// * All qualifying pairs, grouped by occultation in input order and sorted by
    ///   footprint id within an occultation.
    pub fn find(
        &self,
        occultations: &[Occultation],
        footprints: &[ScanFootprint],
        tolerances: &Tolerances,
    ) -> CollocationSet {
        let match_one = |(index, occ): (usize, &Occultation)| -> Vec<CandidatePair> {
            let direction = occ.direction();
            let mut hits: Vec<CandidatePair> = footprints
                .iter()
                .filter_map(|fp| tolerances.evaluate(index, &direction, occ.time, fp))
                .collect();
            hits.sort_by_key(|pair| pair.footprint.id);
            hits
        };

        let per_occultation: Vec<Vec<CandidatePair>> = if self.parallel {
            occultations.par_iter().enumerate().map(match_one).collect()
        } else {
            occultations.iter().enumerate().map(match_one).collect()
        };

        let set = CollocationSet::from_candidates(
            self.metadata(tolerances),
            occultations,
            per_occultation,
        );
        info!(
            algorithm = Self::ALGORITHM,
            occultations = occultations.len(),
            footprints = footprints.len(),
            collocations = set.len(),
            "brute-force matching done"
        );
        set
    }

    /// Generate the footprints of `range` and match them.
    ///
    /// A scan line whose orbit cannot be computed does not stop the run: the
    /// occultations within the time tolerance of that line are skipped and every other
    /// occultation is matched against the remaining lines.
    ///
    /// Return
    /// ----------
    /// * The collocations of the occultations that were not skipped, plus the skipped
    ///   ones with the orbit error of the first failed line in their time window.
    pub fn find_in_interval(
        &self,
        geometry: &ScanGeometry<'_>,
        range: &TimeRange,
        occultations: &[Occultation],
        tolerances: &Tolerances,
    ) -> Result<MatchOutcome, RotcolError> {
        tolerances.validate()?;
        let mut footprints = Vec::new();
        let mut failed_lines = Vec::new();
        for index in geometry.line_range(range) {
            match geometry.scan_line(index) {
                Ok(line) => footprints.extend(line.footprints()),
                Err(error) => {
                    warn!(line = index, %error, "scan line unavailable");
                    failed_lines.push((index, error));
                }
            }
        }
        if failed_lines.is_empty() {
            return Ok(MatchOutcome {
                collocations: self.find(occultations, &footprints, tolerances),
                skipped: Vec::new(),
            });
        }

        let mut kept = Vec::with_capacity(occultations.len());
        let mut skipped = Vec::new();
        for occ in occultations {
            let failure = failed_lines.iter().find(|(index, _)| {
                tolerances.time_ok(seconds_between(geometry.line_time(*index), occ.time))
            });
            match failure {
                Some((index, error)) => {
                    warn!(occid = %occ.occid, line = index, "skipping occultation");
                    skipped.push(SkippedOccultation {
                        occid: occ.occid.clone(),
                        error: line_failure(geometry, *index, error),
                    });
                }
                None => kept.push(occ.clone()),
            }
        }
        Ok(MatchOutcome {
            collocations: self.find(&kept, &footprints, tolerances),
            skipped,
        })
    }
}

/// Owned copy of the error met while propagating line `index`.
fn line_failure(geometry: &ScanGeometry<'_>, index: i64, first: &RotcolError) -> RotcolError {
    match geometry.scan_line(index) {
        Err(error) => error,
        Ok(_) => RotcolError::PropagationFailed {
            satellite: geometry.satellite().to_string(),
            reason: first.to_string(),
        },
    }
}

#[cfg(test)]
mod brute_force_test {
    use super::*;
    use crate::collocation::collocation_test::{footprint, occultation};
    use crate::scan_geometry::FootprintId;

    #[test]
    fn test_all_pairs_in_input_order() {
        let occs = vec![
            occultation("north", 10.0, 0.0),
            occultation("equator", 0.0, 0.0),
            occultation("far", -45.0, 120.0),
        ];
        let footprints = vec![
            footprint(2, 0, 0.5, 0.0, 0.0),
            footprint(1, 3, 10.2, 0.1, 0.0),
            footprint(1, 1, 0.0, 0.2, 0.0),
            footprint(1, 0, 9.9, 0.0, 0.0),
        ];
        let tol = Tolerances::new(600.0, 100e3);

        for parallel in [true, false] {
            let set = BruteForceMatcher::new("JPSS-1", Instrument::Atms)
                .with_parallel(parallel)
                .find(&occs, &footprints, &tol);
            assert_eq!(
                set.pairs(),
                vec![
                    ("north".to_string(), FootprintId::new(1, 0)),
                    ("north".to_string(), FootprintId::new(1, 3)),
                    ("equator".to_string(), FootprintId::new(1, 1)),
                    ("equator".to_string(), FootprintId::new(2, 0)),
                ]
            );
            assert_eq!(set.algorithm(), BruteForceMatcher::ALGORITHM);
        }
    }

    #[test]
    fn test_empty_inputs() {
        let tol = Tolerances::new(600.0, 100e3);
        let matcher = BruteForceMatcher::new("JPSS-1", Instrument::Atms);
        assert!(matcher.find(&[], &[footprint(0, 0, 0.0, 0.0, 0.0)], &tol).is_empty());
        assert!(matcher.find(&[occultation("a", 0.0, 0.0)], &[], &tol).is_empty());
    }
}
