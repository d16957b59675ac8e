//! # Collocation payload
//!
//! A collocation found by a matcher only carries geometry. Population attaches the
//! observations of both sides:
//!
//! * the RO profile of the occultation (bending angle against impact parameter, and
//!   refractivity against altitude), read from a processing center's retrieval,
//! * the sounder measurement of the footprint (brightness temperatures of every channel).
//!
//! Both archives are reached through the [`OccultationProfileSource`] and
//! [`SounderDataSource`] traits. Population of one element is idempotent: a successful
//! call overwrites any previous payload and clears the recorded failure.
use hifitime::Epoch;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    collocation::{Collocation, CollocationSet},
    constants::{Degree, OccId},
    instruments::Instrument,
    occultation::Occultation,
    rotcol_errors::RotcolError,
    scan_geometry::ScanFootprint,
};

/// File type an occultation must offer at the processing center to be populated.
pub const PROFILE_FILE_TYPE: &str = "refractivityRetrieval";

/// Retrieved RO profile of one occultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccultationProfile {
    pub occid: OccId,
    /// Archive object the profile was read from.
    pub file: String,
    pub mission: String,
    pub transmitter: String,
    pub receiver: String,
    pub time: Epoch,
    /// Bending angle, radians.
    pub bending_angle: Vec<f64>,
    /// Impact parameter, meters.
    pub impact_parameter: Vec<f64>,
    /// Local radius of curvature of the Earth at the tangent point, meters.
    pub radius_of_curvature: f64,
    /// Microwave refractivity, N-units.
    pub refractivity: Vec<f64>,
    /// Geopotential height, meters.
    pub geopotential: Vec<f64>,
    /// Height above the ellipsoid, meters.
    pub altitude: Vec<f64>,
}

/// Sounder observation of one footprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SounderMeasurement {
    pub satellite: String,
    pub instrument: Instrument,
    /// Level-1B granule the measurement was read from.
    pub file: String,
    /// Brightness temperature of every channel, kelvin.
    pub brightness_temperatures: Vec<f64>,
    pub longitude: Degree,
    pub latitude: Degree,
    pub time: Epoch,
    pub scan_angle: Degree,
}

/// Observations attached to a collocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub occultation: OccultationProfile,
    pub sounder: SounderMeasurement,
}

/// Archive of retrieved RO profiles.
pub trait OccultationProfileSource: Sync {
    /// Profile of `occultation` as retrieved by processing center `center`.
    fn profile(
        &self,
        occultation: &Occultation,
        center: &str,
    ) -> Result<OccultationProfile, RotcolError>;
}

/// Archive of sounder Level-1B data.
pub trait SounderDataSource: Sync {
    fn measurement(&self, footprint: &ScanFootprint) -> Result<SounderMeasurement, RotcolError>;
}

/// The two archives population reads from.
#[derive(Clone, Copy)]
pub struct PayloadSources<'s> {
    pub profiles: &'s dyn OccultationProfileSource,
    pub sounder: &'s dyn SounderDataSource,
}

impl<'s> PayloadSources<'s> {
    pub fn new(
        profiles: &'s dyn OccultationProfileSource,
        sounder: &'s dyn SounderDataSource,
    ) -> Self {
        PayloadSources { profiles, sounder }
    }

    fn fetch(&self, collocation: &Collocation, center: &str) -> Result<Payload, RotcolError> {
        let occ = &collocation.occultation;
        let fetch_failed = |reason: String| RotcolError::PayloadFetchFailed {
            occid: occ.occid.clone(),
            reason,
        };
        if !occ.has_file_type(center, PROFILE_FILE_TYPE) {
            return Err(fetch_failed(format!(
                "no {center}_{PROFILE_FILE_TYPE} file for this occultation"
            )));
        }

        let occultation = self
            .profiles
            .profile(occ, center)
            .map_err(|e| as_fetch_failure(e, &fetch_failed))?;
        let sounder = self
            .sounder
            .measurement(&collocation.footprint)
            .map_err(|e| as_fetch_failure(e, &fetch_failed))?;
        Ok(Payload {
            occultation,
            sounder,
        })
    }
}

fn as_fetch_failure(
    error: RotcolError,
    fetch_failed: &impl Fn(String) -> RotcolError,
) -> RotcolError {
    match error {
        RotcolError::PayloadFetchFailed { .. } => error,
        other => fetch_failed(other.to_string()),
    }
}

/// A collocation that could not be populated.
#[derive(Debug, PartialEq)]
pub struct PopulationFailure {
    /// Position of the collocation in its set.
    pub index: usize,
    pub occid: OccId,
    pub error: RotcolError,
}

fn populate_one(
    collocation: &mut Collocation,
    center: &str,
    sources: &PayloadSources<'_>,
) -> Result<(), RotcolError> {
    match sources.fetch(collocation, center) {
        Ok(payload) => {
            collocation.payload = Some(payload);
            collocation.population_error = None;
            Ok(())
        }
        Err(error) => {
            collocation.population_error = Some(error.to_string());
            Err(error)
        }
    }
}

impl CollocationSet {
    /// Fetch and attach the payload of collocation `index`.
    ///
    /// Arguments
    /// -----------------
    /// * `index`: position of the collocation in the set.
    /// * `center`: RO processing center (`"ucar"`, `"romsaf"`, `"jpl"`...).
    /// * `sources`: the archives to read from.
    ///
    /// Return
    /// ----------
    /// * `Ok(())` once the payload is attached,
    ///   [`RotcolError::CollocationIndexOutOfRange`] for a bad index, or
    ///   [`RotcolError::PayloadFetchFailed`] when either side cannot be read; the failure
    ///   is also recorded on the collocation and any earlier payload is kept.
    pub fn populate_payload(
        &mut self,
        index: usize,
        center: &str,
        sources: &PayloadSources<'_>,
    ) -> Result<(), RotcolError> {
        let collocation = self.get_mut(index)?;
        populate_one(collocation, center, sources)
    }

    /// Populate every collocation in parallel, continuing past failures.
    ///
    /// Return
    /// ----------
    /// * The failures, in set order. An empty vector means every collocation holds a
    ///   payload.
    pub fn populate_all(
        &mut self,
        center: &str,
        sources: &PayloadSources<'_>,
    ) -> Vec<PopulationFailure> {
        let failures: Vec<PopulationFailure> = self
            .as_mut_slice()
            .par_iter_mut()
            .enumerate()
            .filter_map(|(index, collocation)| {
                populate_one(collocation, center, sources)
                    .err()
                    .map(|error| PopulationFailure {
                        index,
                        occid: collocation.occultation.occid.clone(),
                        error,
                    })
            })
            .collect();

        for failure in &failures {
            warn!(
                index = failure.index,
                occid = %failure.occid,
                error = %failure.error,
                "payload population failed"
            );
        }
        debug!(
            center,
            populated = self.len() - failures.len(),
            failed = failures.len(),
            "payload population done"
        );
        failures
    }

    /// Number of collocations currently holding a payload.
    pub fn populated_count(&self) -> usize {
        self.iter().filter(|c| c.payload.is_some()).count()
    }
}

#[cfg(test)]
pub(crate) mod payload_test {
    use super::*;
    use crate::collocation::{
        collocation_test::{footprint, metadata, occultation},
        CandidatePair,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct FakeProfiles {
        pub(crate) calls: AtomicUsize,
    }

    impl OccultationProfileSource for FakeProfiles {
        fn profile(
            &self,
            occ: &Occultation,
            center: &str,
        ) -> Result<OccultationProfile, RotcolError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if occ.occid == "broken" {
                return Err(RotcolError::InvalidQuery("archive offline".into()));
            }
            Ok(OccultationProfile {
                occid: occ.occid.clone(),
                file: format!("{center}/{}.nc", occ.occid),
                mission: occ.mission.clone(),
                transmitter: occ.transmitter.clone(),
                receiver: occ.receiver.clone(),
                time: occ.time,
                bending_angle: vec![0.02, 0.01, 0.005],
                impact_parameter: vec![6.38e6, 6.39e6, 6.40e6],
                radius_of_curvature: 6.371e6,
                refractivity: vec![300.0, 250.0],
                geopotential: vec![1000.0, 2000.0],
                altitude: vec![1000.0, 2010.0],
            })
        }
    }

    pub(crate) struct FakeSounder;

    impl SounderDataSource for FakeSounder {
        fn measurement(&self, fp: &ScanFootprint) -> Result<SounderMeasurement, RotcolError> {
            Ok(SounderMeasurement {
                satellite: fp.satellite.clone(),
                instrument: fp.instrument,
                file: "granule.h5".into(),
                brightness_temperatures: vec![250.0; 22],
                longitude: fp.longitude,
                latitude: fp.latitude,
                time: fp.time,
                scan_angle: fp.scan_angle,
            })
        }
    }

    pub(crate) fn with_profile(occ: Occultation) -> Occultation {
        occ.with_file_types(["ucar_refractivityRetrieval", "ucar_atmosphericRetrieval"])
    }

    fn populated_set() -> CollocationSet {
        let mut set = CollocationSet::new(metadata("brute-force"));
        let occs = [
            with_profile(occultation("ok", 0.0, 0.0)),
            with_profile(occultation("broken", 0.0, 0.0)),
            occultation("no-file", 0.0, 0.0),
        ];
        for (i, occ) in occs.into_iter().enumerate() {
            set.push(Collocation::new(
                occ,
                CandidatePair {
                    occultation: i,
                    footprint: footprint(i as i64, 0, 0.0, 0.0, 0.0),
                    distance: 0.0,
                    time_difference: 0.0,
                },
            ))
            .unwrap();
        }
        set
    }

    #[test]
    fn test_populate_one() {
        let profiles = FakeProfiles {
            calls: AtomicUsize::new(0),
        };
        let sources = PayloadSources::new(&profiles, &FakeSounder);
        let mut set = populated_set();

        set.populate_payload(0, "ucar", &sources).unwrap();
        let payload = set[0].payload.clone().unwrap();
        assert_eq!(payload.occultation.file, "ucar/ok.nc");
        assert_eq!(payload.sounder.brightness_temperatures.len(), 22);

        // idempotent
        set.populate_payload(0, "ucar", &sources).unwrap();
        assert_eq!(set[0].payload, Some(payload));
        assert_eq!(set.populated_count(), 1);

        // no file of that center
        let err = set.populate_payload(0, "romsaf", &sources).unwrap_err();
        assert!(matches!(err, RotcolError::PayloadFetchFailed { .. }));
        assert!(set[0].payload.is_some());
        assert!(set[0].population_error.is_some());

        assert_eq!(
            set.populate_payload(9, "ucar", &sources),
            Err(RotcolError::CollocationIndexOutOfRange { index: 9, size: 3 })
        );
    }

    #[test]
    fn test_populate_all_collects_failures() {
        let profiles = FakeProfiles {
            calls: AtomicUsize::new(0),
        };
        let sources = PayloadSources::new(&profiles, &FakeSounder);
        let mut set = populated_set();

        let failures = set.populate_all("ucar", &sources);
        assert_eq!(
            failures.iter().map(|f| (f.index, f.occid.as_str())).collect::<Vec<_>>(),
            vec![(1, "broken"), (2, "no-file")]
        );
        assert!(failures
            .iter()
            .all(|f| matches!(f.error, RotcolError::PayloadFetchFailed { .. })));
        // the file-type check happens before any archive access
        assert_eq!(profiles.calls.load(Ordering::Relaxed), 2);
        assert_eq!(set.populated_count(), 1);
        assert!(set[0].population_error.is_none());
        assert!(set[1].population_error.as_deref().unwrap().contains("archive offline"));
    }
}
