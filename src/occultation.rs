//! # Radio occultation catalog
//!
//! [`Occultation`] records, the read-only [`OccultationIndex`] the matchers work on, and
//! the [`OccultationQuery`] filters understood by an [`OccultationSource`].
//!
//! ## Query semantics
//!
//! | Filter          | Keeps an occultation when...                                         |
//! |-----------------|----------------------------------------------------------------------|
//! | missions        | its mission is listed (exclusive with receivers)                     |
//! | receivers       | its receiver is listed (exclusive with missions)                     |
//! | transmitters    | its transmitter is listed (exclusive with constellations)            |
//! | constellations  | the first letter of its transmitter is listed (`G`, `R`, `E`, `C`)   |
//! | time range      | its time is within the closed interval                               |
//! | latitude range  | its latitude is within the closed interval                           |
//! | longitude range | within `[lo, hi]`, or outside `(hi, lo)` when `lo > hi` (date line)  |
//! | local time      | same wrapping rule, on the mean local solar time in hours            |
//! | geometry        | it is rising or setting                                              |
//! | file types      | every requested `{center}_{filetype}` is available                   |
use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
};

use hifitime::Epoch;
use nalgebra::Vector3;
use serde::Deserialize;
use tracing::debug;

use crate::{
    constants::{Degree, OccId},
    geodesy::unit_vector,
    rotcol_errors::RotcolError,
    time::{parse_utc, TimeRange},
};

/// A GNSS radio occultation sounding.
#[derive(Debug, Clone, PartialEq)]
pub struct Occultation {
    pub occid: OccId,
    /// Reference time of the sounding (UTC).
    pub time: Epoch,
    pub latitude: Degree,
    pub longitude: Degree,
    pub mission: String,
    pub receiver: String,
    pub transmitter: String,
    /// `Some(true)` for a setting occultation, `Some(false)` for a rising one.
    pub setting: Option<bool>,
    /// Available `{center}_{filetype}` products, e.g. `ucar_atmosphericRetrieval`.
    pub available_file_types: BTreeSet<String>,
}

impl Occultation {
    pub fn new(
        occid: &str,
        time: Epoch,
        latitude: Degree,
        longitude: Degree,
        mission: &str,
        receiver: &str,
        transmitter: &str,
    ) -> Self {
        Occultation {
            occid: occid.to_string(),
            time,
            latitude,
            longitude,
            mission: mission.to_string(),
            receiver: receiver.to_string(),
            transmitter: transmitter.to_string(),
            setting: None,
            available_file_types: BTreeSet::new(),
        }
    }

    pub fn with_file_types<I, S>(mut self, file_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_file_types = file_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_setting(mut self, setting: bool) -> Self {
        self.setting = Some(setting);
        self
    }

    /// Earth-fixed unit vector of the sounding location.
    #[inline]
    pub fn direction(&self) -> Vector3<f64> {
        unit_vector(self.latitude, self.longitude)
    }

    /// Mean local solar time of the sounding, in hours in `[0, 24)`.
    pub fn local_time(&self) -> f64 {
        let (_, _, _, hh, mm, ss, ns) = self.time.to_gregorian_utc();
        let utc_hours =
            hh as f64 + mm as f64 / 60.0 + (ss as f64 + ns as f64 * 1e-9) / 3600.0;
        (utc_hours + self.longitude / 15.0).rem_euclid(24.0)
    }

    /// GNSS constellation letter of the transmitter (`G` GPS, `R` GLONASS, ...).
    pub fn constellation(&self) -> Option<char> {
        self.transmitter.chars().next()
    }

    /// Whether `{center}_{filetype}` is available.
    pub fn has_file_type(&self, center: &str, file_type: &str) -> bool {
        self.available_file_types
            .contains(&format!("{center}_{file_type}"))
    }
}

/// Rising or setting occultation geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccultationGeometry {
    Rising,
    Setting,
}

/// Filters of an occultation metadata query. Empty filters keep everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OccultationQuery {
    pub missions: Option<Vec<String>>,
    pub receivers: Option<Vec<String>>,
    pub transmitters: Option<Vec<String>>,
    pub constellations: Option<Vec<char>>,
    pub time_range: Option<TimeRange>,
    pub latitude_range: Option<(Degree, Degree)>,
    pub longitude_range: Option<(Degree, Degree)>,
    pub local_time_range: Option<(f64, f64)>,
    pub geometry: Option<OccultationGeometry>,
    pub file_types: BTreeSet<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Inclusive range test, wrapping through the end of the cycle when `lo > hi`.
fn in_wrapping_range(value: f64, (lo, hi): (f64, f64)) -> bool {
    if lo <= hi {
        lo <= value && value <= hi
    } else {
        lo <= value || value <= hi
    }
}

impl OccultationQuery {
    pub fn new() -> Self {
        OccultationQuery::default()
    }

    pub fn missions(mut self, missions: &[&str]) -> Self {
        self.missions = Some(owned(missions));
        self
    }

    pub fn receivers(mut self, receivers: &[&str]) -> Self {
        self.receivers = Some(owned(receivers));
        self
    }

    pub fn transmitters(mut self, transmitters: &[&str]) -> Self {
        self.transmitters = Some(owned(transmitters));
        self
    }

    pub fn constellations(mut self, constellations: &[char]) -> Self {
        self.constellations = Some(constellations.to_vec());
        self
    }

    pub fn time_range(mut self, range: TimeRange) -> Self {
        self.time_range = Some(range);
        self
    }

    pub fn latitude_range(mut self, south: Degree, north: Degree) -> Self {
        self.latitude_range = Some((south, north));
        self
    }

    pub fn longitude_range(mut self, west: Degree, east: Degree) -> Self {
        self.longitude_range = Some((west, east));
        self
    }

    pub fn local_time_range(mut self, start_hour: f64, end_hour: f64) -> Self {
        self.local_time_range = Some((start_hour, end_hour));
        self
    }

    pub fn geometry(mut self, geometry: OccultationGeometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn file_types(mut self, file_types: &[&str]) -> Self {
        self.file_types = file_types.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Reject contradictory or malformed filters with [`RotcolError::InvalidQuery`].
    pub fn validate(&self) -> Result<(), RotcolError> {
        if self.missions.is_some() && self.receivers.is_some() {
            return Err(RotcolError::InvalidQuery(
                "filtering by both missions and receivers is not permitted".into(),
            ));
        }
        if self.transmitters.is_some() && self.constellations.is_some() {
            return Err(RotcolError::InvalidQuery(
                "filtering by both transmitters and GNSS constellations is not permitted".into(),
            ));
        }
        if let Some((south, north)) = self.latitude_range {
            if !(-90.0..=90.0).contains(&south) || !(-90.0..=90.0).contains(&north) || south > north
            {
                return Err(RotcolError::InvalidQuery(format!(
                    "latitude range ({south}, {north}) must be ordered within [-90, 90]"
                )));
            }
        }
        if let Some((west, east)) = self.longitude_range {
            if !(-180.0..=180.0).contains(&west) || !(-180.0..=180.0).contains(&east) {
                return Err(RotcolError::InvalidQuery(format!(
                    "longitude range ({west}, {east}) must fall within [-180, 180]"
                )));
            }
        }
        if let Some((start, end)) = self.local_time_range {
            if !(0.0..=24.0).contains(&start) || !(0.0..=24.0).contains(&end) {
                return Err(RotcolError::InvalidQuery(format!(
                    "local time range ({start}, {end}) must fall within [0, 24] hours"
                )));
            }
        }
        if let Some(bad) = self
            .file_types
            .iter()
            .find(|f| f.split_once('_').map_or(true, |(c, t)| c.is_empty() || t.is_empty()))
        {
            return Err(RotcolError::InvalidQuery(format!(
                "file type {bad:?} is not of the form {{center}}_{{filetype}}"
            )));
        }
        Ok(())
    }

    /// Whether `occ` passes every filter.
    pub fn matches(&self, occ: &Occultation) -> bool {
        let listed = |list: &Option<Vec<String>>, value: &str| {
            list.as_ref().map_or(true, |l| l.iter().any(|x| x == value))
        };

        listed(&self.missions, &occ.mission)
            && listed(&self.receivers, &occ.receiver)
            && listed(&self.transmitters, &occ.transmitter)
            && self.constellations.as_ref().map_or(true, |c| {
                occ.constellation().is_some_and(|letter| c.contains(&letter))
            })
            && self.time_range.map_or(true, |r| r.contains(occ.time))
            && self
                .latitude_range
                .map_or(true, |(s, n)| s <= occ.latitude && occ.latitude <= n)
            && self
                .longitude_range
                .map_or(true, |r| in_wrapping_range(occ.longitude, r))
            && self
                .local_time_range
                .map_or(true, |r| in_wrapping_range(occ.local_time(), r))
            && self.geometry.map_or(true, |g| {
                occ.setting == Some(g == OccultationGeometry::Setting)
            })
            && self
                .file_types
                .iter()
                .all(|f| occ.available_file_types.contains(f))
    }
}

/// External occultation metadata service.
pub trait OccultationSource {
    /// Occultations passing `query`.
    fn query(&self, query: &OccultationQuery) -> Result<Vec<Occultation>, RotcolError>;
}

/// Read-only, time-indexed view over a list of occultations.
///
/// Input order is preserved for iteration and indexing; a secondary permutation sorted
/// by time serves range queries.
#[derive(Debug, Clone, Default)]
pub struct OccultationIndex {
    occultations: Vec<Occultation>,
    by_time: Vec<usize>,
}

impl OccultationIndex {
    pub fn new(occultations: Vec<Occultation>) -> Self {
        let mut by_time: Vec<usize> = (0..occultations.len()).collect();
        by_time.sort_by(|&a, &b| occultations[a].time.cmp(&occultations[b].time));
        OccultationIndex {
            occultations,
            by_time,
        }
    }

    pub fn len(&self) -> usize {
        self.occultations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.occultations.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Occultation> {
        self.occultations.get(index)
    }

    pub fn as_slice(&self) -> &[Occultation] {
        &self.occultations
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Occultation> {
        self.occultations.iter()
    }

    /// Time span covered by the occultations, if any.
    pub fn time_span(&self) -> Option<TimeRange> {
        let first = self.by_time.first()?;
        let last = self.by_time.last()?;
        Some(TimeRange {
            start: self.occultations[*first].time,
            end: self.occultations[*last].time,
        })
    }

    /// Input indices of the occultations within `range`, in time order.
    pub fn indices_in(&self, range: &TimeRange) -> &[usize] {
        let lo = self
            .by_time
            .partition_point(|&i| self.occultations[i].time < range.start);
        let hi = self
            .by_time
            .partition_point(|&i| self.occultations[i].time <= range.end);
        &self.by_time[lo..hi.max(lo)]
    }

    /// Occultations passing `query`, in input order.
    pub fn filter(&self, query: &OccultationQuery) -> Result<Vec<Occultation>, RotcolError> {
        query.validate()?;
        let candidates: Vec<usize> = match &query.time_range {
            Some(range) => {
                let mut idx = self.indices_in(range).to_vec();
                idx.sort_unstable();
                idx
            }
            None => (0..self.len()).collect(),
        };
        Ok(candidates
            .into_iter()
            .map(|i| &self.occultations[i])
            .filter(|occ| query.matches(occ))
            .cloned()
            .collect())
    }

    /// Number of occultations offering each `{center}_{filetype}` product.
    pub fn file_type_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for file_type in self.iter().flat_map(|o| o.available_file_types.iter()) {
            *counts.entry(file_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Distinct missions present, sorted.
    pub fn missions(&self) -> BTreeSet<&str> {
        self.iter().map(|o| o.mission.as_str()).collect()
    }

    /// Distinct receivers present, sorted.
    pub fn receivers(&self) -> BTreeSet<&str> {
        self.iter().map(|o| o.receiver.as_str()).collect()
    }
}

impl std::ops::Index<usize> for OccultationIndex {
    type Output = Occultation;

    fn index(&self, index: usize) -> &Self::Output {
        &self.occultations[index]
    }
}

impl<'a> IntoIterator for &'a OccultationIndex {
    type Item = &'a Occultation;
    type IntoIter = std::slice::Iter<'a, Occultation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl FromIterator<Occultation> for OccultationIndex {
    fn from_iter<T: IntoIterator<Item = Occultation>>(iter: T) -> Self {
        OccultationIndex::new(iter.into_iter().collect())
    }
}

/// Row of an occultation CSV snapshot.
///
/// `file_types` holds the available products separated by `;`, `setting` is
/// `rising`/`setting` or empty.
#[derive(Debug, Deserialize)]
struct CatalogRecord {
    occid: String,
    time: String,
    latitude: f64,
    longitude: f64,
    mission: String,
    receiver: String,
    transmitter: String,
    #[serde(default)]
    setting: Option<OccultationGeometry>,
    #[serde(default)]
    file_types: String,
}

impl TryFrom<CatalogRecord> for Occultation {
    type Error = RotcolError;

    fn try_from(record: CatalogRecord) -> Result<Self, Self::Error> {
        Ok(Occultation {
            occid: record.occid,
            time: parse_utc(&record.time)?,
            latitude: record.latitude,
            longitude: record.longitude,
            mission: record.mission,
            receiver: record.receiver,
            transmitter: record.transmitter,
            setting: record
                .setting
                .map(|g| g == OccultationGeometry::Setting),
            available_file_types: record
                .file_types
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        })
    }
}

/// In-memory [`OccultationSource`] over a snapshot of the metadata service.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    index: OccultationIndex,
}

impl InMemoryCatalog {
    pub fn new(occultations: Vec<Occultation>) -> Self {
        InMemoryCatalog {
            index: OccultationIndex::new(occultations),
        }
    }

    /// Load a CSV snapshot with header
    /// `occid,time,latitude,longitude,mission,receiver,transmitter,setting,file_types`.
    pub fn from_csv_reader<R: std::io::Read>(reader: R) -> Result<Self, RotcolError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let occultations = csv_reader
            .deserialize::<CatalogRecord>()
            .map(|row| Occultation::try_from(row?))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = occultations.len(), "loaded occultation catalog");
        Ok(InMemoryCatalog::new(occultations))
    }

    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self, RotcolError> {
        let file = std::fs::File::open(path)?;
        InMemoryCatalog::from_csv_reader(file)
    }

    pub fn index(&self) -> &OccultationIndex {
        &self.index
    }
}

impl OccultationSource for InMemoryCatalog {
    fn query(&self, query: &OccultationQuery) -> Result<Vec<Occultation>, RotcolError> {
        self.index.filter(query)
    }
}
