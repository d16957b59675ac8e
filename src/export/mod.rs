//! # Collocation export
//!
//! A [`CollocationSet`] is exported as a hierarchical document of [`Group`]s, each
//! holding attributes, named [`Variable`]s and sub-groups, the layout of a NetCDF-4
//! file:
//!
//! ```text
//! /                                   file_type, creation_time, algorithm, tolerances, author
//! ├── {occid}+{sat}-{instr}+{scan}-{fp}   occid, scan, footprint, distance, time_difference, ...
//! │   ├── occultation                 bendingAngle, impactParameter, refractivity, ...
//! │   └── sounder                     brightnessTemperature, ...
//! └── ...
//! ```
//!
//! Missing values (NaN or infinite) are stored as [`FILL_VALUE`], and every variable
//! carries a `_FillValue` attribute naming it.
//!
//! Documents are handed to a [`HierarchicalSink`]. [`JsonFileSink`] writes JSON through a
//! temporary file in the destination directory, renamed over the destination only after
//! a complete write. With the `netcdf` feature, `NetcdfSink` writes NetCDF-4 files the
//! same way.
#[cfg(feature = "netcdf")]
mod netcdf_sink;

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use hifitime::Epoch;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::{
    collocation::{Collocation, CollocationSet, OccultationProfile, SounderMeasurement},
    constants::{Degree, Meter, Second},
    rotcol_errors::RotcolError,
    scan_geometry::FootprintId,
    time::{format_utc, parse_utc},
};

#[cfg(feature = "netcdf")]
pub use netcdf_sink::{read_netcdf_document, NetcdfSink};

/// Value of the `file_type` root attribute.
pub const FILE_TYPE: &str = "gnssro-nadirsounder-collocations";

/// Stand-in for missing floating-point values in exported documents.
pub const FILL_VALUE: f64 = -9.99e20;

/// `value`, or [`FILL_VALUE`] when it is not finite.
#[inline]
fn filled(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        FILL_VALUE
    }
}

/// Attribute value of a group or a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Float(f64),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(filled(value))
    }
}

impl AttributeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value, integers included. A stored [`FILL_VALUE`] reads back as NaN.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(f) if *f == FILL_VALUE => Some(f64::NAN),
            AttributeValue::Float(f) => Some(*f),
            AttributeValue::Integer(i) => Some(*i as f64),
            AttributeValue::Text(_) => None,
        }
    }
}

/// One-dimensional variable with its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub values: Vec<f64>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Variable {
    /// Variable with the usual `description`, `units` and `_FillValue` attributes.
    /// Non-finite values are replaced by [`FILL_VALUE`].
    pub fn new(name: &str, values: &[f64], description: &str, units: &str) -> Self {
        let attributes = BTreeMap::from([
            ("description".to_string(), description.into()),
            ("units".to_string(), units.into()),
            ("_FillValue".to_string(), AttributeValue::Float(FILL_VALUE)),
        ]);
        Variable {
            name: name.to_string(),
            values: values.iter().copied().map(filled).collect(),
            attributes,
        }
    }

    /// Fill value of the variable, if it declares one.
    pub fn fill_value(&self) -> Option<f64> {
        match self.attributes.get("_FillValue") {
            Some(AttributeValue::Float(f)) => Some(*f),
            Some(AttributeValue::Integer(i)) => Some(*i as f64),
            _ => None,
        }
    }

    /// Values with the filled slots turned back into NaN.
    pub fn masked_values(&self) -> Vec<f64> {
        match self.fill_value() {
            Some(fill) => self
                .values
                .iter()
                .map(|&v| if v == fill { f64::NAN } else { v })
                .collect(),
            None => self.values.clone(),
        }
    }
}

/// Node of an exported document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Group {
    pub fn new(name: &str) -> Self {
        Group {
            name: name.to_string(),
            ..Group::default()
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttributeValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    fn text(&self, name: &str) -> Result<&str, RotcolError> {
        self.attribute(name)
            .and_then(AttributeValue::as_text)
            .ok_or_else(|| self.missing(name))
    }

    fn integer(&self, name: &str) -> Result<i64, RotcolError> {
        self.attribute(name)
            .and_then(AttributeValue::as_integer)
            .ok_or_else(|| self.missing(name))
    }

    fn float(&self, name: &str) -> Result<f64, RotcolError> {
        self.attribute(name)
            .and_then(AttributeValue::as_float)
            .ok_or_else(|| self.missing(name))
    }

    fn missing(&self, attribute: &str) -> RotcolError {
        RotcolError::InvalidConfiguration(format!(
            "group '{}' has no valid attribute '{attribute}'",
            self.name
        ))
    }
}

fn occultation_group(profile: &OccultationProfile) -> Group {
    let mut group = Group::new("occultation");
    group.set_attribute("occid", profile.occid.as_str());
    group.set_attribute("file", profile.file.as_str());
    group.set_attribute("mission", profile.mission.as_str());
    group.set_attribute("transmitter", profile.transmitter.as_str());
    group.set_attribute("receiver", profile.receiver.as_str());
    group.set_attribute("time", format_utc(&profile.time));
    group.set_attribute("radiusOfCurvature", profile.radius_of_curvature);
    group.variables = vec![
        Variable::new(
            "bendingAngle",
            &profile.bending_angle,
            "Bending angle",
            "radians",
        ),
        Variable::new(
            "impactParameter",
            &profile.impact_parameter,
            "Impact parameter",
            "m",
        ),
        Variable::new(
            "refractivity",
            &profile.refractivity,
            "Microwave refractivity",
            "N-units",
        ),
        Variable::new(
            "geopotential",
            &profile.geopotential,
            "Geopotential height",
            "m",
        ),
        Variable::new(
            "altitude",
            &profile.altitude,
            "Height above the ellipsoid",
            "m",
        ),
    ];
    group
}

fn sounder_group(measurement: &SounderMeasurement) -> Group {
    let mut group = Group::new("sounder");
    group.set_attribute("satellite", measurement.satellite.as_str());
    group.set_attribute("instrument", measurement.instrument.name());
    group.set_attribute("file", measurement.file.as_str());
    group.set_attribute("time", format_utc(&measurement.time));
    group.set_attribute("longitude", measurement.longitude);
    group.set_attribute("latitude", measurement.latitude);
    group.set_attribute("scan_angle", measurement.scan_angle);
    group.variables = vec![Variable::new(
        "brightnessTemperature",
        &measurement.brightness_temperatures,
        "Brightness temperature of every channel",
        "K",
    )];
    group
}

fn collocation_group(collocation: &Collocation) -> Group {
    let occ = &collocation.occultation;
    let fp = &collocation.footprint;
    let mut group = Group::new(&collocation.name());
    group.set_attribute("occid", occ.occid.as_str());
    group.set_attribute("satellite", fp.satellite.as_str());
    group.set_attribute("instrument", fp.instrument.name());
    group.set_attribute("scan", fp.id.scan);
    group.set_attribute("footprint", fp.id.footprint as i64);
    group.set_attribute("distance", collocation.distance);
    group.set_attribute("time_difference", collocation.time_difference);
    group.set_attribute("occultation_time", format_utc(&occ.time));
    group.set_attribute("occultation_latitude", occ.latitude);
    group.set_attribute("occultation_longitude", occ.longitude);
    group.set_attribute("footprint_time", format_utc(&fp.time));
    group.set_attribute("footprint_latitude", fp.latitude);
    group.set_attribute("footprint_longitude", fp.longitude);
    group.set_attribute("scan_angle", fp.scan_angle);
    group.set_attribute("along_scan_angle", fp.along_scan_angle);
    group.set_attribute("has_payload", i64::from(collocation.payload.is_some()));
    if let Some(error) = &collocation.population_error {
        group.set_attribute("population_error", error.as_str());
    }

    if let Some(payload) = &collocation.payload {
        group.groups.push(occultation_group(&payload.occultation));
        group.groups.push(sounder_group(&payload.sounder));
    }
    group
}

/// Destination of exported documents.
pub trait HierarchicalSink {
    fn write(&self, document: &Group) -> Result<(), RotcolError>;
}

/// Writes a document as pretty-printed JSON, atomically.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        JsonFileSink {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn failed(&self, reason: impl ToString) -> RotcolError {
        RotcolError::ExportFailed {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl HierarchicalSink for JsonFileSink {
    /// Return
    /// ----------
    /// * `Ok(())` once the destination holds the complete document, or
    ///   [`RotcolError::ExportFailed`]; on failure the destination is left untouched.
    fn write(&self, document: &Group) -> Result<(), RotcolError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temporary = NamedTempFile::new_in(directory).map_err(|e| self.failed(e))?;

        let mut writer = BufWriter::new(temporary);
        serde_json::to_writer_pretty(&mut writer, document).map_err(|e| self.failed(e))?;
        writer.flush().map_err(|e| self.failed(e))?;
        let temporary = writer.into_inner().map_err(|e| self.failed(e.error()))?;
        temporary.as_file().sync_all().map_err(|e| self.failed(e))?;
        temporary
            .persist(&self.path)
            .map_err(|e| self.failed(e.error))?;
        Ok(())
    }
}

impl CollocationSet {
    /// Build the export document of the set, stamped with the current time.
    pub fn to_document(&self, author: Option<&str>) -> Result<Group, RotcolError> {
        let now = Epoch::now().map_err(|e| RotcolError::InvalidTimeFormat(e.to_string()))?;
        Ok(self.to_document_at(author, now))
    }

    /// Build the export document of the set with an explicit creation time.
    pub fn to_document_at(&self, author: Option<&str>, created: Epoch) -> Group {
        let metadata = self.metadata();
        let mut root = Group::new("/");
        root.set_attribute("file_type", FILE_TYPE);
        root.set_attribute("creation_time", format_utc(&created));
        root.set_attribute("algorithm", metadata.algorithm.as_str());
        root.set_attribute("time_tolerance", metadata.tolerances.time);
        root.set_attribute("spatial_tolerance", metadata.tolerances.spatial);
        root.set_attribute("satellite", metadata.satellite.as_str());
        root.set_attribute("instrument", metadata.instrument.name());
        if let Some(author) = author {
            root.set_attribute("author", author);
        }
        root.groups = self.iter().map(collocation_group).collect();
        root
    }

    /// Export the set to `sink`.
    pub fn export(
        &self,
        sink: &dyn HierarchicalSink,
        author: Option<&str>,
    ) -> Result<(), RotcolError> {
        let document = self.to_document(author)?;
        sink.write(&document)?;
        info!(collocations = self.len(), "collocations exported");
        Ok(())
    }
}

/// Read back a document written by [`JsonFileSink`].
pub fn read_document(path: impl AsRef<Path>) -> Result<Group, RotcolError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

/// Collocation summary read back from an exported group.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedCollocation {
    pub occid: String,
    pub satellite: String,
    pub instrument: String,
    pub footprint: FootprintId,
    pub distance: Meter,
    pub time_difference: Second,
    pub occultation_time: Epoch,
    pub occultation_latitude: Degree,
    pub occultation_longitude: Degree,
    pub has_payload: bool,
    pub population_error: Option<String>,
}

impl ExportedCollocation {
    pub fn from_group(group: &Group) -> Result<Self, RotcolError> {
        let footprint = usize::try_from(group.integer("footprint")?)
            .map_err(|_| group.missing("footprint"))?;
        Ok(ExportedCollocation {
            occid: group.text("occid")?.to_string(),
            satellite: group.text("satellite")?.to_string(),
            instrument: group.text("instrument")?.to_string(),
            footprint: FootprintId::new(group.integer("scan")?, footprint),
            distance: group.float("distance")?,
            time_difference: group.float("time_difference")?,
            occultation_time: parse_utc(group.text("occultation_time")?)?,
            occultation_latitude: group.float("occultation_latitude")?,
            occultation_longitude: group.float("occultation_longitude")?,
            has_payload: group.integer("has_payload")? != 0,
            population_error: group
                .attribute("population_error")
                .and_then(AttributeValue::as_text)
                .map(str::to_string),
        })
    }
}

/// Every collocation of an exported document, in document order.
pub fn exported_collocations(document: &Group) -> Result<Vec<ExportedCollocation>, RotcolError> {
    document.groups.iter().map(ExportedCollocation::from_group).collect()
}

#[cfg(test)]
mod export_test {
    use super::*;
    use crate::collocation::{
        collocation_test::{footprint, metadata, occultation},
        payload::{
            payload_test::{FakeProfiles, FakeSounder},
            OccultationProfileSource, SounderDataSource,
        },
        CandidatePair, Payload,
    };
    use std::sync::atomic::AtomicUsize;

    fn sample_set() -> CollocationSet {
        let mut set = CollocationSet::new(metadata("rotation-collocation"));
        set.push(Collocation::new(
            occultation("C2E1.2023.156.00.00.G01", 12.5, -40.25),
            CandidatePair {
                occultation: 0,
                footprint: footprint(120, 47, 12.6, -40.3, 75.0),
                distance: 12345.5,
                time_difference: 75.0,
            },
        ))
        .unwrap();
        set
    }

    #[test]
    fn test_document_layout() {
        let set = sample_set();
        let created = parse_utc("2024-01-02T03:04:05").unwrap();
        let doc = set.to_document_at(Some("A. Author"), created);

        assert_eq!(doc.attribute("file_type").and_then(|a| a.as_text()), Some(FILE_TYPE));
        assert_eq!(
            doc.attribute("creation_time").and_then(|a| a.as_text()),
            Some("2024-01-02T03:04:05Z")
        );
        assert_eq!(doc.attribute("spatial_tolerance").and_then(|a| a.as_float()), Some(150e3));
        assert_eq!(doc.groups.len(), 1);

        let group = doc.group("C2E1.2023.156.00.00.G01+JPSS-1-ATMS+120-47").unwrap();
        assert_eq!(group.attribute("has_payload"), Some(&AttributeValue::Integer(0)));
        assert!(group.groups.is_empty());

        let exported = exported_collocations(&doc).unwrap();
        assert_eq!(exported[0].footprint, FootprintId::new(120, 47));
        assert_eq!(exported[0].distance, 12345.5);
        assert!(!exported[0].has_payload);

        let no_author = set.to_document_at(None, created);
        assert!(no_author.attribute("author").is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collocations.json");
        let sink = JsonFileSink::new(&path);

        let set = sample_set();
        set.export(&sink, Some("someone")).unwrap();
        let doc = read_document(&path).unwrap();
        assert_eq!(doc.attribute("author").and_then(|a| a.as_text()), Some("someone"));

        let exported = exported_collocations(&doc).unwrap();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].occid, "C2E1.2023.156.00.00.G01");
        assert_eq!(exported[0].occultation_latitude, 12.5);
        assert_eq!(exported[0].time_difference, 75.0);
    }

    #[test]
    fn test_missing_values_round_trip() {
        let mut set = sample_set();
        let profiles = FakeProfiles {
            calls: AtomicUsize::new(0),
        };
        let mut profile = profiles.profile(&set[0].occultation, "ucar").unwrap();
        profile.bending_angle = vec![0.02, f64::NAN, 0.005];
        profile.radius_of_curvature = f64::NAN;
        let mut sounder = FakeSounder.measurement(&set[0].footprint).unwrap();
        sounder.brightness_temperatures[3] = f64::NAN;
        sounder.brightness_temperatures[5] = f64::INFINITY;
        set.as_mut_slice()[0].payload = Some(Payload {
            occultation: profile,
            sounder,
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masked.json");
        set.export(&JsonFileSink::new(&path), None).unwrap();
        let doc = read_document(&path).unwrap();
        assert!(exported_collocations(&doc).unwrap()[0].has_payload);

        let occultation = doc.groups[0].group("occultation").unwrap();
        let bending = occultation.variable("bendingAngle").unwrap();
        assert_eq!(bending.values, vec![0.02, FILL_VALUE, 0.005]);
        assert_eq!(bending.fill_value(), Some(FILL_VALUE));
        let masked = bending.masked_values();
        assert_eq!(masked[0], 0.02);
        assert!(masked[1].is_nan());
        assert!(occultation
            .attribute("radiusOfCurvature")
            .and_then(|a| a.as_float())
            .unwrap()
            .is_nan());

        let temperatures = doc.groups[0]
            .group("sounder")
            .and_then(|g| g.variable("brightnessTemperature"))
            .unwrap()
            .masked_values();
        assert_eq!(temperatures.len(), 22);
        assert!(temperatures[3].is_nan());
        assert!(temperatures[5].is_nan());
        assert_eq!(temperatures[0], 250.0);
    }

    #[test]
    fn test_failed_write_leaves_destination() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent").join("out.json");
        let err = JsonFileSink::new(&missing)
            .write(&Group::new("/"))
            .unwrap_err();
        assert!(matches!(err, RotcolError::ExportFailed { .. }));
        assert!(!missing.exists());

        // an existing file is replaced only by a complete document
        let path = dir.path().join("out.json");
        std::fs::write(&path, "previous").unwrap();
        JsonFileSink::new(&path).write(&Group::new("/")).unwrap();
        assert_eq!(read_document(&path).unwrap(), Group::new("/"));
    }
}
