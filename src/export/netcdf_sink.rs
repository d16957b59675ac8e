//! NetCDF-4 files for exported documents.
//!
//! Every [`Group`] becomes a netCDF group, every [`Variable`] a one-dimensional `f64`
//! variable over its own dimension `{name}_dim`, and every attribute a netCDF
//! attribute (string, 64-bit integer or double). The root group of the document is the
//! root group of the file.
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use tempfile::Builder;

use crate::{
    export::{AttributeValue, Group, HierarchicalSink, Variable},
    rotcol_errors::RotcolError,
};

/// Writes a document as a NetCDF-4 file, atomically.
#[derive(Debug, Clone)]
pub struct NetcdfSink {
    path: PathBuf,
}

impl NetcdfSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        NetcdfSink {
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

fn to_netcdf(value: &AttributeValue) -> netcdf::AttributeValue {
    match value {
        AttributeValue::Text(s) => netcdf::AttributeValue::Str(s.clone()),
        AttributeValue::Integer(i) => netcdf::AttributeValue::Longlong(*i),
        AttributeValue::Float(f) => netcdf::AttributeValue::Double(*f),
    }
}

fn from_netcdf(value: netcdf::AttributeValue) -> Option<AttributeValue> {
    use netcdf::AttributeValue as Nc;
    match value {
        Nc::Str(s) => Some(AttributeValue::Text(s)),
        Nc::Longlong(i) => Some(AttributeValue::Integer(i)),
        Nc::Int(i) => Some(AttributeValue::Integer(i64::from(i))),
        Nc::Double(f) => Some(AttributeValue::Float(f)),
        Nc::Float(f) => Some(AttributeValue::Float(f64::from(f))),
        _ => None,
    }
}

fn write_variable(
    target: &mut netcdf::GroupMut<'_>,
    variable: &Variable,
) -> Result<(), netcdf::Error> {
    let dimension = format!("{}_dim", variable.name);
    target.add_dimension(&dimension, variable.values.len())?;
    let mut written = target.add_variable::<f64>(&variable.name, &[dimension.as_str()])?;
    // _FillValue must be defined before any data
    for (name, value) in &variable.attributes {
        written.put_attribute(name, to_netcdf(value))?;
    }
    if !variable.values.is_empty() {
        written.put_values(variable.values.as_slice(), ..)?;
    }
    Ok(())
}

fn write_group(target: &mut netcdf::GroupMut<'_>, group: &Group) -> Result<(), netcdf::Error> {
    for (name, value) in &group.attributes {
        target.add_attribute(name, to_netcdf(value))?;
    }
    for variable in &group.variables {
        write_variable(target, variable)?;
    }
    for child in &group.groups {
        let mut written = target.add_group(&child.name)?;
        write_group(&mut written, child)?;
    }
    Ok(())
}

impl HierarchicalSink for NetcdfSink {
    /// Return
    /// ----------
    /// * `Ok(())` once the destination holds the complete file, or
    ///   [`RotcolError::ExportFailed`]; on failure the destination is left untouched.
    fn write(&self, document: &Group) -> Result<(), RotcolError> {
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temporary = Builder::new()
            .suffix(".nc")
            .tempfile_in(directory)
            .map_err(|e| self.failed(e))?;

        {
            let mut file = netcdf::create(temporary.path()).map_err(|e| self.failed(e))?;
            let mut root = file
                .root_mut()
                .ok_or_else(|| self.failed("file has no root group"))?;
            write_group(&mut root, document).map_err(|e| self.failed(e))?;
        }

        temporary.as_file().sync_all().map_err(|e| self.failed(e))?;
        temporary
            .persist(&self.path)
            .map_err(|e| self.failed(e.error))?;
        Ok(())
    }
}

fn read_group(source: &netcdf::Group<'_>, name: &str) -> Result<Group, RotcolError> {
    let mut group = Group::new(name);
    for attribute in source.attributes() {
        if let Some(value) = from_netcdf(attribute.value()?) {
            group.attributes.insert(attribute.name().to_string(), value);
        }
    }
    for variable in source.variables() {
        let mut attributes = BTreeMap::new();
        for attribute in variable.attributes() {
            if let Some(value) = from_netcdf(attribute.value()?) {
                attributes.insert(attribute.name().to_string(), value);
            }
        }
        group.variables.push(Variable {
            name: variable.name(),
            values: variable.get_values::<f64, _>(..)?,
            attributes,
        });
    }
    for child in source.groups() {
        let child_name = child.name();
        group.groups.push(read_group(&child, &child_name)?);
    }
    Ok(group)
}

/// Read back a document written by [`NetcdfSink`].
pub fn read_netcdf_document(path: impl AsRef<Path>) -> Result<Group, RotcolError> {
    let file = netcdf::open(path.as_ref())?;
    let root = file.root().ok_or_else(|| RotcolError::ExportFailed {
        path: path.as_ref().display().to_string(),
        reason: "file has no root group".into(),
    })?;
    read_group(&root, "/")
}

#[cfg(test)]
mod netcdf_sink_test {
    use super::*;
    use crate::export::FILL_VALUE;

    fn document() -> Group {
        let mut root = Group::new("/");
        root.set_attribute("file_type", "collocations");
        let mut child = Group::new("C2E1.2023.156.00.00.G01+JPSS-1-ATMS+120-47");
        child.set_attribute("scan", 120i64);
        child.set_attribute("distance", 12345.5);
        let mut occultation = Group::new("occultation");
        occultation.variables.push(Variable::new(
            "bendingAngle",
            &[0.02, f64::NAN, 0.005],
            "Bending angle",
            "radians",
        ));
        child.groups.push(occultation);
        root.groups.push(child);
        root
    }

    #[test]
    fn test_netcdf_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collocations.nc");
        NetcdfSink::new(&path).write(&document()).unwrap();

        let read = read_netcdf_document(&path).unwrap();
        assert_eq!(
            read.attribute("file_type").and_then(|a| a.as_text()),
            Some("collocations")
        );
        let child = read.group("C2E1.2023.156.00.00.G01+JPSS-1-ATMS+120-47").unwrap();
        assert_eq!(child.attribute("scan"), Some(&AttributeValue::Integer(120)));
        assert_eq!(child.attribute("distance").and_then(|a| a.as_float()), Some(12345.5));

        let bending = child
            .group("occultation")
            .and_then(|g| g.variable("bendingAngle"))
            .unwrap();
        assert_eq!(bending.values, vec![0.02, FILL_VALUE, 0.005]);
        assert_eq!(bending.fill_value(), Some(FILL_VALUE));
        assert!(bending.masked_values()[1].is_nan());
    }

    #[test]
    fn test_failed_write_leaves_destination() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent").join("out.nc");
        let err = NetcdfSink::new(&missing).write(&document()).unwrap_err();
        assert!(matches!(err, RotcolError::ExportFailed { .. }));
        assert!(!missing.exists());
    }
}
