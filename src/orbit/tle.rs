//! # Two-line element sets
//!
//! Parsing of NORAD two-line (and three-line, with a leading object name) element
//! sets and their propagation through the `sgp4` crate. Propagated states are
//! expressed in the TEME frame, which the rest of the crate treats as its inertial
//! frame ([`RefFrame::Eci`](crate::orbit::RefFrame::Eci)): the difference between TEME
//! and a true-of-date frame is far below a footprint size.
use std::fmt;

use hifitime::Epoch;
use nalgebra::Vector3;
use sgp4::{Constants, Elements, MinutesSinceEpoch};

use crate::{
    constants::{Kilometer, SECONDS_PER_MINUTE},
    rotcol_errors::RotcolError,
    time::{format_utc, seconds_between},
};

/// A parsed TLE together with its initialized SGP4 propagator constants.
pub struct Tle {
    /// Object name from the title line of a three-line set, if any.
    pub name: Option<String>,
    pub norad_id: u64,
    /// Epoch of the element set (UTC).
    pub epoch: Epoch,
    line1: String,
    line2: String,
    constants: Constants,
}

impl Tle {
    /// Parse a TLE from its two data lines.
    ///
    /// Arguments
    /// -----------------
    /// * `name`: optional object name (title line of a three-line set).
    /// * `line1`, `line2`: the two 69-character data lines.
    ///
    /// Return
    /// ----------
    /// * The element set with initialized SGP4 constants, or [`RotcolError::InvalidTle`]
    ///   if the lines are malformed or describe an orbit SGP4 refuses.
    pub fn from_lines(name: Option<&str>, line1: &str, line2: &str) -> Result<Self, RotcolError> {
        let line1 = line1.trim_end();
        let line2 = line2.trim_end();
        let name = name.map(|n| n.trim().trim_start_matches("0 ").trim().to_string());

        let elements = Elements::from_tle(name.clone(), line1.as_bytes(), line2.as_bytes())
            .map_err(|e| RotcolError::InvalidTle(format!("{e}")))?;
        let constants = Constants::from_elements(&elements)
            .map_err(|e| RotcolError::InvalidTle(format!("{e}")))?;

        let epoch =
            Epoch::from_unix_milliseconds(elements.datetime.and_utc().timestamp_millis() as f64);

        Ok(Tle {
            name,
            norad_id: elements.norad_id,
            epoch,
            line1: line1.to_string(),
            line2: line2.to_string(),
            constants,
        })
    }

    /// The two data lines, as given.
    pub fn lines(&self) -> (&str, &str) {
        (&self.line1, &self.line2)
    }

    /// Propagate the element set with SGP4.
    ///
    /// Return
    /// ----------
    /// * `(position km, velocity km/s)` in TEME at `time`, or
    ///   [`RotcolError::PropagationFailed`] when SGP4 reports a decayed or diverging orbit.
    pub fn propagate(
        &self,
        time: Epoch,
    ) -> Result<(Vector3<Kilometer>, Vector3<f64>), RotcolError> {
        let minutes = seconds_between(time, self.epoch) / SECONDS_PER_MINUTE;
        let prediction = self
            .constants
            .propagate(MinutesSinceEpoch(minutes))
            .map_err(|e| RotcolError::PropagationFailed {
                satellite: self.label(),
                reason: format!("{e}"),
            })?;
        Ok((
            Vector3::from(prediction.position),
            Vector3::from(prediction.velocity),
        ))
    }

    fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => self.norad_id.to_string(),
        }
    }
}

impl fmt::Debug for Tle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tle")
            .field("name", &self.name)
            .field("norad_id", &self.norad_id)
            .field("epoch", &format_utc(&self.epoch))
            .finish()
    }
}

/// Parse a text holding any number of two-line or three-line element sets.
///
/// Blank lines are ignored. A line that is neither a data line (`1 ...`, `2 ...`) nor
/// the title of a following `1`/`2` pair is an error.
pub fn parse_tle_text(text: &str) -> Result<Vec<Tle>, RotcolError> {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();

    let is_line = |l: &str, n: char| l.starts_with(n) && l.chars().nth(1) == Some(' ');

    let mut sets = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if is_line(lines[i], '1') && i + 1 < lines.len() && is_line(lines[i + 1], '2') {
            sets.push(Tle::from_lines(None, lines[i], lines[i + 1])?);
            i += 2;
        } else if i + 2 < lines.len() && is_line(lines[i + 1], '1') && is_line(lines[i + 2], '2')
        {
            sets.push(Tle::from_lines(Some(lines[i]), lines[i + 1], lines[i + 2])?);
            i += 3;
        } else {
            return Err(RotcolError::InvalidTle(format!(
                "unexpected line {}: {:?}",
                i + 1,
                lines[i]
            )));
        }
    }
    Ok(sets)
}
