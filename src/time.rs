//! # Time helpers
//!
//! UTC parsing/formatting on top of [`hifitime::Epoch`], the [`TimeRange`] interval used
//! by every query of the crate, and the Greenwich Mean Sidereal Time needed to rotate
//! inertial orbit states into the Earth-fixed frame.
//!
//! UT1 is approximated by UTC when computing GMST: the |UT1 − UTC| < 0.9 s difference
//! moves a ground point by less than 500 m, far below any collocation tolerance.
use hifitime::{Duration, Epoch};
use std::str::FromStr;

use crate::{
    constants::{Second, DPI, T2000},
    rotcol_errors::RotcolError,
};

/// Parse an ISO-8601 UTC date-time such as `2023-06-05T00:00:00` or `2023-06-05T00:00:00Z`.
///
/// Arguments
/// -----------------
/// * `date`: the date-time string, interpreted in the UTC time scale.
///
/// Return
/// ----------
/// * The corresponding [`Epoch`], or [`RotcolError::InvalidTimeFormat`].
pub fn parse_utc(date: &str) -> Result<Epoch, RotcolError> {
    let trimmed = date.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    Epoch::from_str(trimmed).map_err(|e| RotcolError::InvalidTimeFormat(format!("{date}: {e}")))
}

/// Format an epoch as `YYYY-MM-DDTHH:MM:SSZ` (UTC, whole seconds).
pub fn format_utc(epoch: &Epoch) -> String {
    let (y, m, d, hh, mm, ss, _) = epoch.to_gregorian_utc();
    format!("{y:04}-{m:02}-{d:02}T{hh:02}:{mm:02}:{ss:02}Z")
}

/// Signed number of seconds from `reference` to `epoch` (`epoch − reference`).
#[inline]
pub fn seconds_between(epoch: Epoch, reference: Epoch) -> Second {
    (epoch - reference).to_seconds()
}

/// Shift an epoch by a (possibly negative) number of seconds.
#[inline]
pub fn shift(epoch: Epoch, seconds: Second) -> Epoch {
    epoch + Duration::from_seconds(seconds)
}

/// A closed UTC time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: Epoch,
    pub end: Epoch,
}

impl TimeRange {
    /// Build a time range, rejecting intervals whose end precedes their start.
    pub fn new(start: Epoch, end: Epoch) -> Result<Self, RotcolError> {
        if end < start {
            return Err(RotcolError::InvalidConfiguration(format!(
                "time range ends ({}) before it starts ({})",
                format_utc(&end),
                format_utc(&start)
            )));
        }
        Ok(TimeRange { start, end })
    }

    /// Build a time range from two ISO-8601 UTC strings.
    pub fn from_iso(start: &str, end: &str) -> Result<Self, RotcolError> {
        TimeRange::new(parse_utc(start)?, parse_utc(end)?)
    }

    /// Range of half-width `half_width` seconds centered on `center`.
    pub fn around(center: Epoch, half_width: Second) -> Self {
        let half_width = half_width.abs();
        TimeRange {
            start: shift(center, -half_width),
            end: shift(center, half_width),
        }
    }

    pub fn contains(&self, epoch: Epoch) -> bool {
        self.start <= epoch && epoch <= self.end
    }

    /// Length of the interval in seconds.
    pub fn duration(&self) -> Second {
        seconds_between(self.end, self.start)
    }

    /// Widen the interval by `margin` seconds on both sides.
    pub fn expanded(&self, margin: Second) -> Self {
        TimeRange {
            start: shift(self.start, -margin),
            end: shift(self.end, margin),
        }
    }
}

/// Compute the Greenwich Mean Sidereal Time (GMST) in radians
/// for a given Modified Julian Date (UT1 time scale).
///
/// This function implements the IAU 1982/2000 polynomial formula
/// for the mean sidereal time at 0h UT1, plus the fractional-day
/// correction term due to Earth's rotation rate.
///
/// # Arguments
/// * `tjm` - Modified Julian Date (MJD, UT1 time scale)
///
/// # Returns
/// * GMST angle in radians, normalized to the interval [0, 2π).
///
/// # References
/// * IAU 1982, IERS Conventions 1996/2000.
/// * Explanatory Supplement to the Astronomical Almanac (1992).
pub fn gmst(tjm: f64) -> f64 {
    // Polynomial coefficients for GMST at 0h UT1 (in seconds)
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    // Ratio of sidereal day to solar day
    const RAP: f64 = 1.00273790934;

    let itjm = tjm.floor();
    let t = (itjm - T2000) / 36525.0;

    let mut gmst0 = ((C3 * t + C2) * t + C1) * t + C0;
    gmst0 *= DPI / 86400.0;

    let h = tjm.fract() * DPI;
    let mut gmst = gmst0 + h * RAP;

    let mut i: i64 = (gmst / DPI).floor() as i64;
    if gmst < 0.0 {
        i -= 1;
    }
    gmst -= i as f64 * DPI;

    gmst
}

/// GMST (radians) at a UTC epoch, with UT1 ≈ UTC.
pub fn gmst_at(epoch: &Epoch) -> f64 {
    gmst(epoch.to_mjd_utc_days())
}

#[cfg(test)]
mod time_test {
    use super::*;

    #[test]
    fn test_gmst() {
        let tut = 57028.478514610404;
        let res_gmst = gmst(tut);
        assert_eq!(res_gmst, 4.851925725092499);

        let tut = T2000;
        let res_gmst = gmst(tut);
        assert_eq!(res_gmst, 4.894961212789145);
    }

    #[test]
    fn test_parse_and_format_utc() {
        let epoch = parse_utc("2023-06-05T12:30:15Z").unwrap();
        assert_eq!(format_utc(&epoch), "2023-06-05T12:30:15Z");

        let same = parse_utc("2023-06-05T12:30:15").unwrap();
        assert_eq!(epoch, same);

        assert!(matches!(
            parse_utc("not a date"),
            Err(RotcolError::InvalidTimeFormat(_))
        ));
    }

    #[test]
    fn test_time_range() {
        let range = TimeRange::from_iso("2023-06-05T00:00:00", "2023-06-05T01:00:00").unwrap();
        assert_eq!(range.duration(), 3600.0);
        assert!(range.contains(parse_utc("2023-06-05T00:30:00").unwrap()));
        assert!(!range.contains(parse_utc("2023-06-05T01:00:01").unwrap()));

        let wide = range.expanded(60.0);
        assert_eq!(wide.duration(), 3720.0);

        assert!(TimeRange::from_iso("2023-06-05T01:00:00", "2023-06-05T00:00:00").is_err());
    }

    #[test]
    fn test_seconds_between() {
        let t0 = parse_utc("2023-06-05T00:00:00").unwrap();
        let t1 = shift(t0, 125.5);
        assert_eq!(seconds_between(t1, t0), 125.5);
        assert_eq!(seconds_between(t0, t1), -125.5);
    }
}
