//! Collocations between GNSS radio-occultation soundings and the footprints of
//! cross-track microwave sounders (ATMS, AMSU-A, MHS).
//!
//! Two matchers produce the same pairs: [`collocation::BruteForceMatcher`] compares every
//! occultation with every footprint, while [`collocation::RotationMatcher`] rotates each
//! occultation into the orbital frame of the satellite and only propagates the scan
//! lines that can see it.
pub mod collocation;
pub mod config;
pub mod constants;
pub mod export;
pub mod geodesy;
pub mod instruments;
mod kepler;
pub mod occultation;
pub mod orbit;
pub mod rotcol_errors;
pub mod scan_geometry;
pub mod time;

pub use collocation::{
    BruteForceMatcher, Collocation, CollocationSet, MatchOutcome, RotationMatcher, Tolerances,
};
pub use config::RotcolConfig;
pub use rotcol_errors::RotcolError;
