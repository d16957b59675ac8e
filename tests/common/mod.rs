#![allow(dead_code)]

use hifitime::Epoch;
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rotcol::{
    constants::EARTH_MEAN_RADIUS,
    geodesy::lat_lon,
    instruments::{Instrument, InstrumentConfig, ScanParameters},
    occultation::Occultation,
    orbit::{KeplerianElements, OrbitModel, OrbitProvider, OrbitState, RefFrame},
    rotcol_errors::RotcolError,
    time::{parse_utc, seconds_between, shift},
};

pub const START: &str = "2023-06-05T00:00:00";

pub fn start() -> Epoch {
    parse_utc(START).unwrap()
}

/// JPSS-1 like sun-synchronous orbit, 824 km, 98.7°.
pub fn jpss1_model() -> OrbitModel {
    let mut model = OrbitModel::new();
    model.insert(
        "JPSS-1",
        KeplerianElements::circular(start(), 824.0, 98.7, 120.0, 0.0),
    );
    model
}

/// Metop-B like orbit, 817 km, 98.7°, on a different plane.
pub fn metop_model() -> OrbitModel {
    let mut model = OrbitModel::new();
    model.insert(
        "Metop-B",
        KeplerianElements::circular(start(), 817.0, 98.7, 300.0, 45.0),
    );
    model
}

pub fn config(instrument: Instrument, satellite: &str) -> InstrumentConfig {
    InstrumentConfig::new(instrument, satellite, start()).unwrap()
}

/// Random occultations over `[start, start + span]`.
///
/// Half of them are drawn near the ground track of `satellite` (within about 15° and
/// 15 min of the satellite) so that every tolerance yields collocations; the other
/// half are uniform over the globe.
pub fn random_catalog(
    seed: u64,
    count: usize,
    span: f64,
    model: &OrbitModel,
    satellite: &str,
) -> Vec<Occultation> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let t = shift(start(), rng.random_range(0.0..span));
            let (lat, lon) = if i % 2 == 0 {
                let state = model.position_at(satellite, t).unwrap();
                let (lat, lon) = lat_lon(&state.position);
                let lat = (lat + rng.random_range(-15.0..15.0)).clamp(-89.0, 89.0);
                (lat, lon + rng.random_range(-15.0..15.0))
            } else {
                (
                    rng.random::<f64>().mul_add(2.0, -1.0).asin().to_degrees(),
                    rng.random_range(-180.0..180.0),
                )
            };
            let time = if i % 2 == 0 {
                shift(t, rng.random_range(-900.0..900.0))
            } else {
                t
            };
            let transmitter = format!("G{:02}", rng.random_range(1..33));
            Occultation::new(
                &format!("occ-{i:04}"),
                time,
                lat,
                lon,
                "cosmic2",
                "cosmic2e1",
                &transmitter,
            )
            .with_file_types(["ucar_refractivityRetrieval"])
        })
        .collect()
}

/// Satellite flying north along the Greenwich meridian, fixed in the Earth frame.
///
/// The sub-satellite point is at latitude `offset` (meters along the meridian) at
/// `anchor`.
pub struct MeridianOrbit {
    pub anchor: Epoch,
    pub offset: f64,
    pub altitude_km: f64,
    pub angular_rate: f64,
}

impl OrbitProvider for MeridianOrbit {
    fn position_at(&self, satellite: &str, time: Epoch) -> Result<OrbitState, RotcolError> {
        let phi = self.offset / EARTH_MEAN_RADIUS
            + self.angular_rate * seconds_between(time, self.anchor);
        let r = EARTH_MEAN_RADIUS / 1000.0 + self.altitude_km;
        Ok(OrbitState {
            satellite: satellite.to_string(),
            epoch: time,
            position: r * Vector3::new(phi.cos(), 0.0, phi.sin()),
            velocity: r * self.angular_rate * Vector3::new(-phi.sin(), 0.0, phi.cos()),
            frame: RefFrame::Ecef,
        })
    }
}

/// A nadir-only scanner: one footprint per scan line.
pub fn nadir_scanner(satellite: &str, scan_epoch: Epoch, scan_period: f64) -> InstrumentConfig {
    InstrumentConfig::new(Instrument::Atms, satellite, scan_epoch)
        .unwrap()
        .with_scan_parameters(ScanParameters {
            scan_period,
            footprints_per_scan: 1,
            footprint_spacing: 1.0,
            max_scan_angle: 10.0,
        })
        .unwrap()
}
