use std::{env, path::PathBuf, time::Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rotcol::{
    collocation::{confusion, BruteForceMatcher, PairAgreement, RotationMatcher},
    config::{MatchConfig, RotcolConfig, SessionConfig},
    export::JsonFileSink,
    instruments::{Instrument, InstrumentConfig},
    occultation::{InMemoryCatalog, Occultation, OccultationQuery, OccultationSource},
    orbit::{KeplerianElements, OrbitModel, TleTextSource},
    rotcol_errors::RotcolError,
    scan_geometry::ScanGeometry,
    time::{parse_utc, shift, TimeRange},
};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Uniformly distributed occultations over `range`.
fn synthetic_catalog(range: &TimeRange, count: usize) -> InMemoryCatalog {
    let mut rng = StdRng::seed_from_u64(42);
    let occultations = (0..count)
        .map(|i| {
            Occultation::new(
                &format!("synthetic-{i:05}"),
                shift(range.start, rng.random_range(0.0..range.duration())),
                rng.random::<f64>().mul_add(2.0, -1.0).asin().to_degrees(),
                rng.random_range(-180.0..180.0),
                "cosmic2",
                &format!("cosmic2e{}", i % 6 + 1),
                &format!("G{:02}", rng.random_range(1..33)),
            )
        })
        .collect();
    InMemoryCatalog::new(occultations)
}

/// Run a collocation session.
///
/// Usage:
///   collocation_session [CONFIG.yaml CATALOG.csv]
///
/// Without arguments a synthetic JPSS-1 orbit and a random catalog are used. With a
/// configuration, TLEs are read from `{data_root}/tle/JPSS-1.tle`.
fn main() -> Result<(), RotcolError> {
    init_logging();
    let args: Vec<String> = env::args().skip(1).collect();
    let range = TimeRange::from_iso("2023-06-05T00:00:00", "2023-06-05T06:00:00")?;

    let (config, model, catalog) = match args.as_slice() {
        [config_path, catalog_path] => {
            let config = RotcolConfig::from_yaml_file(config_path)?;
            let source = TleTextSource::new(config.session.tle_directory());
            let model = OrbitModel::load(&source, &["JPSS-1"], &range)?;
            (config, model, InMemoryCatalog::from_csv_path(catalog_path)?)
        }
        _ => {
            let mut model = OrbitModel::new();
            model.insert(
                "JPSS-1",
                KeplerianElements::circular(range.start, 824.0, 98.7, 120.0, 0.0),
            );
            let mut config = RotcolConfig::new(SessionConfig::new(".", "."));
            config.matching = MatchConfig {
                time_tolerance: 600.0,
                spatial_tolerance: 150e3,
                ..MatchConfig::default()
            };
            (config, model, synthetic_catalog(&range, 2000))
        }
    };

    let occultations = catalog.query(&OccultationQuery::new().time_range(range))?;
    info!(count = occultations.len(), "occultations selected");

    let instrument = InstrumentConfig::new(Instrument::Atms, "JPSS-1", parse_utc("2023-06-05T00:00:00")?)?
        .with_margin_scans(config.matching.margin_scans);
    let geometry = ScanGeometry::new(&instrument, &model)?;
    let tolerances = config.matching.tolerances();

    let clock = Instant::now();
    let rotation = RotationMatcher::new(geometry, range)
        .with_sub_occultations(config.matching.sub_occultations)
        .with_parallel(config.matching.parallel)
        .find(&occultations, &tolerances);
    let rotation_time = clock.elapsed();

    let clock = Instant::now();
    let brute_force = BruteForceMatcher::for_geometry(&geometry)
        .with_parallel(config.matching.parallel)
        .find_in_interval(&geometry, &range, &occultations, &tolerances)?;
    let brute_force_time = clock.elapsed();

    let matrix = confusion(
        &occultations,
        &brute_force.collocations,
        &rotation.collocations,
    );
    let agreement = PairAgreement::new(&brute_force.collocations, &rotation.collocations);
    println!(
        "rotation: {} collocations in {:.2?} ({} skipped), brute force: {} in {:.2?}",
        rotation.collocations.len(),
        rotation_time,
        rotation.skipped.len(),
        brute_force.collocations.len(),
        brute_force_time
    );
    println!("{matrix:?}");
    println!(
        "pairs: {} common, {} missed, {} extra",
        agreement.common,
        agreement.only_brute_force.len(),
        agreement.only_rotation.len()
    );

    let output = PathBuf::from("collocations.json");
    rotation
        .collocations
        .nearest_per_occultation()
        .export(&JsonFileSink::new(&output), Some("collocation_session"))?;
    println!("written {}", output.display());
    Ok(())
}
