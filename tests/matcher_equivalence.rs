mod common;

use std::collections::HashSet;

use common::{config, jpss1_model, metop_model, random_catalog, start};
use rotcol::{
    collocation::{
        confusion, effective_sub_occultations, BruteForceMatcher, CollocationSet, PairAgreement,
        RotationMatcher, Tolerances,
    },
    instruments::Instrument,
    occultation::Occultation,
    scan_geometry::{collect_footprints, ScanGeometry},
    time::{shift, TimeRange},
};

const SPAN: f64 = 3600.0;

fn search_range() -> TimeRange {
    TimeRange::new(shift(start(), -1800.0), shift(start(), SPAN + 1800.0)).unwrap()
}

fn brute_force(geometry: &ScanGeometry<'_>, occs: &[Occultation], tol: &Tolerances) -> CollocationSet {
    BruteForceMatcher::for_geometry(geometry)
        .find_in_interval(geometry, &search_range(), occs, tol)
        .unwrap()
        .collocations
}

fn assert_same(occs: &[Occultation], brute: &CollocationSet, rotation: &CollocationSet) {
    let agreement = PairAgreement::new(brute, rotation);
    assert!(
        agreement.is_exact(),
        "missed {:?}, extra {:?}",
        agreement.only_brute_force,
        agreement.only_rotation
    );
    assert_eq!(brute.pairs(), rotation.pairs());

    let matrix = confusion(occs, brute, rotation);
    assert!(matrix.is_perfect());
    assert_eq!(matrix.total(), occs.len());
}

#[test]
fn test_rotation_matches_brute_force_atms() {
    let model = jpss1_model();
    let config = config(Instrument::Atms, "JPSS-1");
    let geometry = ScanGeometry::new(&config, &model).unwrap();
    let occs = random_catalog(0xC0FFEE, 40, SPAN, &model, "JPSS-1");

    for tol in [Tolerances::new(600.0, 150e3), Tolerances::new(300.0, 50e3)] {
        let brute = brute_force(&geometry, &occs, &tol);
        assert!(!brute.is_empty());

        for parallel in [true, false] {
            let outcome = RotationMatcher::new(geometry, search_range())
                .with_parallel(parallel)
                .find(&occs, &tol);
            assert!(outcome.skipped.is_empty());
            assert_same(&occs, &brute, &outcome.collocations);
            assert_eq!(outcome.collocations.algorithm(), RotationMatcher::ALGORITHM);
        }
    }
}

#[test]
fn test_rotation_matches_brute_force_amsua_long_window() {
    let model = metop_model();
    let config = config(Instrument::AmsuA, "Metop-B");
    let geometry = ScanGeometry::new(&config, &model).unwrap();
    let occs = random_catalog(0xBADF00D, 30, SPAN, &model, "Metop-B");

    // 45 min: more than one sub-occultation is mandatory
    let tol = Tolerances::new(2700.0, 300e3);
    assert!(effective_sub_occultations(1, tol.time) >= 2);

    let brute = brute_force(&geometry, &occs, &tol);
    assert!(!brute.is_empty());
    let outcome = RotationMatcher::new(geometry, search_range())
        .with_sub_occultations(1)
        .find(&occs, &tol);
    assert_same(&occs, &brute, &outcome.collocations);
}

#[test]
fn test_sub_occultation_count_does_not_change_result() {
    let model = jpss1_model();
    let config = config(Instrument::Atms, "JPSS-1");
    let geometry = ScanGeometry::new(&config, &model).unwrap();
    let occs = random_catalog(7, 20, SPAN, &model, "JPSS-1");
    let tol = Tolerances::new(600.0, 150e3);

    let reference = RotationMatcher::new(geometry, search_range())
        .with_sub_occultations(1)
        .find(&occs, &tol)
        .collocations;
    for k in [2, 5, 50] {
        let other = RotationMatcher::new(geometry, search_range())
            .with_sub_occultations(k)
            .find(&occs, &tol)
            .collocations;
        assert_eq!(reference.pairs(), other.pairs(), "k = {k}");
    }
}

#[test]
fn test_collocations_respect_tolerances_and_are_unique() {
    let model = jpss1_model();
    let config = config(Instrument::Atms, "JPSS-1");
    let geometry = ScanGeometry::new(&config, &model).unwrap();
    let occs = random_catalog(42, 30, SPAN, &model, "JPSS-1");
    let tol = Tolerances::new(600.0, 150e3);

    let first = RotationMatcher::new(geometry, search_range()).find(&occs, &tol);
    let set = &first.collocations;
    assert!(!set.is_empty());
    for c in set {
        assert!(c.distance <= tol.spatial);
        assert!(c.time_difference.abs() <= tol.time);
        assert!(c.payload.is_none());
    }
    let keys: HashSet<_> = set.pairs().into_iter().collect();
    assert_eq!(keys.len(), set.len());

    // grouped by occultation in input order, footprints ascending
    let order: Vec<usize> = set
        .iter()
        .map(|c| occs.iter().position(|o| o.occid == c.occultation.occid).unwrap())
        .collect();
    assert!(order.windows(2).all(|w| w[0] <= w[1]));
    assert!(set
        .iter()
        .zip(set.iter().skip(1))
        .filter(|(a, b)| a.occultation.occid == b.occultation.occid)
        .all(|(a, b)| a.footprint.id < b.footprint.id));

    // deterministic
    let second = RotationMatcher::new(geometry, search_range()).find(&occs, &tol);
    assert_eq!(first.collocations, second.collocations);
}

#[test]
fn test_larger_tolerances_keep_every_pair() {
    let model = jpss1_model();
    let config = config(Instrument::Atms, "JPSS-1");
    let geometry = ScanGeometry::new(&config, &model).unwrap();
    let occs = random_catalog(99, 30, SPAN, &model, "JPSS-1");

    let matcher = RotationMatcher::new(geometry, search_range());
    let small = matcher.find(&occs, &Tolerances::new(300.0, 75e3)).collocations;
    let large = matcher.find(&occs, &Tolerances::new(900.0, 200e3)).collocations;
    assert!(large.len() >= small.len());
    for c in &small {
        assert!(large.contains(&c.occultation.occid, c.footprint.id));
    }
    assert_eq!(small.intersection(&large).len(), small.len());
}

#[test]
fn test_brute_force_on_precomputed_footprints() {
    let model = jpss1_model();
    let config = config(Instrument::Atms, "JPSS-1");
    let geometry = ScanGeometry::new(&config, &model).unwrap();
    let occs = random_catalog(3, 10, SPAN, &model, "JPSS-1");
    let tol = Tolerances::new(600.0, 150e3);

    let footprints = collect_footprints(&geometry, &search_range()).unwrap();
    let direct = BruteForceMatcher::new("JPSS-1", Instrument::Atms).find(&occs, &footprints, &tol);
    assert_eq!(direct, brute_force(&geometry, &occs, &tol));

    // nearest refinement keeps one footprint per collocated occultation
    let nearest = direct.nearest_per_occultation();
    assert_eq!(nearest.len(), direct.occultation_ids().len());
    for c in &nearest {
        assert!(direct
            .iter()
            .filter(|d| d.occultation.occid == c.occultation.occid)
            .all(|d| d.distance >= c.distance));
    }
}
