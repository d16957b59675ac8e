//! Agreement between the rotation matcher and the brute-force reference.
//!
//! The brute-force result is the truth. [`confusion`] classifies each occultation by
//! whether it has at least one collocation in each result; [`PairAgreement`] lists the
//! individual `(occid, footprint)` pairs found by only one of them.
use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    collocation::CollocationSet, constants::OccId, occultation::Occultation,
    scan_geometry::FootprintId,
};

/// Occultation-level confusion matrix of a prediction against a reference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Collocated in both results.
    pub true_positive: usize,
    /// Collocated in neither.
    pub true_negative: usize,
    /// Collocated only in the prediction.
    pub false_positive: usize,
    /// Collocated only in the reference.
    pub false_negative: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.true_positive + self.true_negative + self.false_positive + self.false_negative
    }

    /// True when the prediction agrees with the reference on every occultation.
    pub fn is_perfect(&self) -> bool {
        self.false_positive == 0 && self.false_negative == 0
    }
}

/// Compare the rotation result with the brute-force reference, per occultation.
///
/// Every element of `occultations` is counted once. Results are keyed by occultation
/// identifier, so two elements sharing an identifier always fall in the same cell.
///
/// Arguments
/// -----------------
/// * `occultations`: every occultation given to both matchers.
/// * `brute_force`: the reference result.
/// * `rotation`: the result under test.
///
/// Return
/// ----------
/// * The confusion matrix; its [`ConfusionMatrix::total`] is `occultations.len()`.
pub fn confusion(
    occultations: &[Occultation],
    brute_force: &CollocationSet,
    rotation: &CollocationSet,
) -> ConfusionMatrix {
    let reference = brute_force.occultation_ids();
    let predicted = rotation.occultation_ids();

    let cells = occultations
        .iter()
        .map(|occ| {
            let occid = occ.occid.as_str();
            (reference.contains(occid), predicted.contains(occid))
        })
        .counts();
    let cell = |found: (bool, bool)| cells.get(&found).copied().unwrap_or(0);

    ConfusionMatrix {
        true_positive: cell((true, true)),
        true_negative: cell((false, false)),
        false_positive: cell((false, true)),
        false_negative: cell((true, false)),
    }
}

/// Pair-level comparison of two collocation sets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairAgreement {
    /// Number of pairs present in both sets.
    pub common: usize,
    /// Pairs missed by the rotation matcher, in brute-force order.
    pub only_brute_force: Vec<(OccId, FootprintId)>,
    /// Pairs found only by the rotation matcher, in rotation order.
    pub only_rotation: Vec<(OccId, FootprintId)>,
}

impl PairAgreement {
    pub fn new(brute_force: &CollocationSet, rotation: &CollocationSet) -> Self {
        let reference: HashSet<_> = brute_force.pairs().into_iter().collect();
        let predicted = rotation.pairs();
        let predicted_keys: HashSet<_> = predicted.iter().cloned().collect();

        let (common, only_rotation): (Vec<_>, Vec<_>) =
            predicted.into_iter().partition(|key| reference.contains(key));
        let only_brute_force = brute_force
            .pairs()
            .into_iter()
            .filter(|key| !predicted_keys.contains(key))
            .collect();

        PairAgreement {
            common: common.len(),
            only_brute_force,
            only_rotation,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.only_brute_force.is_empty() && self.only_rotation.is_empty()
    }
}
