//! Pure rate and score math over signal tallies. No store access: the
//! engine feeds in counts, this module returns numbers.

use latitude_config::EngineTuning;
use latitude_core::SignalCounts;
use serde::{Deserialize, Serialize};

/// The five behavioral rates, each `None` when its denominator has no data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    /// (approved + edited) / reviewed.
    pub approval_rate: Option<f64>,
    /// approved / reviewed; edits count against cleanliness.
    pub clean_approval_rate: Option<f64>,
    /// edited / (approved + edited).
    pub edit_rate: Option<f64>,
    /// rejected / reviewed.
    pub rejection_rate: Option<f64>,
    /// undone / executed.
    pub undo_rate: Option<f64>,
}

fn ratio(num: u64, den: u64) -> Option<f64> {
    if den == 0 {
        None
    } else {
        Some(num as f64 / den as f64)
    }
}

pub fn rates(counts: &SignalCounts) -> Rates {
    let reviewed = counts.reviewed();
    let accepted = counts.approved + counts.approved_edited;
    Rates {
        approval_rate: ratio(accepted, reviewed),
        clean_approval_rate: ratio(counts.approved, reviewed),
        edit_rate: ratio(counts.approved_edited, accepted),
        rejection_rate: ratio(counts.rejected, reviewed),
        undo_rate: ratio(counts.undone, counts.executed()),
    }
}

/// Weighted composite over a trailing window of signals.
///
/// A term whose denominator has no data is dropped and the remaining weights
/// renormalized, so absence of evidence is neutral rather than a penalty.
/// Returns `None` when no term has evidence at all.
pub fn windowed_score(counts: &SignalCounts, tuning: &EngineTuning) -> Option<f64> {
    let r = rates(counts);
    let mut sum = 0.0;
    let mut weight = 0.0;

    if let Some(clean) = r.clean_approval_rate {
        sum += tuning.clean_approval_weight * clean;
        weight += tuning.clean_approval_weight;
    }
    if let Some(rejection) = r.rejection_rate {
        sum += tuning.rejection_weight * (1.0 - rejection);
        weight += tuning.rejection_weight;
    }
    if let Some(undo) = r.undo_rate {
        sum += tuning.undo_weight * (1.0 - undo);
        weight += tuning.undo_weight;
    }

    if weight == 0.0 { None } else { Some(sum / weight) }
}

/// Exponentially-weighted blend of the windowed score into the long-run
/// score. A single bad day moves the score; only a sustained trend flips it.
pub fn blend(previous: Option<f64>, windowed: Option<f64>, alpha: f64) -> Option<f64> {
    match (previous, windowed) {
        (Some(prev), Some(now)) => Some(alpha * now + (1.0 - alpha) * prev),
        (None, now) => now,
        (prev, None) => prev,
    }
}
