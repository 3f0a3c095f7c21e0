use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signal::Subject;
use crate::tier::Tier;

/// Rolling trust state for one (org, user, action_type) subject.
///
/// `tier` is the organically-earned tier and changes only through a recorded
/// [`crate::TierEvent`]. Ceilings and overrides clamp the *effective* tier on
/// read; they never rewrite this record, so lifting them reveals the earned
/// tier again without re-accumulating evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceRecord {
    #[serde(flatten)]
    pub subject: Subject,
    pub tier: Tier,
    /// Long-run composite confidence in [0, 1]. Null until signals exist.
    pub score: Option<f64>,
    pub approval_rate: Option<f64>,
    pub clean_approval_rate: Option<f64>,
    pub edit_rate: Option<f64>,
    pub rejection_rate: Option<f64>,
    pub undo_rate: Option<f64>,
    pub total_signals: u64,
    pub total_approved: u64,
    pub total_rejected: u64,
    pub total_undone: u64,
    /// Composite score over the trailing signal window only.
    pub last_30_score: Option<f64>,
    /// Distinct UTC calendar days with at least one signal.
    pub days_active: u32,
    /// True when every promotion precondition except the score threshold holds.
    pub promotion_eligible: bool,
    /// Promotion is blocked while `now < cooldown_until`.
    pub cooldown_until: Option<DateTime<Utc>>,
    /// Sticky manual lock, cleared only by explicit admin action.
    pub never_promote: bool,
    /// Additional evidence demanded after a demotion before re-promotion.
    pub extra_required_signals: u32,
    pub first_signal_at: Option<DateTime<Utc>>,
    pub last_signal_at: Option<DateTime<Utc>>,
    /// When the windowed scorer last ran. Dashboards use this for staleness.
    pub last_scored_at: Option<DateTime<Utc>>,
}

impl ConfidenceRecord {
    /// Zero state: a subject with no signals is always `disabled` with no score.
    pub fn new(subject: Subject) -> Self {
        Self {
            subject,
            tier: Tier::Disabled,
            score: None,
            approval_rate: None,
            clean_approval_rate: None,
            edit_rate: None,
            rejection_rate: None,
            undo_rate: None,
            total_signals: 0,
            total_approved: 0,
            total_rejected: 0,
            total_undone: 0,
            last_30_score: None,
            days_active: 0,
            promotion_eligible: false,
            cooldown_until: None,
            never_promote: false,
            extra_required_signals: 0,
            first_signal_at: None,
            last_signal_at: None,
            last_scored_at: None,
        }
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }
}
