//! The tier ladder: pure decision functions over a confidence record and the
//! policies in force. No store access, no clocks; callers pass `now` in.

use chrono::{DateTime, Utc};
use latitude_config::EngineTuning;
use latitude_core::{
    CeilingPolicy, ConfidenceRecord, OverridePolicy, Signal, SignalKind, Tier,
};
use serde::Serialize;

/// A decided tier change, not yet applied or recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: Tier,
    pub to: Tier,
    pub reason: &'static str,
}

/// Every promotion precondition, evaluated independently so callers can
/// report *why* a subject is held back, not just that it is.
#[derive(Debug, Clone, Copy)]
pub struct PromotionCheck {
    /// The tier one step up. Promotion never skips.
    pub target: Tier,
    pub score_ok: bool,
    /// Lifetime signals ≥ the target's minimum plus any post-demotion surcharge.
    pub evidence_ok: bool,
    pub tenure_ok: bool,
    pub cooldown_ok: bool,
    /// The sticky `never_promote` lock is not set.
    pub lock_ok: bool,
    pub rejection_ok: bool,
    /// The org ceiling admits the target and allows auto-promotion.
    pub policy_ok: bool,
    /// No override pin is in force.
    pub override_ok: bool,
}

impl PromotionCheck {
    pub fn passes(&self) -> bool {
        self.score_ok && self.eligible_except_score()
    }

    /// Everything but the score threshold. Drives `promotion_eligible`,
    /// which dashboards use to show "close to promotion".
    pub fn eligible_except_score(&self) -> bool {
        self.evidence_ok
            && self.tenure_ok
            && self.cooldown_ok
            && self.lock_ok
            && self.rejection_ok
            && self.policy_ok
            && self.override_ok
    }
}

/// Evaluate the promotion preconditions for the next tier up.
/// Returns `None` when the subject is already at the top.
pub fn check_promotion(
    record: &ConfidenceRecord,
    ceiling: &CeilingPolicy,
    override_policy: Option<OverridePolicy>,
    now: DateTime<Utc>,
    tuning: &EngineTuning,
) -> Option<PromotionCheck> {
    let target = record.tier.next()?;

    let score_ok = record
        .score
        .is_some_and(|s| s >= tuning.promote_score(target));
    let required = tuning.min_signals(target) + u64::from(record.extra_required_signals);
    let evidence_ok = record.total_signals >= required;
    let tenure_ok = record.days_active >= tuning.min_days_active(target);
    let cooldown_ok = !record.in_cooldown(now);
    let lock_ok = !record.never_promote;
    // No rejections observed yet is not a strike against promotion.
    let rejection_ok = record
        .rejection_rate
        .is_none_or(|r| r <= tuning.max_rejection_for_promotion);
    let policy_ok = ceiling.max_ceiling.allows(target) && ceiling.auto_promotion_eligible;
    let override_ok = override_policy.and_then(|p| p.pinned_tier()).is_none();

    Some(PromotionCheck {
        target,
        score_ok,
        evidence_ok,
        tenure_ok,
        cooldown_ok,
        lock_ok,
        rejection_ok,
        policy_ok,
        override_ok,
    })
}

/// The promotion decision: one step up when every precondition holds.
pub fn evaluate_promotion(
    record: &ConfidenceRecord,
    ceiling: &CeilingPolicy,
    override_policy: Option<OverridePolicy>,
    now: DateTime<Utc>,
    tuning: &EngineTuning,
) -> Option<Transition> {
    let check = check_promotion(record, ceiling, override_policy, now, tuning)?;
    if !check.passes() {
        return None;
    }
    Some(Transition {
        from: record.tier,
        to: check.target,
        reason: "score_and_evidence_thresholds_met",
    })
}

/// The fast demotion decision, run inline with every ingested signal.
///
/// `recent` is the kinds of the most recent signals, newest first, already
/// including the one just ingested. An undo of a fully-automated action is a
/// hard signal and drops the subject straight to `disabled`; a rejection
/// streak over the trailing window drops it one step.
pub fn evaluate_demotion(
    record: &ConfidenceRecord,
    signal: &Signal,
    recent: &[SignalKind],
    tuning: &EngineTuning,
) -> Option<Transition> {
    if record.tier == Tier::Disabled {
        return None;
    }

    if signal.kind == SignalKind::Undone && signal.tier_at_time == Tier::Auto {
        return Some(Transition {
            from: record.tier,
            to: Tier::Disabled,
            reason: "undo_at_auto_tier",
        });
    }

    // The rejection-rate trip needs a full window of evidence.
    if recent.len() >= tuning.demotion_window {
        let window = &recent[..tuning.demotion_window];
        let rejected = window.iter().filter(|k| **k == SignalKind::Rejected).count();
        let rate = rejected as f64 / window.len() as f64;
        if rate > tuning.demotion_rejection_threshold {
            return Some(Transition {
                from: record.tier,
                to: record.tier.step_down(),
                reason: "rejection_rate_exceeded_threshold",
            });
        }
    }

    None
}

/// The tier callers actually see: the override pin (if any) clamped by the
/// org ceiling. The stored record keeps the earned tier untouched.
pub fn effective_tier(
    computed: Tier,
    ceiling: Option<&CeilingPolicy>,
    override_policy: Option<OverridePolicy>,
) -> Tier {
    let base = override_policy
        .and_then(|p| p.pinned_tier())
        .unwrap_or(computed);
    match ceiling {
        Some(c) => c.max_ceiling.clamp(base),
        None => base,
    }
}
