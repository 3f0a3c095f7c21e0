use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use latitude_config::EngineTuning;
use latitude_core::{
    CeilingPolicy, ConfidenceRecord, EventType, LatitudeError, Nudge, Result, Signal, SignalKind,
    Subject, Tier, TierEvent,
};
use latitude_store::{BurnSummary, EngineStore};

use crate::ladder::{self, Transition};
use crate::scorer;

/// A signal as delivered by the action-executor. Delivery is at-least-once;
/// the producer-supplied `id` is what makes redelivery idempotent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingSignal {
    pub id: Uuid,
    pub org_id: String,
    pub user_id: String,
    pub action_type: String,
    pub kind: SignalKind,
    /// When the outcome happened. Defaults to ingestion time.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// What ingestion did with a signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub signal_id: Uuid,
    /// True when this id had already been recorded; nothing changed.
    pub duplicate: bool,
    /// The subject's effective tier after ingestion.
    pub tier: Tier,
    pub demoted: bool,
}

/// Result of a windowed rescore for one subject.
#[derive(Debug, Clone)]
pub struct RecomputeOutcome {
    pub record: ConfidenceRecord,
    pub promoted: Option<Transition>,
}

/// A confidence record together with the tier callers actually see once the
/// org ceiling and any override are applied.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectView {
    #[serde(flatten)]
    pub record: ConfidenceRecord,
    pub effective_tier: Tier,
}

/// The autonomy confidence engine.
///
/// All record mutation is serialized per subject through a keyed lock;
/// different subjects proceed fully in parallel. Cloning is cheap: clones
/// share the store, tuning, and lock registry.
#[derive(Clone)]
pub struct ConfidenceEngine {
    store: Arc<EngineStore>,
    tuning: Arc<EngineTuning>,
    locks: Arc<DashMap<Subject, Arc<Mutex<()>>>>,
    rescore_tx: Option<mpsc::Sender<Subject>>,
}

impl ConfidenceEngine {
    pub fn new(store: Arc<EngineStore>, tuning: EngineTuning) -> Self {
        Self {
            store,
            tuning: Arc::new(tuning),
            locks: Arc::new(DashMap::new()),
            rescore_tx: None,
        }
    }

    /// Wire the sweep service's rescore queue. Ingestion pushes touched
    /// subjects here; a full queue defers them to the next scheduled sweep.
    pub fn with_rescore_queue(mut self, tx: mpsc::Sender<Subject>) -> Self {
        self.rescore_tx = Some(tx);
        self
    }

    pub fn store(&self) -> &Arc<EngineStore> {
        &self.store
    }

    pub fn tuning(&self) -> &EngineTuning {
        &self.tuning
    }

    pub(crate) fn subject_lock(&self, subject: &Subject) -> Arc<Mutex<()>> {
        self.locks
            .entry(subject.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    // ── Signal ingestion (hot path) ────────────────────────────

    /// Record a behavioral outcome. Appends the signal, bumps counters, and
    /// runs the fast demotion check, all inside the subject's serialized
    /// unit. Never blocks on the windowed rescore; that is queued.
    pub async fn record_signal(&self, incoming: IncomingSignal) -> Result<IngestOutcome> {
        validate_incoming(&incoming)?;
        let subject = Subject::new(
            incoming.org_id.trim(),
            incoming.user_id.trim(),
            incoming.action_type.trim(),
        );
        let now = Utc::now();

        let lock = self.subject_lock(&subject);
        let _guard = lock.lock().await;

        let ceiling = self.store.get_ceiling(&subject.org_id, &subject.action_type)?;
        let override_policy = self.store.get_override(&subject)?;
        let mut record = self
            .store
            .get_record(&subject)?
            .unwrap_or_else(|| ConfidenceRecord::new(subject.clone()));

        // Attribute the outcome to the policy that authorized the action.
        let tier_at_time =
            ladder::effective_tier(record.tier, ceiling.as_ref(), override_policy);

        let signal = Signal {
            id: incoming.id,
            subject: subject.clone(),
            kind: incoming.kind,
            tier_at_time,
            occurred_at: incoming.occurred_at.unwrap_or(now),
            recorded_at: now,
        };

        if !self.store.insert_signal(&signal)? {
            debug!(signal_id = %signal.id, subject = %subject, "duplicate signal ignored");
            return Ok(IngestOutcome {
                signal_id: signal.id,
                duplicate: true,
                tier: tier_at_time,
                demoted: false,
            });
        }

        // Counter-only fields update on every signal.
        record.total_signals += 1;
        match signal.kind {
            SignalKind::Approved | SignalKind::ApprovedEdited => record.total_approved += 1,
            SignalKind::Rejected => record.total_rejected += 1,
            SignalKind::Undone => record.total_undone += 1,
            SignalKind::AutoExecuted | SignalKind::Expired => {}
        }
        record.first_signal_at =
            Some(record.first_signal_at.map_or(signal.occurred_at, |t| t.min(signal.occurred_at)));
        record.last_signal_at =
            Some(record.last_signal_at.map_or(signal.occurred_at, |t| t.max(signal.occurred_at)));
        record.days_active = self.store.distinct_active_days(&subject)?;

        let lifetime = self.store.lifetime_counts(&subject)?;
        let rates = scorer::rates(&lifetime);
        record.approval_rate = rates.approval_rate;
        record.clean_approval_rate = rates.clean_approval_rate;
        record.edit_rate = rates.edit_rate;
        record.rejection_rate = rates.rejection_rate;
        record.undo_rate = rates.undo_rate;

        // Fast demotion check, inside the same serialized unit. An override
        // pin bypasses automatic transitions entirely.
        let mut demoted = false;
        if override_policy.and_then(|p| p.pinned_tier()).is_none() {
            let recent = self
                .store
                .recent_kinds(&subject, self.tuning.demotion_window)?;
            if let Some(transition) =
                ladder::evaluate_demotion(&record, &signal, &recent, &self.tuning)
            {
                self.apply_demotion(&mut record, &transition, now)?;
                demoted = true;
            }
        }

        self.store.upsert_record(&record)?;
        drop(_guard);

        if let Some(tx) = &self.rescore_tx {
            if tx.try_send(subject.clone()).is_err() {
                debug!(subject = %subject, "rescore queue full, deferring to next sweep");
            }
        }

        Ok(IngestOutcome {
            signal_id: signal.id,
            duplicate: false,
            tier: ladder::effective_tier(record.tier, ceiling.as_ref(), override_policy),
            demoted,
        })
    }

    fn apply_demotion(
        &self,
        record: &mut ConfidenceRecord,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> Result<()> {
        warn!(
            subject = %record.subject,
            from = %transition.from,
            to = %transition.to,
            reason = transition.reason,
            "demoting subject"
        );
        record.tier = transition.to;
        record.cooldown_until = Some(now + self.tuning.cooldown(transition.from));
        record.extra_required_signals += self.tuning.evidence_increment;
        record.promotion_eligible = false;

        self.store.append_event(&TierEvent::new(
            record.subject.clone(),
            EventType::Demotion,
            Some(transition.from),
            Some(transition.to),
            record.score,
            transition.reason,
        ))
    }

    // ── Rescoring and promotion ────────────────────────────────

    /// Recompute the windowed score for one subject and evaluate promotion.
    /// This is the scheduled path; it commits the subject as one unit and
    /// returns `None` for subjects that have never produced a signal.
    pub async fn recompute(&self, subject: &Subject) -> Result<Option<RecomputeOutcome>> {
        let lock = self.subject_lock(subject);
        let _guard = lock.lock().await;

        let Some(mut record) = self.store.get_record(subject)? else {
            return Ok(None);
        };
        let now = Utc::now();

        let window_start = now - Duration::days(self.tuning.window_days);
        let windowed = self.store.window_counts(subject, window_start)?;
        record.last_30_score = scorer::windowed_score(&windowed, &self.tuning);
        record.score = scorer::blend(record.score, record.last_30_score, self.tuning.ewma_alpha);

        let lifetime = self.store.lifetime_counts(subject)?;
        let rates = scorer::rates(&lifetime);
        record.approval_rate = rates.approval_rate;
        record.clean_approval_rate = rates.clean_approval_rate;
        record.edit_rate = rates.edit_rate;
        record.rejection_rate = rates.rejection_rate;
        record.undo_rate = rates.undo_rate;
        record.days_active = self.store.distinct_active_days(subject)?;
        record.last_scored_at = Some(now);

        let ceiling = self
            .store
            .get_ceiling(&subject.org_id, &subject.action_type)?
            .unwrap_or_else(CeilingPolicy::permissive);
        let override_policy = self.store.get_override(subject)?;

        let mut promoted = None;
        if let Some(transition) =
            ladder::evaluate_promotion(&record, &ceiling, override_policy, now, &self.tuning)
        {
            // Two-phase record: the proposal is written even though default
            // policy auto-accepts, so a human gate can sit between the two.
            self.store.append_event(&TierEvent::new(
                subject.clone(),
                EventType::PromotionProposed,
                Some(transition.from),
                Some(transition.to),
                record.score,
                transition.reason,
            ))?;

            record.tier = transition.to;
            record.extra_required_signals = 0;

            let accepted = TierEvent::new(
                subject.clone(),
                EventType::PromotionAccepted,
                Some(transition.from),
                Some(transition.to),
                record.score,
                transition.reason,
            );
            self.store.append_event(&accepted)?;
            self.store.enqueue_nudge(&Nudge {
                id: Uuid::new_v4(),
                org_id: subject.org_id.clone(),
                user_id: subject.user_id.clone(),
                action_type: subject.action_type.clone(),
                tier: transition.to,
                event_id: accepted.id,
                created_at: now,
            })?;

            info!(
                subject = %subject,
                from = %transition.from,
                to = %transition.to,
                score = ?record.score,
                "promoted subject"
            );
            promoted = Some(transition);
        }

        // Derived after any promotion applies, so it reflects the next rung.
        record.promotion_eligible =
            ladder::check_promotion(&record, &ceiling, override_policy, now, &self.tuning)
                .is_some_and(|c| c.eligible_except_score());

        self.store.upsert_record(&record)?;
        Ok(Some(RecomputeOutcome { record, promoted }))
    }

    /// Admin-issued demotion: one step down, same cooldown and evidence
    /// surcharge as a rate-triggered drop.
    pub async fn demote(&self, subject: &Subject) -> Result<ConfidenceRecord> {
        let lock = self.subject_lock(subject);
        let _guard = lock.lock().await;

        let mut record = self
            .store
            .get_record(subject)?
            .ok_or_else(|| LatitudeError::NotFound(format!("no record for {subject}")))?;
        if record.tier == Tier::Disabled {
            return Err(LatitudeError::PolicyViolation(format!(
                "{subject} is already disabled"
            )));
        }

        let transition = Transition {
            from: record.tier,
            to: record.tier.step_down(),
            reason: "manual_demotion",
        };
        self.apply_demotion(&mut record, &transition, Utc::now())?;
        self.store.upsert_record(&record)?;
        Ok(record)
    }

    /// Rebuild a record's derived fields by replaying the signal log.
    /// The recovery path for a corrupted record: the earned tier and the
    /// sticky fields (`cooldown_until`, `never_promote`,
    /// `extra_required_signals`) are preserved, since tier changes only through
    /// recorded events.
    pub async fn rebuild_record(&self, subject: &Subject) -> Result<ConfidenceRecord> {
        let lock = self.subject_lock(subject);
        let _guard = lock.lock().await;

        let existing = self.store.get_record(subject)?;
        let signals = self.store.signals_for_subject(subject)?;
        if existing.is_none() && signals.is_empty() {
            return Err(LatitudeError::NotFound(format!("no signals for {subject}")));
        }

        let now = Utc::now();
        let window_start = now - Duration::days(self.tuning.window_days);
        let mut record = ConfidenceRecord::new(subject.clone());
        if let Some(prev) = &existing {
            record.tier = prev.tier;
            record.cooldown_until = prev.cooldown_until;
            record.never_promote = prev.never_promote;
            record.extra_required_signals = prev.extra_required_signals;
        }

        let mut lifetime = latitude_core::SignalCounts::default();
        let mut windowed = latitude_core::SignalCounts::default();
        let mut days = std::collections::BTreeSet::new();
        for signal in &signals {
            lifetime.add(signal.kind);
            if signal.occurred_at >= window_start {
                windowed.add(signal.kind);
            }
            days.insert(signal.occurred_at.date_naive());
            record.first_signal_at =
                Some(record.first_signal_at.map_or(signal.occurred_at, |t| t.min(signal.occurred_at)));
            record.last_signal_at =
                Some(record.last_signal_at.map_or(signal.occurred_at, |t| t.max(signal.occurred_at)));
        }

        record.total_signals = lifetime.total();
        record.total_approved = lifetime.approved + lifetime.approved_edited;
        record.total_rejected = lifetime.rejected;
        record.total_undone = lifetime.undone;
        record.days_active = days.len() as u32;

        let rates = scorer::rates(&lifetime);
        record.approval_rate = rates.approval_rate;
        record.clean_approval_rate = rates.clean_approval_rate;
        record.edit_rate = rates.edit_rate;
        record.rejection_rate = rates.rejection_rate;
        record.undo_rate = rates.undo_rate;
        record.last_30_score = scorer::windowed_score(&windowed, &self.tuning);
        // The EWMA history is not recoverable from the log alone; restart
        // the blend from the windowed score.
        record.score = record.last_30_score;
        record.last_scored_at = Some(now);

        self.store.upsert_record(&record)?;
        info!(subject = %subject, signals = signals.len(), "rebuilt record from signal log");
        Ok(record)
    }

    // ── Read queries ───────────────────────────────────────────

    /// One subject's record plus its effective tier. Last-known data; the
    /// record carries `last_scored_at` so callers can show staleness.
    pub fn subject_view(&self, subject: &Subject) -> Result<Option<SubjectView>> {
        let Some(record) = self.store.get_record(subject)? else {
            return Ok(None);
        };
        let ceiling = self.store.get_ceiling(&subject.org_id, &subject.action_type)?;
        let override_policy = self.store.get_override(subject)?;
        let effective_tier =
            ladder::effective_tier(record.tier, ceiling.as_ref(), override_policy);
        Ok(Some(SubjectView {
            record,
            effective_tier,
        }))
    }

    /// The org-wide subject × action grid.
    pub fn org_matrix(&self, org_id: &str) -> Result<Vec<SubjectView>> {
        let records = self.store.org_records(org_id)?;
        let mut ceilings: HashMap<String, Option<CeilingPolicy>> = HashMap::new();

        let mut views = Vec::with_capacity(records.len());
        for record in records {
            let ceiling = match ceilings.get(&record.subject.action_type) {
                Some(c) => c.clone(),
                None => {
                    let c = self.store.get_ceiling(org_id, &record.subject.action_type)?;
                    ceilings.insert(record.subject.action_type.clone(), c.clone());
                    c
                }
            };
            let override_policy = self.store.get_override(&record.subject)?;
            let effective_tier =
                ladder::effective_tier(record.tier, ceiling.as_ref(), override_policy);
            views.push(SubjectView {
                record,
                effective_tier,
            });
        }
        Ok(views)
    }

    pub fn events(&self, subject: &Subject, limit: usize) -> Result<Vec<TierEvent>> {
        self.store.events_for_subject(subject, limit)
    }

    pub fn burn(&self, org_id: &str, window_days: i64) -> Result<BurnSummary> {
        self.store.signal_burn(org_id, window_days)
    }

    /// Claim the oldest pending nudge for a user; at most once per milestone.
    pub fn pull_nudge(&self, user_id: &str) -> Result<Option<Nudge>> {
        self.store.pull_nudge(user_id)
    }
}

fn validate_incoming(incoming: &IncomingSignal) -> Result<()> {
    for (field, value) in [
        ("org_id", &incoming.org_id),
        ("user_id", &incoming.user_id),
        ("action_type", &incoming.action_type),
    ] {
        if value.trim().is_empty() {
            return Err(LatitudeError::Validation(format!("{field} must not be empty")));
        }
    }
    Ok(())
}
