//! Admin-facing policy operations: org ceilings, per-user overrides, and the
//! sticky never-promote lock. All upserts are idempotent; policy events are
//! written only when the stored value actually changes.

use chrono::Utc;
use tracing::info;

use latitude_core::{
    Ceiling, CeilingPolicy, ConfidenceRecord, EventType, LatitudeError, OverridePolicy, Result,
    Subject, TierEvent,
};

use crate::engine::ConfidenceEngine;

impl ConfidenceEngine {
    /// Set the org-wide cap for an action type. Subjects above a newly
    /// lowered ceiling are clamped on read, not demoted in storage, so raising
    /// it later restores their earned tier.
    pub fn set_ceiling(
        &self,
        org_id: &str,
        action_type: &str,
        max_ceiling: Ceiling,
        auto_promotion_eligible: bool,
    ) -> Result<CeilingPolicy> {
        let existing = self.store().get_ceiling(org_id, action_type)?;
        if let Some(prev) = &existing {
            if prev.max_ceiling == max_ceiling
                && prev.auto_promotion_eligible == auto_promotion_eligible
            {
                return Ok(prev.clone());
            }
        }

        // A ceiling below an existing override pin would silently cap the
        // pin an admin set on purpose. Reject rather than coerce.
        if let Some(max) = max_ceiling.max_tier() {
            let pins = self.store().org_override_pins(org_id, action_type)?;
            if let Some(pin) = pins.into_iter().find(|p| *p > max) {
                return Err(LatitudeError::PolicyViolation(format!(
                    "ceiling {max_ceiling} is below an existing override pin ({pin}) \
                     for {org_id}/{action_type}"
                )));
            }
        }

        let policy = CeilingPolicy {
            max_ceiling,
            auto_promotion_eligible,
            updated_at: Utc::now(),
        };
        self.store().upsert_ceiling(org_id, action_type, &policy)?;
        self.store().append_event(&TierEvent::new(
            Subject::new(org_id, "*", action_type),
            EventType::CeilingApplied,
            existing.and_then(|e| e.max_ceiling.max_tier()),
            max_ceiling.max_tier(),
            None,
            "ceiling_changed",
        ))?;

        info!(
            org = org_id,
            action_type,
            ceiling = %max_ceiling,
            auto_promotion_eligible,
            "ceiling updated"
        );
        Ok(policy)
    }

    /// Every configured ceiling for an org, for the policy dashboard.
    pub fn list_ceilings(&self, org_id: &str) -> Result<Vec<(String, CeilingPolicy)>> {
        self.store().list_ceilings(org_id)
    }

    /// Pin (or unpin) a user's effective tier for an action type. The pin
    /// bypasses automatic promotion and demotion; the earned tier keeps
    /// accruing underneath and is revealed when the override returns to
    /// `inherit`.
    pub fn set_override(&self, subject: &Subject, policy: OverridePolicy) -> Result<()> {
        let existing = self.store().get_override(subject)?;
        let previous = existing.unwrap_or(OverridePolicy::Inherit);
        if previous == policy {
            // Idempotent re-apply; no event spam on unchanged policy.
            self.store().upsert_override(subject, policy)?;
            return Ok(());
        }

        if let Some(pin) = policy.pinned_tier() {
            if let Some(ceiling) = self
                .store()
                .get_ceiling(&subject.org_id, &subject.action_type)?
            {
                if !ceiling.max_ceiling.allows(pin) {
                    return Err(LatitudeError::PolicyViolation(format!(
                        "override {pin} exceeds the org ceiling ({}) for {}",
                        ceiling.max_ceiling, subject.action_type
                    )));
                }
            }
        }

        self.store().upsert_override(subject, policy)?;
        self.store().append_event(&TierEvent::new(
            subject.clone(),
            EventType::OverrideApplied,
            previous.pinned_tier(),
            policy.pinned_tier(),
            None,
            "override_changed",
        ))?;

        info!(subject = %subject, policy = %policy, "override updated");
        Ok(())
    }

    /// Set or clear the sticky never-promote lock. Creates the zero-state
    /// record when an admin locks a subject before its first signal.
    pub async fn set_never_promote(
        &self,
        subject: &Subject,
        locked: bool,
    ) -> Result<ConfidenceRecord> {
        let lock = self.subject_lock(subject);
        let _guard = lock.lock().await;

        let mut record = self
            .store()
            .get_record(subject)?
            .unwrap_or_else(|| ConfidenceRecord::new(subject.clone()));
        if record.never_promote == locked {
            return Ok(record);
        }
        record.never_promote = locked;
        if locked {
            record.promotion_eligible = false;
        }
        self.store().upsert_record(&record)?;
        info!(subject = %subject, locked, "never-promote lock updated");
        Ok(record)
    }
}
