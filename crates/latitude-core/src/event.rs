use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::signal::Subject;
use crate::tier::Tier;

/// What kind of tier transition or policy change an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    PromotionProposed,
    PromotionAccepted,
    Demotion,
    OverrideApplied,
    CeilingApplied,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PromotionProposed => "promotion_proposed",
            Self::PromotionAccepted => "promotion_accepted",
            Self::Demotion => "demotion",
            Self::OverrideApplied => "override_applied",
            Self::CeilingApplied => "ceiling_applied",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "promotion_proposed" => Some(Self::PromotionProposed),
            "promotion_accepted" => Some(Self::PromotionAccepted),
            "demotion" => Some(Self::Demotion),
            "override_applied" => Some(Self::OverrideApplied),
            "ceiling_applied" => Some(Self::CeilingApplied),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of a tier transition or policy change. Immutable once
/// written; drives both the audit trail and the nudge queue.
///
/// `from_tier`/`to_tier` are null for policy events whose sides are not a
/// tier (a `no_limit` ceiling, an `inherit` override).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierEvent {
    pub id: Uuid,
    #[serde(flatten)]
    pub subject: Subject,
    pub event_type: EventType,
    pub from_tier: Option<Tier>,
    pub to_tier: Option<Tier>,
    pub confidence_score_at_time: Option<f64>,
    pub trigger_reason: String,
    pub created_at: DateTime<Utc>,
}

impl TierEvent {
    pub fn new(
        subject: Subject,
        event_type: EventType,
        from_tier: Option<Tier>,
        to_tier: Option<Tier>,
        confidence_score_at_time: Option<f64>,
        trigger_reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            subject,
            event_type,
            from_tier,
            to_tier,
            confidence_score_at_time,
            trigger_reason: trigger_reason.into(),
            created_at: Utc::now(),
        }
    }
}

/// One-shot notification for a reached tier milestone, cleared on first pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nudge {
    pub id: Uuid,
    pub org_id: String,
    pub user_id: String,
    pub action_type: String,
    pub tier: Tier,
    /// The promotion event that produced this nudge.
    pub event_id: Uuid,
    pub created_at: DateTime<Utc>,
}
