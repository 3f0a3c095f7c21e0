use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::tier::Tier;

/// The observed outcome of a previously-taken automated or suggested action.
///
/// Unknown kinds are rejected at the ingestion boundary, never coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    AutoExecuted,
    Approved,
    ApprovedEdited,
    Rejected,
    Undone,
    Expired,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoExecuted => "auto_executed",
            Self::Approved => "approved",
            Self::ApprovedEdited => "approved_edited",
            Self::Rejected => "rejected",
            Self::Undone => "undone",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto_executed" => Some(Self::AutoExecuted),
            "approved" => Some(Self::Approved),
            "approved_edited" => Some(Self::ApprovedEdited),
            "rejected" => Some(Self::Rejected),
            "undone" => Some(Self::Undone),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Whether this outcome counts toward the approval counters.
    pub fn is_approval(&self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedEdited)
    }

    /// Whether a human reviewed the action (approved, edited, or rejected it).
    pub fn is_reviewed(&self) -> bool {
        matches!(self, Self::Approved | Self::ApprovedEdited | Self::Rejected)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind signal tallies for a subject, over all time or a window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalCounts {
    pub auto_executed: u64,
    pub approved: u64,
    pub approved_edited: u64,
    pub rejected: u64,
    pub undone: u64,
    pub expired: u64,
}

impl SignalCounts {
    pub fn add(&mut self, kind: SignalKind) {
        self.add_many(kind, 1);
    }

    pub fn add_many(&mut self, kind: SignalKind, n: u64) {
        match kind {
            SignalKind::AutoExecuted => self.auto_executed += n,
            SignalKind::Approved => self.approved += n,
            SignalKind::ApprovedEdited => self.approved_edited += n,
            SignalKind::Rejected => self.rejected += n,
            SignalKind::Undone => self.undone += n,
            SignalKind::Expired => self.expired += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.auto_executed
            + self.approved
            + self.approved_edited
            + self.rejected
            + self.undone
            + self.expired
    }

    /// Signals a human reviewed: approved, edited, or rejected.
    pub fn reviewed(&self) -> u64 {
        self.approved + self.approved_edited + self.rejected
    }

    /// Denominator for the undo rate: everything that actually ran.
    pub fn executed(&self) -> u64 {
        self.approved + self.approved_edited + self.auto_executed
    }
}

/// The (org, user, action_type) triple every record, signal, and policy hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    pub org_id: String,
    pub user_id: String,
    pub action_type: String,
}

impl Subject {
    pub fn new(
        org_id: impl Into<String>,
        user_id: impl Into<String>,
        action_type: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            user_id: user_id.into(),
            action_type: action_type.into(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.org_id, self.user_id, self.action_type)
    }
}

/// An immutable behavioral outcome, append-only once recorded.
///
/// `tier_at_time` is the effective tier in force when the action was taken;
/// outcomes are attributed to the policy that authorized them, not the
/// current one. Signals are the sole source of truth for re-deriving a
/// [`crate::ConfidenceRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    #[serde(flatten)]
    pub subject: Subject,
    pub kind: SignalKind,
    pub tier_at_time: Tier,
    /// When the outcome happened in the real world (producer-supplied).
    pub occurred_at: DateTime<Utc>,
    /// When the engine ingested it.
    pub recorded_at: DateTime<Utc>,
}
