use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tier::Tier;

/// Organization-wide cap on how high a subject's effective tier may rise
/// for an action type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ceiling {
    Disabled,
    Suggest,
    Approve,
    Auto,
    NoLimit,
}

impl Ceiling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Suggest => "suggest",
            Self::Approve => "approve",
            Self::Auto => "auto",
            Self::NoLimit => "no_limit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disabled" => Some(Self::Disabled),
            "suggest" => Some(Self::Suggest),
            "approve" => Some(Self::Approve),
            "auto" => Some(Self::Auto),
            "no_limit" => Some(Self::NoLimit),
            _ => None,
        }
    }

    /// The highest tier this ceiling admits. `None` means uncapped.
    pub fn max_tier(&self) -> Option<Tier> {
        match self {
            Self::Disabled => Some(Tier::Disabled),
            Self::Suggest => Some(Tier::Suggest),
            Self::Approve => Some(Tier::Approve),
            Self::Auto => Some(Tier::Auto),
            Self::NoLimit => None,
        }
    }

    pub fn allows(&self, tier: Tier) -> bool {
        self.max_tier().is_none_or(|max| tier <= max)
    }

    /// Clamp a computed tier to this ceiling.
    pub fn clamp(&self, tier: Tier) -> Tier {
        match self.max_tier() {
            Some(max) if tier > max => max,
            _ => tier,
        }
    }
}

impl fmt::Display for Ceiling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The org-administered policy row for one (org, action_type).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CeilingPolicy {
    pub max_ceiling: Ceiling,
    /// When false, the engine never auto-promotes for this action type,
    /// regardless of score.
    pub auto_promotion_eligible: bool,
    pub updated_at: DateTime<Utc>,
}

impl CeilingPolicy {
    /// Default for an action type no manager has configured: uncapped and
    /// eligible for automatic promotion.
    pub fn permissive() -> Self {
        Self {
            max_ceiling: Ceiling::NoLimit,
            auto_promotion_eligible: true,
            updated_at: Utc::now(),
        }
    }
}

/// Per-user pin that fixes the effective tier for an action type, still
/// subject to the org ceiling. `inherit` defers to the computed tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverridePolicy {
    Inherit,
    Disabled,
    Suggest,
    Approve,
    Auto,
}

impl OverridePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inherit => "inherit",
            Self::Disabled => "disabled",
            Self::Suggest => "suggest",
            Self::Approve => "approve",
            Self::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inherit" => Some(Self::Inherit),
            "disabled" => Some(Self::Disabled),
            "suggest" => Some(Self::Suggest),
            "approve" => Some(Self::Approve),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// The tier this override pins, if it pins one.
    pub fn pinned_tier(&self) -> Option<Tier> {
        match self {
            Self::Inherit => None,
            Self::Disabled => Some(Tier::Disabled),
            Self::Suggest => Some(Tier::Suggest),
            Self::Approve => Some(Tier::Approve),
            Self::Auto => Some(Tier::Auto),
        }
    }
}

impl fmt::Display for OverridePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
