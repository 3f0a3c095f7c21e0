use serde::{Deserialize, Serialize};
use std::fmt;

/// Four trust tiers, strictly ordered:
///
/// - **Disabled**: the engine neither acts nor suggests for this subject.
/// - **Suggest**: drafts are surfaced to the user, nothing executes.
/// - **Approve**: actions execute after a one-click human approval.
/// - **Auto**: actions execute unattended; outcomes are reported afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Tier {
    Disabled = 0,
    Suggest = 1,
    Approve = 2,
    Auto = 3,
}

impl Tier {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Disabled,
            1 => Self::Suggest,
            2 => Self::Approve,
            3 => Self::Auto,
            _ => Self::Disabled, // safe default
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Suggest => "suggest",
            Self::Approve => "approve",
            Self::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "disabled" => Some(Self::Disabled),
            "suggest" => Some(Self::Suggest),
            "approve" => Some(Self::Approve),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }

    /// The next tier up the ladder, if any. Promotion moves exactly one step.
    pub fn next(&self) -> Option<Tier> {
        match self {
            Self::Disabled => Some(Self::Suggest),
            Self::Suggest => Some(Self::Approve),
            Self::Approve => Some(Self::Auto),
            Self::Auto => None,
        }
    }

    /// One step down the ladder, saturating at `Disabled`.
    pub fn step_down(&self) -> Tier {
        match self {
            Self::Disabled | Self::Suggest => Self::Disabled,
            Self::Approve => Self::Suggest,
            Self::Auto => Self::Approve,
        }
    }

    /// Whether actions at this tier execute without a human in the loop.
    pub fn executes_unattended(&self) -> bool {
        *self == Self::Auto
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Disabled => "No automation for this action",
            Self::Suggest => "Drafts surfaced for the user, nothing executes",
            Self::Approve => "Executes after one-click human approval",
            Self::Auto => "Executes unattended, reported afterwards",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
