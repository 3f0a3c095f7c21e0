#[cfg(test)]
mod tests {
    // ── Tiers ──────────────────────────────────────────────────

    mod tier {
        use latitude_core::Tier;

        #[test]
        fn test_ordering() {
            assert!(Tier::Disabled < Tier::Suggest);
            assert!(Tier::Suggest < Tier::Approve);
            assert!(Tier::Approve < Tier::Auto);
        }

        #[test]
        fn test_next_moves_one_step() {
            assert_eq!(Tier::Disabled.next(), Some(Tier::Suggest));
            assert_eq!(Tier::Suggest.next(), Some(Tier::Approve));
            assert_eq!(Tier::Approve.next(), Some(Tier::Auto));
            assert_eq!(Tier::Auto.next(), None);
        }

        #[test]
        fn test_step_down_saturates() {
            assert_eq!(Tier::Auto.step_down(), Tier::Approve);
            assert_eq!(Tier::Approve.step_down(), Tier::Suggest);
            assert_eq!(Tier::Suggest.step_down(), Tier::Disabled);
            assert_eq!(Tier::Disabled.step_down(), Tier::Disabled);
        }

        #[test]
        fn test_parse_roundtrip() {
            for tier in [Tier::Disabled, Tier::Suggest, Tier::Approve, Tier::Auto] {
                assert_eq!(Tier::parse(tier.as_str()), Some(tier));
            }
            assert_eq!(Tier::parse("supervise"), None);
        }

        #[test]
        fn test_from_u8_out_of_range_defaults_disabled() {
            assert_eq!(Tier::from_u8(4), Tier::Disabled);
            assert_eq!(Tier::from_u8(255), Tier::Disabled);
        }

        #[test]
        fn test_serde_snake_case() {
            let json = serde_json::to_string(&Tier::Auto).unwrap();
            assert_eq!(json, "\"auto\"");
            let restored: Tier = serde_json::from_str("\"approve\"").unwrap();
            assert_eq!(restored, Tier::Approve);
        }
    }

    // ── Signal kinds ───────────────────────────────────────────

    mod signal {
        use latitude_core::{SignalKind, Subject};

        #[test]
        fn test_parse_rejects_unknown() {
            assert_eq!(SignalKind::parse("approved"), Some(SignalKind::Approved));
            assert_eq!(SignalKind::parse("liked"), None);
            assert_eq!(SignalKind::parse(""), None);
        }

        #[test]
        fn test_approval_classification() {
            assert!(SignalKind::Approved.is_approval());
            assert!(SignalKind::ApprovedEdited.is_approval());
            assert!(!SignalKind::Rejected.is_approval());
            assert!(!SignalKind::AutoExecuted.is_approval());
        }

        #[test]
        fn test_reviewed_classification() {
            assert!(SignalKind::Rejected.is_reviewed());
            assert!(!SignalKind::Undone.is_reviewed());
            assert!(!SignalKind::Expired.is_reviewed());
        }

        #[test]
        fn test_subject_display() {
            let s = Subject::new("acme", "u-1", "email.send");
            assert_eq!(s.to_string(), "acme/u-1/email.send");
        }
    }

    // ── Records ────────────────────────────────────────────────

    mod record {
        use chrono::{Duration, Utc};
        use latitude_core::{ConfidenceRecord, Subject, Tier};

        #[test]
        fn test_zero_state() {
            let record = ConfidenceRecord::new(Subject::new("acme", "u-1", "email.send"));
            assert_eq!(record.tier, Tier::Disabled);
            assert_eq!(record.total_signals, 0);
            assert!(record.score.is_none());
            assert!(!record.promotion_eligible);
        }

        #[test]
        fn test_cooldown_window() {
            let mut record = ConfidenceRecord::new(Subject::new("acme", "u-1", "email.send"));
            let now = Utc::now();
            assert!(!record.in_cooldown(now));
            record.cooldown_until = Some(now + Duration::days(3));
            assert!(record.in_cooldown(now));
            assert!(!record.in_cooldown(now + Duration::days(4)));
        }
    }

    // ── Policies ───────────────────────────────────────────────

    mod policy {
        use latitude_core::{Ceiling, OverridePolicy, Tier};

        #[test]
        fn test_ceiling_clamps() {
            assert_eq!(Ceiling::Suggest.clamp(Tier::Auto), Tier::Suggest);
            assert_eq!(Ceiling::Suggest.clamp(Tier::Disabled), Tier::Disabled);
            assert_eq!(Ceiling::NoLimit.clamp(Tier::Auto), Tier::Auto);
        }

        #[test]
        fn test_ceiling_allows() {
            assert!(Ceiling::Approve.allows(Tier::Approve));
            assert!(!Ceiling::Approve.allows(Tier::Auto));
            assert!(Ceiling::NoLimit.allows(Tier::Auto));
        }

        #[test]
        fn test_override_pin() {
            assert_eq!(OverridePolicy::Inherit.pinned_tier(), None);
            assert_eq!(OverridePolicy::Suggest.pinned_tier(), Some(Tier::Suggest));
            assert_eq!(OverridePolicy::parse("inherit"), Some(OverridePolicy::Inherit));
            assert_eq!(OverridePolicy::parse("pinned"), None);
        }
    }
}
