#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use latitude_core::{Signal, SignalKind, Subject, Tier};
    use uuid::Uuid;

    fn subject() -> Subject {
        Subject::new("acme", "u-1", "email.send")
    }

    fn signal(kind: SignalKind, days_ago: i64) -> Signal {
        let at = Utc::now() - Duration::days(days_ago);
        Signal {
            id: Uuid::new_v4(),
            subject: subject(),
            kind,
            tier_at_time: Tier::Suggest,
            occurred_at: at,
            recorded_at: at,
        }
    }

    // ── Signal log ─────────────────────────────────────────────

    mod signals {
        use super::*;
        use latitude_store::EngineStore;

        #[test]
        fn test_insert_and_replay_order() {
            let store = EngineStore::open_in_memory().unwrap();
            assert!(store.insert_signal(&signal(SignalKind::Approved, 3)).unwrap());
            assert!(store.insert_signal(&signal(SignalKind::Rejected, 1)).unwrap());
            assert!(store.insert_signal(&signal(SignalKind::Approved, 2)).unwrap());

            let replay = store.signals_for_subject(&subject()).unwrap();
            assert_eq!(replay.len(), 3);
            // Occurrence order, oldest first
            assert_eq!(replay[0].kind, SignalKind::Approved);
            assert_eq!(replay[2].kind, SignalKind::Rejected);
        }

        #[test]
        fn test_duplicate_id_ignored() {
            let store = EngineStore::open_in_memory().unwrap();
            let s = signal(SignalKind::Approved, 0);
            assert!(store.insert_signal(&s).unwrap());
            assert!(!store.insert_signal(&s).unwrap());
            assert_eq!(store.signals_for_subject(&subject()).unwrap().len(), 1);
        }

        #[test]
        fn test_recent_kinds_newest_first() {
            let store = EngineStore::open_in_memory().unwrap();
            store.insert_signal(&signal(SignalKind::Approved, 5)).unwrap();
            store.insert_signal(&signal(SignalKind::Rejected, 2)).unwrap();
            store.insert_signal(&signal(SignalKind::Undone, 1)).unwrap();

            let recent = store.recent_kinds(&subject(), 2).unwrap();
            assert_eq!(recent, vec![SignalKind::Undone, SignalKind::Rejected]);
        }

        #[test]
        fn test_window_counts_excludes_old_signals() {
            let store = EngineStore::open_in_memory().unwrap();
            store.insert_signal(&signal(SignalKind::Approved, 40)).unwrap();
            store.insert_signal(&signal(SignalKind::Approved, 5)).unwrap();
            store.insert_signal(&signal(SignalKind::Rejected, 2)).unwrap();

            let counts = store
                .window_counts(&subject(), Utc::now() - Duration::days(30))
                .unwrap();
            assert_eq!(counts.approved, 1);
            assert_eq!(counts.rejected, 1);
            assert_eq!(counts.total(), 2);
        }

        #[test]
        fn test_distinct_active_days() {
            let store = EngineStore::open_in_memory().unwrap();
            store.insert_signal(&signal(SignalKind::Approved, 2)).unwrap();
            store.insert_signal(&signal(SignalKind::Rejected, 2)).unwrap();
            store.insert_signal(&signal(SignalKind::Approved, 1)).unwrap();

            assert_eq!(store.distinct_active_days(&subject()).unwrap(), 2);
        }

        #[test]
        fn test_burn_summary() {
            let store = EngineStore::open_in_memory().unwrap();
            store.insert_signal(&signal(SignalKind::Approved, 1)).unwrap();
            store.insert_signal(&signal(SignalKind::AutoExecuted, 2)).unwrap();
            store.insert_signal(&signal(SignalKind::Approved, 60)).unwrap();

            let burn = store.signal_burn("acme", 7).unwrap();
            assert_eq!(burn.counts.total(), 2);
            assert_eq!(burn.active_users, 1);
        }
    }

    // ── Confidence records ─────────────────────────────────────

    mod records {
        use super::*;
        use latitude_core::ConfidenceRecord;
        use latitude_store::EngineStore;

        #[test]
        fn test_missing_record_is_none() {
            let store = EngineStore::open_in_memory().unwrap();
            assert!(store.get_record(&subject()).unwrap().is_none());
        }

        #[test]
        fn test_upsert_roundtrip() {
            let store = EngineStore::open_in_memory().unwrap();
            let mut record = ConfidenceRecord::new(subject());
            record.tier = Tier::Approve;
            record.score = Some(0.82);
            record.total_signals = 17;
            record.total_approved = 14;
            record.days_active = 9;
            record.cooldown_until = Some(Utc::now() + Duration::days(3));
            record.never_promote = true;
            record.extra_required_signals = 5;

            store.upsert_record(&record).unwrap();
            let loaded = store.get_record(&subject()).unwrap().unwrap();
            assert_eq!(loaded.tier, Tier::Approve);
            assert_eq!(loaded.score, Some(0.82));
            assert_eq!(loaded.total_signals, 17);
            assert!(loaded.never_promote);
            assert_eq!(loaded.extra_required_signals, 5);
            assert!(loaded.cooldown_until.is_some());

            // Second upsert overwrites, not duplicates
            record.tier = Tier::Auto;
            store.upsert_record(&record).unwrap();
            assert_eq!(store.all_subjects().unwrap().len(), 1);
            assert_eq!(
                store.get_record(&subject()).unwrap().unwrap().tier,
                Tier::Auto
            );
        }

        #[test]
        fn test_org_records_scoped() {
            let store = EngineStore::open_in_memory().unwrap();
            store
                .upsert_record(&ConfidenceRecord::new(subject()))
                .unwrap();
            store
                .upsert_record(&ConfidenceRecord::new(Subject::new(
                    "globex", "u-2", "crm.update",
                )))
                .unwrap();

            let acme = store.org_records("acme").unwrap();
            assert_eq!(acme.len(), 1);
            assert_eq!(acme[0].subject.org_id, "acme");
        }
    }

    // ── Events ─────────────────────────────────────────────────

    mod events {
        use super::*;
        use latitude_core::{EventType, TierEvent};
        use latitude_store::EngineStore;

        #[test]
        fn test_append_and_history() {
            let store = EngineStore::open_in_memory().unwrap();
            let mut first = TierEvent::new(
                subject(),
                EventType::PromotionAccepted,
                Some(Tier::Suggest),
                Some(Tier::Approve),
                Some(0.8),
                "thresholds_met",
            );
            first.created_at = Utc::now() - Duration::minutes(5);
            store.append_event(&first).unwrap();
            store
                .append_event(&TierEvent::new(
                    subject(),
                    EventType::Demotion,
                    Some(Tier::Approve),
                    Some(Tier::Suggest),
                    Some(0.6),
                    "rejection_rate_exceeded_threshold",
                ))
                .unwrap();

            let history = store.events_for_subject(&subject(), 10).unwrap();
            assert_eq!(history.len(), 2);
            // Newest first
            assert_eq!(history[0].event_type, EventType::Demotion);
            assert_eq!(history[1].to_tier, Some(Tier::Approve));
        }

        #[test]
        fn test_event_counts() {
            let store = EngineStore::open_in_memory().unwrap();
            for _ in 0..3 {
                store
                    .append_event(&TierEvent::new(
                        subject(),
                        EventType::Demotion,
                        Some(Tier::Approve),
                        Some(Tier::Suggest),
                        None,
                        "manual",
                    ))
                    .unwrap();
            }
            let counts = store.event_counts().unwrap();
            assert_eq!(counts, vec![(EventType::Demotion, 3)]);
        }
    }

    // ── Policies ───────────────────────────────────────────────

    mod policies {
        use super::*;
        use latitude_core::{Ceiling, CeilingPolicy, OverridePolicy};
        use latitude_store::EngineStore;

        #[test]
        fn test_ceiling_upsert_and_get() {
            let store = EngineStore::open_in_memory().unwrap();
            assert!(store.get_ceiling("acme", "email.send").unwrap().is_none());

            let policy = CeilingPolicy {
                max_ceiling: Ceiling::Approve,
                auto_promotion_eligible: false,
                updated_at: Utc::now(),
            };
            store.upsert_ceiling("acme", "email.send", &policy).unwrap();
            let loaded = store.get_ceiling("acme", "email.send").unwrap().unwrap();
            assert_eq!(loaded.max_ceiling, Ceiling::Approve);
            assert!(!loaded.auto_promotion_eligible);
        }

        #[test]
        fn test_list_ceilings_scoped_to_org() {
            let store = EngineStore::open_in_memory().unwrap();
            let policy = CeilingPolicy {
                max_ceiling: Ceiling::Auto,
                auto_promotion_eligible: true,
                updated_at: Utc::now(),
            };
            store.upsert_ceiling("acme", "email.send", &policy).unwrap();
            store.upsert_ceiling("acme", "crm.update", &policy).unwrap();
            store.upsert_ceiling("globex", "email.send", &policy).unwrap();

            let ceilings = store.list_ceilings("acme").unwrap();
            assert_eq!(ceilings.len(), 2);
            // Ordered by action type
            assert_eq!(ceilings[0].0, "crm.update");
            assert_eq!(ceilings[1].0, "email.send");
        }

        #[test]
        fn test_override_upsert_and_pins() {
            let store = EngineStore::open_in_memory().unwrap();
            store
                .upsert_override(&subject(), OverridePolicy::Suggest)
                .unwrap();
            store
                .upsert_override(&Subject::new("acme", "u-2", "email.send"), OverridePolicy::Inherit)
                .unwrap();

            assert_eq!(
                store.get_override(&subject()).unwrap(),
                Some(OverridePolicy::Suggest)
            );
            // Inherit rows carry no pin
            assert_eq!(
                store.org_override_pins("acme", "email.send").unwrap(),
                vec![Tier::Suggest]
            );
        }
    }

    // ── Nudges ─────────────────────────────────────────────────

    mod nudges {
        use super::*;
        use latitude_core::Nudge;
        use latitude_store::EngineStore;

        fn nudge(tier: Tier, minutes_ago: i64) -> Nudge {
            Nudge {
                id: Uuid::new_v4(),
                org_id: "acme".into(),
                user_id: "u-1".into(),
                action_type: "email.send".into(),
                tier,
                event_id: Uuid::new_v4(),
                created_at: Utc::now() - Duration::minutes(minutes_ago),
            }
        }

        #[test]
        fn test_milestone_enqueue_idempotent() {
            let store = EngineStore::open_in_memory().unwrap();
            assert!(store.enqueue_nudge(&nudge(Tier::Approve, 0)).unwrap());
            // Same milestone again, ignored even with a fresh id
            assert!(!store.enqueue_nudge(&nudge(Tier::Approve, 0)).unwrap());
            assert_eq!(store.count_pending_nudges().unwrap(), 1);
        }

        #[test]
        fn test_pull_is_destructive_and_ordered() {
            let store = EngineStore::open_in_memory().unwrap();
            store.enqueue_nudge(&nudge(Tier::Approve, 10)).unwrap();
            store.enqueue_nudge(&nudge(Tier::Auto, 1)).unwrap();

            let first = store.pull_nudge("u-1").unwrap().unwrap();
            assert_eq!(first.tier, Tier::Approve);
            let second = store.pull_nudge("u-1").unwrap().unwrap();
            assert_eq!(second.tier, Tier::Auto);
            assert!(store.pull_nudge("u-1").unwrap().is_none());
        }

        #[test]
        fn test_pull_scoped_to_user() {
            let store = EngineStore::open_in_memory().unwrap();
            store.enqueue_nudge(&nudge(Tier::Approve, 0)).unwrap();
            assert!(store.pull_nudge("u-2").unwrap().is_none());
            assert!(store.pull_nudge("u-1").unwrap().is_some());
        }
    }

    // ── Durability ─────────────────────────────────────────────

    mod durability {
        use super::*;
        use latitude_core::ConfidenceRecord;
        use latitude_store::EngineStore;

        #[test]
        fn test_sticky_state_survives_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("latitude.db");

            let cooldown = Utc::now() + Duration::days(7);
            {
                let store = EngineStore::open(&path).unwrap();
                let mut record = ConfidenceRecord::new(subject());
                record.cooldown_until = Some(cooldown);
                record.never_promote = true;
                store.upsert_record(&record).unwrap();
            }

            let store = EngineStore::open(&path).unwrap();
            let loaded = store.get_record(&subject()).unwrap().unwrap();
            assert!(loaded.never_promote);
            assert_eq!(
                loaded.cooldown_until.unwrap().timestamp(),
                cooldown.timestamp()
            );
        }
    }
}
