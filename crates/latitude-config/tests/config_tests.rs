#[cfg(test)]
mod tests {
    // ── Schema defaults ────────────────────────────────────────

    mod defaults {
        use latitude_config::LatitudeConfig;

        #[test]
        fn test_defaults_validate_clean() {
            let config = LatitudeConfig::default();
            let warnings = config.validate().unwrap();
            assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        }

        #[test]
        fn test_default_thresholds() {
            let config = LatitudeConfig::default();
            assert_eq!(config.engine.promote_score_approve, 0.75);
            assert_eq!(config.engine.promote_score_auto, 0.90);
            assert_eq!(config.engine.demotion_window, 10);
            assert_eq!(config.engine.cooldown_days_auto, 7);
            assert_eq!(config.engine.evidence_increment, 5);
        }
    }

    // ── Tuning accessors ───────────────────────────────────────

    mod tuning {
        use latitude_config::EngineTuning;
        use latitude_core::Tier;

        #[test]
        fn test_per_tier_lookups() {
            let t = EngineTuning::default();
            assert_eq!(t.promote_score(Tier::Approve), 0.75);
            assert_eq!(t.min_signals(Tier::Auto), 25);
            assert_eq!(t.min_days_active(Tier::Approve), 5);
        }

        #[test]
        fn test_cooldown_scales_with_tier() {
            let t = EngineTuning::default();
            assert!(t.cooldown(Tier::Auto) > t.cooldown(Tier::Approve));
            assert!(t.cooldown(Tier::Approve) > t.cooldown(Tier::Suggest));
            assert_eq!(t.cooldown(Tier::Auto), chrono::Duration::days(7));
        }
    }

    // ── Parsing ────────────────────────────────────────────────

    mod parsing {
        use latitude_config::LatitudeConfig;

        #[test]
        fn test_partial_toml_fills_defaults() {
            let raw = r#"
                [engine]
                promote_score_auto = 0.95

                [server]
                listen = "127.0.0.1:9000"
            "#;
            let config: LatitudeConfig = toml::from_str(raw).unwrap();
            assert_eq!(config.engine.promote_score_auto, 0.95);
            assert_eq!(config.engine.promote_score_approve, 0.75);
            assert_eq!(config.server.listen, "127.0.0.1:9000");
            assert_eq!(config.logging.level, "info");
        }
    }

    // ── Validation ─────────────────────────────────────────────

    mod validation {
        use latitude_config::LatitudeConfig;

        #[test]
        fn test_non_increasing_thresholds_rejected() {
            let mut config = LatitudeConfig::default();
            config.engine.promote_score_approve = 0.95;
            config.engine.promote_score_auto = 0.90;
            let err = config.validate().unwrap_err();
            assert!(err.contains("strictly increasing"));
        }

        #[test]
        fn test_bad_weights_rejected() {
            let mut config = LatitudeConfig::default();
            config.engine.undo_weight = 0.5;
            let err = config.validate().unwrap_err();
            assert!(err.contains("weights"));
        }

        #[test]
        fn test_bad_cron_rejected() {
            let mut config = LatitudeConfig::default();
            config.sweep.cron = "whenever".into();
            let err = config.validate().unwrap_err();
            assert!(err.contains("cron"));
        }

        #[test]
        fn test_open_bind_without_key_warns() {
            let mut config = LatitudeConfig::default();
            config.server.listen = "0.0.0.0:4800".into();
            let warnings = config.validate().unwrap();
            assert!(warnings.iter().any(|w| w.field.contains("api_key")));
        }
    }
}
