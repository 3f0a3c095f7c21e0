#[cfg(test)]
mod tests {
    // ── Metrics rendering ──────────────────────────────────────

    mod metrics {
        use latitude_server::metrics::{EngineTotals, Metrics};

        #[test]
        fn test_render_includes_all_series() {
            let metrics = Metrics::new();
            metrics.inc_http_requests();
            metrics.inc_http_requests();
            metrics.inc_signals_ingested();
            metrics.inc_signals_duplicate();
            metrics.inc_nudges_delivered();

            let totals = EngineTotals {
                signals_stored: 42,
                promotions_total: 3,
                demotions_total: 1,
                nudges_pending: 2,
            };
            let body = metrics.render_prometheus(&totals);
            assert!(body.contains("latitude_http_requests_total 2"));
            assert!(body.contains("latitude_signals_ingested_total 1"));
            assert!(body.contains("latitude_signals_duplicate_total 1"));
            assert!(body.contains("latitude_nudges_delivered_total 1"));
            assert!(body.contains("latitude_signals_stored 42"));
            assert!(body.contains("latitude_promotions_total 3"));
            assert!(body.contains("latitude_demotions_total 1"));
            assert!(body.contains("latitude_nudges_pending 2"));
        }
    }

    // ── Error mapping ──────────────────────────────────────────

    mod errors {
        use axum::http::StatusCode;
        use latitude_core::LatitudeError;
        use latitude_server::ApiError;

        #[test]
        fn test_taxonomy_maps_to_statuses() {
            let cases = [
                (
                    LatitudeError::Validation("bad".into()),
                    StatusCode::UNPROCESSABLE_ENTITY,
                ),
                (
                    LatitudeError::PolicyViolation("no".into()),
                    StatusCode::CONFLICT,
                ),
                (
                    LatitudeError::Conflict {
                        subject: "a/b/c".into(),
                        attempts: 3,
                    },
                    StatusCode::CONFLICT,
                ),
                (
                    LatitudeError::NotFound("missing".into()),
                    StatusCode::NOT_FOUND,
                ),
                (
                    LatitudeError::StoreUnavailable("down".into()),
                    StatusCode::SERVICE_UNAVAILABLE,
                ),
                (
                    LatitudeError::Storage("broken".into()),
                    StatusCode::INTERNAL_SERVER_ERROR,
                ),
            ];
            for (error, expected) in cases {
                assert_eq!(ApiError::from(error).status(), expected);
            }
        }
    }
}
