//! The scheduled rescore + promotion sweep, plus the near-real-time rescore
//! queue fed by ingestion. Each subject's recompute is a complete,
//! independently-committed unit, so interrupting a sweep mid-batch leaves no
//! subject half-updated.

use std::str::FromStr;

use chrono::Utc;
use cron::Schedule;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use latitude_config::SweepConfig;
use latitude_core::{LatitudeError, Result, Subject};

use crate::engine::ConfidenceEngine;

/// What one sweep pass did.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    pub subjects: usize,
    pub promoted: usize,
    pub failed: usize,
}

/// Background service driving the cron sweep and draining the per-signal
/// rescore queue.
pub struct SweepService {
    engine: ConfidenceEngine,
    schedule: Schedule,
    cancel: CancellationToken,
    rescore_rx: mpsc::Receiver<Subject>,
}

impl SweepService {
    /// Build the service and the sender half of its rescore queue; wire the
    /// sender into the engine with
    /// [`ConfidenceEngine::with_rescore_queue`](crate::ConfidenceEngine::with_rescore_queue).
    pub fn new(
        engine: ConfidenceEngine,
        config: &SweepConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, mpsc::Sender<Subject>)> {
        let schedule = Schedule::from_str(&config.cron).map_err(|e| {
            LatitudeError::Config(format!("invalid sweep cron '{}': {e}", config.cron))
        })?;
        let (tx, rx) = mpsc::channel(config.rescore_queue_depth);
        Ok((
            Self {
                engine,
                schedule,
                cancel,
                rescore_rx: rx,
            },
            tx,
        ))
    }

    /// Run one full sweep: every known subject recomputed in turn. Failures
    /// are logged and counted, never propagated: the last-known record
    /// stays authoritative and the subject retries next cycle.
    pub async fn run_once(engine: &ConfidenceEngine, cancel: &CancellationToken) -> SweepReport {
        let mut report = SweepReport::default();
        let subjects = match engine.store().all_subjects() {
            Ok(subjects) => subjects,
            Err(e) => {
                error!(error = %e, "sweep could not list subjects");
                report.failed = 1;
                return report;
            }
        };

        for subject in subjects {
            if cancel.is_cancelled() {
                info!(completed = report.subjects, "sweep interrupted mid-batch");
                break;
            }
            report.subjects += 1;
            match engine.recompute(&subject).await {
                Ok(Some(outcome)) => {
                    if outcome.promoted.is_some() {
                        report.promoted += 1;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(subject = %subject, error = %e, "recompute failed, retrying next cycle");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Run the sweep loop. Spawn as a background task; stops when the
    /// cancellation token fires.
    pub async fn run(mut self) {
        info!(schedule = %self.schedule, "sweep service started");
        let check_interval = std::time::Duration::from_secs(30);
        let mut last_fired = Utc::now();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("sweep service stopping");
                    return;
                }
                Some(subject) = self.rescore_rx.recv() => {
                    if let Err(e) = self.engine.recompute(&subject).await {
                        warn!(subject = %subject, error = %e, "queued rescore failed");
                    }
                }
                _ = tokio::time::sleep(check_interval) => {
                    let now = Utc::now();
                    let due = self
                        .schedule
                        .after(&last_fired)
                        .take(1)
                        .next()
                        .is_some_and(|next| next <= now);
                    if due {
                        last_fired = now;
                        let report = Self::run_once(&self.engine, &self.cancel).await;
                        info!(
                            subjects = report.subjects,
                            promoted = report.promoted,
                            failed = report.failed,
                            "scheduled sweep complete"
                        );
                    }
                }
            }
        }
    }
}
