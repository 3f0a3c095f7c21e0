use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use latitude_core::{
    Ceiling, CeilingPolicy, ConfidenceRecord, EventType, LatitudeError, Nudge, OverridePolicy,
    Result, Signal, SignalCounts, SignalKind, Subject, Tier, TierEvent,
};

/// Signal volume over a trailing window, for dashboard burn summaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnSummary {
    pub window_days: i64,
    pub counts: SignalCounts,
    /// Distinct users that produced at least one signal in the window.
    pub active_users: u64,
}

/// Durable store for the confidence engine.
///
/// `signals` and `events` are append-only; `confidence_records` is mutated
/// only by the engine under its per-subject serialization; `ceilings` and
/// `overrides` are small and admin-mutated; `nudges` is a single-consumer
/// outbox.
pub struct EngineStore {
    db: Arc<Mutex<Connection>>,
}

fn db_err(e: rusqlite::Error) -> LatitudeError {
    LatitudeError::Storage(e.to_string())
}

fn bad_column(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, msg.into())
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| bad_column(idx, format!("bad timestamp '{raw}': {e}")))
}

fn parse_opt_ts(idx: usize, raw: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| parse_ts(idx, &s)).transpose()
}

impl EngineStore {
    /// Open or create the engine database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening engine store");

        let conn = Connection::open(path)
            .map_err(|e| LatitudeError::StoreUnavailable(e.to_string()))?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| LatitudeError::StoreUnavailable(e.to_string()))?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS signals (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                kind TEXT NOT NULL,
                tier_at_time TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_subject
                ON signals(org_id, user_id, action_type, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_signals_org_time
                ON signals(org_id, occurred_at);

            CREATE TABLE IF NOT EXISTS confidence_records (
                org_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                tier TEXT NOT NULL,
                score REAL,
                approval_rate REAL,
                clean_approval_rate REAL,
                edit_rate REAL,
                rejection_rate REAL,
                undo_rate REAL,
                total_signals INTEGER NOT NULL DEFAULT 0,
                total_approved INTEGER NOT NULL DEFAULT 0,
                total_rejected INTEGER NOT NULL DEFAULT 0,
                total_undone INTEGER NOT NULL DEFAULT 0,
                last_30_score REAL,
                days_active INTEGER NOT NULL DEFAULT 0,
                promotion_eligible INTEGER NOT NULL DEFAULT 0,
                cooldown_until TEXT,
                never_promote INTEGER NOT NULL DEFAULT 0,
                extra_required_signals INTEGER NOT NULL DEFAULT 0,
                first_signal_at TEXT,
                last_signal_at TEXT,
                last_scored_at TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (org_id, user_id, action_type)
            );

            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                event_type TEXT NOT NULL,
                from_tier TEXT,
                to_tier TEXT,
                confidence_score_at_time REAL,
                trigger_reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_subject
                ON events(org_id, user_id, action_type, created_at);

            CREATE TABLE IF NOT EXISTS ceilings (
                org_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                max_ceiling TEXT NOT NULL,
                auto_promotion_eligible INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (org_id, action_type)
            );

            CREATE TABLE IF NOT EXISTS overrides (
                org_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                policy TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (org_id, user_id, action_type)
            );

            CREATE TABLE IF NOT EXISTS nudges (
                id TEXT PRIMARY KEY,
                org_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                action_type TEXT NOT NULL,
                tier TEXT NOT NULL,
                event_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (org_id, user_id, action_type, tier)
            );
            CREATE INDEX IF NOT EXISTS idx_nudges_user ON nudges(user_id, created_at);
            ",
        )
        .map_err(|e| LatitudeError::StoreUnavailable(e.to_string()))?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    // ── Signals ────────────────────────────────────────────────

    /// Append a signal. Returns false when the id was already recorded;
    /// at-least-once delivery makes duplicates routine, not an error.
    pub fn insert_signal(&self, signal: &Signal) -> Result<bool> {
        let db = self.db.lock();
        let rows = db
            .execute(
                "INSERT OR IGNORE INTO signals
                     (id, org_id, user_id, action_type, kind, tier_at_time, occurred_at, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    signal.id.to_string(),
                    signal.subject.org_id,
                    signal.subject.user_id,
                    signal.subject.action_type,
                    signal.kind.as_str(),
                    signal.tier_at_time.as_str(),
                    signal.occurred_at.to_rfc3339(),
                    signal.recorded_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        Ok(rows > 0)
    }

    /// All signals for a subject in occurrence order, the replay path.
    pub fn signals_for_subject(&self, subject: &Subject) -> Result<Vec<Signal>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, org_id, user_id, action_type, kind, tier_at_time, occurred_at, recorded_at
                 FROM signals
                 WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3
                 ORDER BY occurred_at ASC, recorded_at ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![subject.org_id, subject.user_id, subject.action_type],
                row_to_signal,
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Per-kind tallies for signals at or after `since`.
    pub fn window_counts(&self, subject: &Subject, since: DateTime<Utc>) -> Result<SignalCounts> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT kind, COUNT(*) FROM signals
                 WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3 AND occurred_at >= ?4
                 GROUP BY kind",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    subject.org_id,
                    subject.user_id,
                    subject.action_type,
                    since.to_rfc3339()
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut counts = SignalCounts::default();
        for (kind, n) in rows {
            if let Some(kind) = SignalKind::parse(&kind) {
                counts.add_many(kind, n as u64);
            }
        }
        Ok(counts)
    }

    /// Per-kind tallies over the subject's full history.
    pub fn lifetime_counts(&self, subject: &Subject) -> Result<SignalCounts> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT kind, COUNT(*) FROM signals
                 WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3
                 GROUP BY kind",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![subject.org_id, subject.user_id, subject.action_type],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut counts = SignalCounts::default();
        for (kind, n) in rows {
            if let Some(kind) = SignalKind::parse(&kind) {
                counts.add_many(kind, n as u64);
            }
        }
        Ok(counts)
    }

    /// Kinds of the most recent `limit` signals, newest first.
    pub fn recent_kinds(&self, subject: &Subject, limit: usize) -> Result<Vec<SignalKind>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT kind FROM signals
                 WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3
                 ORDER BY occurred_at DESC, recorded_at DESC
                 LIMIT ?4",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    subject.org_id,
                    subject.user_id,
                    subject.action_type,
                    limit as i64
                ],
                |row| {
                    let raw: String = row.get(0)?;
                    SignalKind::parse(&raw)
                        .ok_or_else(|| bad_column(0, format!("unknown signal kind '{raw}'")))
                },
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Distinct UTC calendar days on which the subject produced a signal.
    pub fn distinct_active_days(&self, subject: &Subject) -> Result<u32> {
        let db = self.db.lock();
        let n: i64 = db
            .query_row(
                "SELECT COUNT(DISTINCT substr(occurred_at, 1, 10)) FROM signals
                 WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3",
                params![subject.org_id, subject.user_id, subject.action_type],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(n as u32)
    }

    pub fn count_signals(&self) -> Result<u64> {
        let db = self.db.lock();
        let n: i64 = db
            .query_row("SELECT COUNT(*) FROM signals", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as u64)
    }

    /// Org-wide signal volume over the trailing window.
    pub fn signal_burn(&self, org_id: &str, window_days: i64) -> Result<BurnSummary> {
        let since = (Utc::now() - Duration::days(window_days)).to_rfc3339();
        let db = self.db.lock();

        let mut stmt = db
            .prepare(
                "SELECT kind, COUNT(*) FROM signals
                 WHERE org_id = ?1 AND occurred_at >= ?2
                 GROUP BY kind",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![org_id, since], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;

        let mut counts = SignalCounts::default();
        for (kind, n) in rows {
            if let Some(kind) = SignalKind::parse(&kind) {
                counts.add_many(kind, n as u64);
            }
        }

        let active_users: i64 = db
            .query_row(
                "SELECT COUNT(DISTINCT user_id) FROM signals
                 WHERE org_id = ?1 AND occurred_at >= ?2",
                params![org_id, since],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        Ok(BurnSummary {
            window_days,
            counts,
            active_users: active_users as u64,
        })
    }

    // ── Confidence records ─────────────────────────────────────

    pub fn get_record(&self, subject: &Subject) -> Result<Option<ConfidenceRecord>> {
        let db = self.db.lock();
        db.query_row(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM confidence_records
                 WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3"
            ),
            params![subject.org_id, subject.user_id, subject.action_type],
            row_to_record,
        )
        .optional()
        .map_err(db_err)
    }

    pub fn upsert_record(&self, record: &ConfidenceRecord) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO confidence_records
                 (org_id, user_id, action_type, tier, score,
                  approval_rate, clean_approval_rate, edit_rate, rejection_rate, undo_rate,
                  total_signals, total_approved, total_rejected, total_undone,
                  last_30_score, days_active, promotion_eligible, cooldown_until,
                  never_promote, extra_required_signals,
                  first_signal_at, last_signal_at, last_scored_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                     ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
             ON CONFLICT(org_id, user_id, action_type) DO UPDATE SET
                tier = excluded.tier,
                score = excluded.score,
                approval_rate = excluded.approval_rate,
                clean_approval_rate = excluded.clean_approval_rate,
                edit_rate = excluded.edit_rate,
                rejection_rate = excluded.rejection_rate,
                undo_rate = excluded.undo_rate,
                total_signals = excluded.total_signals,
                total_approved = excluded.total_approved,
                total_rejected = excluded.total_rejected,
                total_undone = excluded.total_undone,
                last_30_score = excluded.last_30_score,
                days_active = excluded.days_active,
                promotion_eligible = excluded.promotion_eligible,
                cooldown_until = excluded.cooldown_until,
                never_promote = excluded.never_promote,
                extra_required_signals = excluded.extra_required_signals,
                first_signal_at = excluded.first_signal_at,
                last_signal_at = excluded.last_signal_at,
                last_scored_at = excluded.last_scored_at,
                updated_at = excluded.updated_at",
            params![
                record.subject.org_id,
                record.subject.user_id,
                record.subject.action_type,
                record.tier.as_str(),
                record.score,
                record.approval_rate,
                record.clean_approval_rate,
                record.edit_rate,
                record.rejection_rate,
                record.undo_rate,
                record.total_signals as i64,
                record.total_approved as i64,
                record.total_rejected as i64,
                record.total_undone as i64,
                record.last_30_score,
                record.days_active as i64,
                record.promotion_eligible as i32,
                record.cooldown_until.map(|t| t.to_rfc3339()),
                record.never_promote as i32,
                record.extra_required_signals as i64,
                record.first_signal_at.map(|t| t.to_rfc3339()),
                record.last_signal_at.map(|t| t.to_rfc3339()),
                record.last_scored_at.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Every subject that has a confidence record, across all orgs.
    pub fn all_subjects(&self) -> Result<Vec<Subject>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT org_id, user_id, action_type FROM confidence_records
                 ORDER BY org_id, user_id, action_type",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Subject {
                    org_id: row.get(0)?,
                    user_id: row.get(1)?,
                    action_type: row.get(2)?,
                })
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// All confidence records for an org, the dashboard matrix source.
    pub fn org_records(&self, org_id: &str) -> Result<Vec<ConfidenceRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM confidence_records
                 WHERE org_id = ?1
                 ORDER BY user_id, action_type"
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![org_id], row_to_record)
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    // ── Events ─────────────────────────────────────────────────

    pub fn append_event(&self, event: &TierEvent) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO events
                 (id, org_id, user_id, action_type, event_type, from_tier, to_tier,
                  confidence_score_at_time, trigger_reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                event.id.to_string(),
                event.subject.org_id,
                event.subject.user_id,
                event.subject.action_type,
                event.event_type.as_str(),
                event.from_tier.map(|t| t.as_str()),
                event.to_tier.map(|t| t.as_str()),
                event.confidence_score_at_time,
                event.trigger_reason,
                event.created_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Event history for a subject, newest first.
    pub fn events_for_subject(&self, subject: &Subject, limit: usize) -> Result<Vec<TierEvent>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT id, org_id, user_id, action_type, event_type, from_tier, to_tier,
                        confidence_score_at_time, trigger_reason, created_at
                 FROM events
                 WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3
                 ORDER BY created_at DESC
                 LIMIT ?4",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![
                    subject.org_id,
                    subject.user_id,
                    subject.action_type,
                    limit as i64
                ],
                row_to_event,
            )
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    /// Lifetime event totals by type, for the metrics endpoint.
    pub fn event_counts(&self) -> Result<Vec<(EventType, u64)>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT event_type, COUNT(*) FROM events GROUP BY event_type")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows
            .into_iter()
            .filter_map(|(t, n)| EventType::parse(&t).map(|t| (t, n as u64)))
            .collect())
    }

    // ── Ceilings & overrides ───────────────────────────────────

    pub fn upsert_ceiling(
        &self,
        org_id: &str,
        action_type: &str,
        policy: &CeilingPolicy,
    ) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO ceilings (org_id, action_type, max_ceiling, auto_promotion_eligible, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(org_id, action_type) DO UPDATE SET
                max_ceiling = excluded.max_ceiling,
                auto_promotion_eligible = excluded.auto_promotion_eligible,
                updated_at = excluded.updated_at",
            params![
                org_id,
                action_type,
                policy.max_ceiling.as_str(),
                policy.auto_promotion_eligible as i32,
                policy.updated_at.to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn get_ceiling(&self, org_id: &str, action_type: &str) -> Result<Option<CeilingPolicy>> {
        let db = self.db.lock();
        db.query_row(
            "SELECT max_ceiling, auto_promotion_eligible, updated_at FROM ceilings
             WHERE org_id = ?1 AND action_type = ?2",
            params![org_id, action_type],
            |row| {
                let raw: String = row.get(0)?;
                let max_ceiling = Ceiling::parse(&raw)
                    .ok_or_else(|| bad_column(0, format!("unknown ceiling '{raw}'")))?;
                let updated: String = row.get(2)?;
                Ok(CeilingPolicy {
                    max_ceiling,
                    auto_promotion_eligible: row.get::<_, i32>(1)? != 0,
                    updated_at: parse_ts(2, &updated)?,
                })
            },
        )
        .optional()
        .map_err(db_err)
    }

    /// Every configured ceiling for an org, keyed by action type.
    pub fn list_ceilings(&self, org_id: &str) -> Result<Vec<(String, CeilingPolicy)>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT action_type, max_ceiling, auto_promotion_eligible, updated_at
                 FROM ceilings
                 WHERE org_id = ?1
                 ORDER BY action_type",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![org_id], |row| {
                let action_type: String = row.get(0)?;
                let raw: String = row.get(1)?;
                let max_ceiling = Ceiling::parse(&raw)
                    .ok_or_else(|| bad_column(1, format!("unknown ceiling '{raw}'")))?;
                let updated: String = row.get(3)?;
                Ok((
                    action_type,
                    CeilingPolicy {
                        max_ceiling,
                        auto_promotion_eligible: row.get::<_, i32>(2)? != 0,
                        updated_at: parse_ts(3, &updated)?,
                    },
                ))
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows)
    }

    pub fn upsert_override(&self, subject: &Subject, policy: OverridePolicy) -> Result<()> {
        let db = self.db.lock();
        db.execute(
            "INSERT INTO overrides (org_id, user_id, action_type, policy, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(org_id, user_id, action_type) DO UPDATE SET
                policy = excluded.policy,
                updated_at = excluded.updated_at",
            params![
                subject.org_id,
                subject.user_id,
                subject.action_type,
                policy.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn get_override(&self, subject: &Subject) -> Result<Option<OverridePolicy>> {
        let db = self.db.lock();
        db.query_row(
            "SELECT policy FROM overrides
             WHERE org_id = ?1 AND user_id = ?2 AND action_type = ?3",
            params![subject.org_id, subject.user_id, subject.action_type],
            |row| {
                let raw: String = row.get(0)?;
                OverridePolicy::parse(&raw)
                    .ok_or_else(|| bad_column(0, format!("unknown override policy '{raw}'")))
            },
        )
        .optional()
        .map_err(db_err)
    }

    /// Override pins within an org for an action type. Ceiling changes are
    /// checked against these before they apply.
    pub fn org_override_pins(&self, org_id: &str, action_type: &str) -> Result<Vec<Tier>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT policy FROM overrides
                 WHERE org_id = ?1 AND action_type = ?2",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![org_id, action_type], |row| {
                row.get::<_, String>(0)
            })
            .map_err(db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err)?;
        Ok(rows
            .iter()
            .filter_map(|s| OverridePolicy::parse(s).and_then(|p| p.pinned_tier()))
            .collect())
    }

    // ── Nudges ─────────────────────────────────────────────────

    /// Enqueue a milestone nudge. Returns false when this (user, action,
    /// tier) milestone is already pending; enqueue is idempotent.
    pub fn enqueue_nudge(&self, nudge: &Nudge) -> Result<bool> {
        let db = self.db.lock();
        let rows = db
            .execute(
                "INSERT OR IGNORE INTO nudges
                     (id, org_id, user_id, action_type, tier, event_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    nudge.id.to_string(),
                    nudge.org_id,
                    nudge.user_id,
                    nudge.action_type,
                    nudge.tier.as_str(),
                    nudge.event_id.to_string(),
                    nudge.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        Ok(rows > 0)
    }

    /// Claim the oldest pending nudge for a user. Destructive: the claimed
    /// row is deleted in the same transaction, so a milestone is delivered
    /// at most once even under retried polling.
    pub fn pull_nudge(&self, user_id: &str) -> Result<Option<Nudge>> {
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(db_err)?;

        let nudge = tx
            .query_row(
                "SELECT id, org_id, user_id, action_type, tier, event_id, created_at
                 FROM nudges
                 WHERE user_id = ?1
                 ORDER BY created_at ASC
                 LIMIT 1",
                params![user_id],
                row_to_nudge,
            )
            .optional()
            .map_err(db_err)?;

        if let Some(ref n) = nudge {
            tx.execute("DELETE FROM nudges WHERE id = ?1", params![n.id.to_string()])
                .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;
        Ok(nudge)
    }

    pub fn count_pending_nudges(&self) -> Result<u64> {
        let db = self.db.lock();
        let n: i64 = db
            .query_row("SELECT COUNT(*) FROM nudges", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(n as u64)
    }
}

// ── Row mapping ────────────────────────────────────────────────

const RECORD_COLUMNS: &str = "org_id, user_id, action_type, tier, score, \
     approval_rate, clean_approval_rate, edit_rate, rejection_rate, undo_rate, \
     total_signals, total_approved, total_rejected, total_undone, \
     last_30_score, days_active, promotion_eligible, cooldown_until, \
     never_promote, extra_required_signals, first_signal_at, last_signal_at, last_scored_at";

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConfidenceRecord> {
    let tier_raw: String = row.get(3)?;
    let tier =
        Tier::parse(&tier_raw).ok_or_else(|| bad_column(3, format!("unknown tier '{tier_raw}'")))?;
    Ok(ConfidenceRecord {
        subject: Subject {
            org_id: row.get(0)?,
            user_id: row.get(1)?,
            action_type: row.get(2)?,
        },
        tier,
        score: row.get(4)?,
        approval_rate: row.get(5)?,
        clean_approval_rate: row.get(6)?,
        edit_rate: row.get(7)?,
        rejection_rate: row.get(8)?,
        undo_rate: row.get(9)?,
        total_signals: row.get::<_, i64>(10)? as u64,
        total_approved: row.get::<_, i64>(11)? as u64,
        total_rejected: row.get::<_, i64>(12)? as u64,
        total_undone: row.get::<_, i64>(13)? as u64,
        last_30_score: row.get(14)?,
        days_active: row.get::<_, i64>(15)? as u32,
        promotion_eligible: row.get::<_, i32>(16)? != 0,
        cooldown_until: parse_opt_ts(17, row.get(17)?)?,
        never_promote: row.get::<_, i32>(18)? != 0,
        extra_required_signals: row.get::<_, i64>(19)? as u32,
        first_signal_at: parse_opt_ts(20, row.get(20)?)?,
        last_signal_at: parse_opt_ts(21, row.get(21)?)?,
        last_scored_at: parse_opt_ts(22, row.get(22)?)?,
    })
}

fn row_to_signal(row: &rusqlite::Row<'_>) -> rusqlite::Result<Signal> {
    let id_raw: String = row.get(0)?;
    let id = Uuid::parse_str(&id_raw)
        .map_err(|e| bad_column(0, format!("bad signal id '{id_raw}': {e}")))?;
    let kind_raw: String = row.get(4)?;
    let kind = SignalKind::parse(&kind_raw)
        .ok_or_else(|| bad_column(4, format!("unknown signal kind '{kind_raw}'")))?;
    let tier_raw: String = row.get(5)?;
    let tier_at_time =
        Tier::parse(&tier_raw).ok_or_else(|| bad_column(5, format!("unknown tier '{tier_raw}'")))?;
    let occurred: String = row.get(6)?;
    let recorded: String = row.get(7)?;
    Ok(Signal {
        id,
        subject: Subject {
            org_id: row.get(1)?,
            user_id: row.get(2)?,
            action_type: row.get(3)?,
        },
        kind,
        tier_at_time,
        occurred_at: parse_ts(6, &occurred)?,
        recorded_at: parse_ts(7, &recorded)?,
    })
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<TierEvent> {
    let id_raw: String = row.get(0)?;
    let id = Uuid::parse_str(&id_raw)
        .map_err(|e| bad_column(0, format!("bad event id '{id_raw}': {e}")))?;
    let type_raw: String = row.get(4)?;
    let event_type = EventType::parse(&type_raw)
        .ok_or_else(|| bad_column(4, format!("unknown event type '{type_raw}'")))?;
    let from_raw: Option<String> = row.get(5)?;
    let to_raw: Option<String> = row.get(6)?;
    let created: String = row.get(9)?;
    Ok(TierEvent {
        id,
        subject: Subject {
            org_id: row.get(1)?,
            user_id: row.get(2)?,
            action_type: row.get(3)?,
        },
        event_type,
        from_tier: from_raw.as_deref().and_then(Tier::parse),
        to_tier: to_raw.as_deref().and_then(Tier::parse),
        confidence_score_at_time: row.get(7)?,
        trigger_reason: row.get(8)?,
        created_at: parse_ts(9, &created)?,
    })
}

fn row_to_nudge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Nudge> {
    let id_raw: String = row.get(0)?;
    let id = Uuid::parse_str(&id_raw)
        .map_err(|e| bad_column(0, format!("bad nudge id '{id_raw}': {e}")))?;
    let tier_raw: String = row.get(4)?;
    let tier =
        Tier::parse(&tier_raw).ok_or_else(|| bad_column(4, format!("unknown tier '{tier_raw}'")))?;
    let event_raw: String = row.get(5)?;
    let event_id = Uuid::parse_str(&event_raw)
        .map_err(|e| bad_column(5, format!("bad event id '{event_raw}': {e}")))?;
    let created: String = row.get(6)?;
    Ok(Nudge {
        id,
        org_id: row.get(1)?,
        user_id: row.get(2)?,
        action_type: row.get(3)?,
        tier,
        event_id,
        created_at: parse_ts(6, &created)?,
    })
}
