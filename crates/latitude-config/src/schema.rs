use latitude_core::Tier;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Root configuration, maps to `latitude.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatitudeConfig {
    pub engine: EngineTuning,
    pub storage: StorageConfig,
    pub sweep: SweepConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

// ── Engine tuning ──────────────────────────────────────────────

/// The numeric policy of the confidence engine. Thresholds are per promotion
/// *target* tier; cooldowns are per the tier a subject is demoted *from*.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Trailing window for the windowed score, in days.
    pub window_days: i64,
    /// Blend factor for the long-run score: `alpha * windowed + (1 - alpha) * previous`.
    pub ewma_alpha: f64,
    /// Windowed composite weights. Must sum to 1.0.
    pub clean_approval_weight: f64,
    pub rejection_weight: f64,
    pub undo_weight: f64,
    /// Minimum long-run score to enter each tier. Strictly increasing.
    pub promote_score_suggest: f64,
    pub promote_score_approve: f64,
    pub promote_score_auto: f64,
    /// Minimum lifetime signals to enter each tier (before any
    /// post-demotion evidence surcharge).
    pub min_signals_suggest: u64,
    pub min_signals_approve: u64,
    pub min_signals_auto: u64,
    /// Minimum distinct active days to enter each tier.
    pub min_days_active_suggest: u32,
    pub min_days_active_approve: u32,
    pub min_days_active_auto: u32,
    /// Promotion is blocked while the all-time rejection rate exceeds this.
    pub max_rejection_for_promotion: f64,
    /// How many most-recent signals the fast demotion check looks at.
    pub demotion_window: usize,
    /// Rejection fraction over that window that triggers a one-step demotion.
    pub demotion_rejection_threshold: f64,
    /// Re-promotion cooldown after a demotion, keyed by the tier demoted from.
    pub cooldown_days_suggest: i64,
    pub cooldown_days_approve: i64,
    pub cooldown_days_auto: i64,
    /// Added to the signal requirement after each demotion.
    pub evidence_increment: u32,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            window_days: 30,
            ewma_alpha: 0.3,
            clean_approval_weight: 0.5,
            rejection_weight: 0.3,
            undo_weight: 0.2,
            promote_score_suggest: 0.0,
            promote_score_approve: 0.75,
            promote_score_auto: 0.90,
            min_signals_suggest: 1,
            min_signals_approve: 10,
            min_signals_auto: 25,
            min_days_active_suggest: 1,
            min_days_active_approve: 5,
            min_days_active_auto: 10,
            max_rejection_for_promotion: 0.10,
            demotion_window: 10,
            demotion_rejection_threshold: 0.30,
            cooldown_days_suggest: 1,
            cooldown_days_approve: 3,
            cooldown_days_auto: 7,
            evidence_increment: 5,
        }
    }
}

impl EngineTuning {
    /// Score threshold for promotion *into* the given tier.
    pub fn promote_score(&self, target: Tier) -> f64 {
        match target {
            Tier::Disabled => 0.0,
            Tier::Suggest => self.promote_score_suggest,
            Tier::Approve => self.promote_score_approve,
            Tier::Auto => self.promote_score_auto,
        }
    }

    pub fn min_signals(&self, target: Tier) -> u64 {
        match target {
            Tier::Disabled => 0,
            Tier::Suggest => self.min_signals_suggest,
            Tier::Approve => self.min_signals_approve,
            Tier::Auto => self.min_signals_auto,
        }
    }

    pub fn min_days_active(&self, target: Tier) -> u32 {
        match target {
            Tier::Disabled => 0,
            Tier::Suggest => self.min_days_active_suggest,
            Tier::Approve => self.min_days_active_approve,
            Tier::Auto => self.min_days_active_auto,
        }
    }

    /// Cooldown applied when demoted from the given tier. Higher tiers cool
    /// down longer.
    pub fn cooldown(&self, from: Tier) -> chrono::Duration {
        let days = match from {
            Tier::Disabled | Tier::Suggest => self.cooldown_days_suggest,
            Tier::Approve => self.cooldown_days_approve,
            Tier::Auto => self.cooldown_days_auto,
        };
        chrono::Duration::days(days)
    }
}

// ── Storage ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".latitude")
                .join("latitude.db"),
        }
    }
}

// ── Sweep ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Cron expression (with seconds field) for the windowed rescore +
    /// promotion sweep.
    pub cron: String,
    /// Buffer depth of the per-signal rescore queue. Ingestion never blocks
    /// on this queue; a full queue defers the subject to the next sweep.
    pub rescore_queue_depth: usize,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cron: "0 0 3 * * *".into(),
            rescore_queue_depth: 1024,
        }
    }
}

// ── Server ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP listen address.
    pub listen: String,
    /// Optional API key for the control API.
    pub api_key: Option<String>,
    /// Enable CORS (for dashboard development).
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:4800".into(),
            api_key: None,
            cors: false,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,
    /// Log format: pretty, json, compact.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl LatitudeConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();
        let e = &self.engine;

        // ── Promotion thresholds ───
        if !(e.promote_score_suggest < e.promote_score_approve
            && e.promote_score_approve < e.promote_score_auto)
        {
            warnings.push(ConfigWarning {
                field: "engine.promote_score_*".into(),
                message: format!(
                    "thresholds must be strictly increasing, got {} / {} / {}",
                    e.promote_score_suggest, e.promote_score_approve, e.promote_score_auto
                ),
                severity: WarningSeverity::Error,
            });
        }
        for (field, v) in [
            ("engine.promote_score_suggest", e.promote_score_suggest),
            ("engine.promote_score_approve", e.promote_score_approve),
            ("engine.promote_score_auto", e.promote_score_auto),
            ("engine.max_rejection_for_promotion", e.max_rejection_for_promotion),
            ("engine.demotion_rejection_threshold", e.demotion_rejection_threshold),
        ] {
            if !(0.0..=1.0).contains(&v) {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("{v} is outside [0, 1]"),
                    severity: WarningSeverity::Error,
                });
            }
        }

        // ── Blend and weights ───
        if !(e.ewma_alpha > 0.0 && e.ewma_alpha <= 1.0) {
            warnings.push(ConfigWarning {
                field: "engine.ewma_alpha".into(),
                message: format!("{} is outside (0, 1]", e.ewma_alpha),
                severity: WarningSeverity::Error,
            });
        }
        let weight_sum = e.clean_approval_weight + e.rejection_weight + e.undo_weight;
        if e.clean_approval_weight < 0.0 || e.rejection_weight < 0.0 || e.undo_weight < 0.0 {
            warnings.push(ConfigWarning {
                field: "engine.*_weight".into(),
                message: "composite weights must be non-negative".into(),
                severity: WarningSeverity::Error,
            });
        } else if (weight_sum - 1.0).abs() > 1e-6 {
            warnings.push(ConfigWarning {
                field: "engine.*_weight".into(),
                message: format!("composite weights sum to {weight_sum}, expected 1.0"),
                severity: WarningSeverity::Error,
            });
        }

        // ── Demotion window ───
        if e.demotion_window == 0 {
            warnings.push(ConfigWarning {
                field: "engine.demotion_window".into(),
                message: "demotion window must be at least 1 signal".into(),
                severity: WarningSeverity::Error,
            });
        }
        if e.window_days <= 0 {
            warnings.push(ConfigWarning {
                field: "engine.window_days".into(),
                message: "window must be at least 1 day".into(),
                severity: WarningSeverity::Error,
            });
        }

        // ── Evidence requirements ───
        if !(e.min_signals_suggest <= e.min_signals_approve
            && e.min_signals_approve <= e.min_signals_auto)
        {
            warnings.push(ConfigWarning {
                field: "engine.min_signals_*".into(),
                message: "signal requirements should not decrease up the ladder".into(),
                severity: WarningSeverity::Warning,
            });
        }

        // ── Sweep schedule ───
        if cron::Schedule::from_str(&self.sweep.cron).is_err() {
            warnings.push(ConfigWarning {
                field: "sweep.cron".into(),
                message: format!("invalid cron expression '{}'", self.sweep.cron),
                severity: WarningSeverity::Error,
            });
        }

        // ── Server listen address ───
        if self.server.listen.is_empty() {
            warnings.push(ConfigWarning {
                field: "server.listen".into(),
                message: "listen address is empty".into(),
                severity: WarningSeverity::Error,
            });
        } else if self.server.listen.starts_with("0.0.0.0") && self.server.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "server.api_key".into(),
                message: "no API key set while server is network-accessible".into(),
                severity: WarningSeverity::Warning,
            });
        }

        // ── Logging ───
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
            });
        }
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
            });
        }

        if warnings
            .iter()
            .any(|w| w.severity == WarningSeverity::Error)
        {
            let joined = warnings
                .iter()
                .filter(|w| w.severity == WarningSeverity::Error)
                .map(|w| w.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(joined);
        }
        Ok(warnings)
    }
}
