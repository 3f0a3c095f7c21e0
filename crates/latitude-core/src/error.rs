use thiserror::Error;

/// Unified error type for the entire Latitude engine.
#[derive(Error, Debug)]
pub enum LatitudeError {
    // ── Ingestion errors ───────────────────────────────────────
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("lost update race on {subject} after {attempts} attempts")]
    Conflict { subject: String, attempts: u32 },

    // ── Policy errors ──────────────────────────────────────────
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    // ── Storage errors ─────────────────────────────────────────
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("not found: {0}")]
    NotFound(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, LatitudeError>;
