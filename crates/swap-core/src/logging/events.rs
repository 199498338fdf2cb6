//! Structured event vocabulary.
//!
//! Every event carries the run id, the estimator name and a pipeline stage
//! so JSONL output from several runs can be merged and filtered.

use serde::{Deserialize, Serialize};

/// Log levels as they appear in JSONL output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Pipeline stages of an estimator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and configuration.
    Init,
    /// Classification stream ingestion.
    Ingest,
    /// Online scoring cycle.
    Score,
    /// Offline EM refinement.
    Offline,
    /// Gold label application.
    Gold,
    /// Threshold calibration and retirement.
    Retire,
    /// Snapshot load and save.
    Persist,
    /// Report and export generation.
    Report,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Ingest => "ingest",
            Stage::Score => "score",
            Stage::Offline => "offline",
            Stage::Gold => "gold",
            Stage::Retire => "retire",
            Stage::Persist => "persist",
            Stage::Report => "report",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config/init
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";

    // Ingest stage
    pub const INGEST_STARTED: &str = "ingest.started";
    pub const INGEST_RECORD_SKIPPED: &str = "ingest.record_skipped";
    pub const INGEST_DUPLICATE: &str = "ingest.duplicate";
    pub const INGEST_FINISHED: &str = "ingest.finished";

    // Score stage
    pub const SCORE_USERS: &str = "score.users";
    pub const SCORE_SUBJECTS: &str = "score.subjects";
    pub const SCORE_CYCLE_FINISHED: &str = "score.cycle_finished";

    // Offline stage
    pub const OFFLINE_STARTED: &str = "offline.started";
    pub const OFFLINE_ITERATION: &str = "offline.iteration";
    pub const OFFLINE_FINISHED: &str = "offline.finished";
    pub const OFFLINE_NOT_CONVERGED: &str = "offline.not_converged";

    // Gold stage
    pub const GOLD_APPLIED: &str = "gold.applied";

    // Retire stage
    pub const RETIRE_THRESHOLDS: &str = "retire.thresholds";
    pub const RETIRE_FINISHED: &str = "retire.finished";

    // Persist stage
    pub const PERSIST_LOADED: &str = "persist.loaded";
    pub const PERSIST_INITIALIZED: &str = "persist.initialized";
    pub const PERSIST_SAVED: &str = "persist.saved";
    pub const PERSIST_REMOVED: &str = "persist.removed";

    // Report stage
    pub const REPORT_WRITTEN: &str = "report.written";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation fields attached to every event an estimator emits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogContext {
    /// Unique ID for this invocation.
    pub run_id: String,
    /// Name of the estimator being driven.
    pub estimator: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, estimator: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            estimator: estimator.into(),
        }
    }

    /// Context with a fresh run id.
    pub fn for_estimator(estimator: impl Into<String>) -> Self {
        Self::new(super::generate_run_id(), estimator)
    }
}
