//! SWAP Core Library
//!
//! This library provides the Space Warps Analysis Pipeline estimator:
//! - Volunteer skill and subject posterior models
//! - Online batch scoring and offline EM refinement
//! - Gold-calibrated retirement thresholds
//! - Classification and gold ingestion
//! - Estimator snapshots, reports and CSV exports
//! - Structured logging and CLI exit codes
//!
//! The binary entry point is in `main.rs`.

pub mod collection;
pub mod exit_codes;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod offline;
pub mod persist;
pub mod report;
pub mod swap;
pub mod thresholds;
pub mod trajectory;

pub use collection::{Collection, Keyed, Subjects, Users};
pub use ingest::{
    ingest_csv, ingest_jsonl, ingest_records, parse_golds, ClassificationParser, IngestStats,
    InputFormat, ParseError,
};
pub use model::{Classification, Gold, Retirement, Subject, User, Vote};
pub use offline::{OfflineOptions, OfflineReport};
pub use persist::{StoreError, SwapSnapshot, SwapStore};
pub use report::{export_subjects, export_users, Report, ReportOptions};
pub use swap::{RetirementCounts, Swap};
pub use thresholds::{CutoffSource, Thresholds};
pub use trajectory::Trajectory;
