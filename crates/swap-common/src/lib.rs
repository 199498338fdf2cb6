//! SWAP common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the SWAP crates:
//! - Volunteer, subject and classification identity types
//! - The unified error type with stable codes
//! - Estimator configuration and its resolution

pub mod config;
pub mod error;
pub mod id;

pub use config::{
    AnnotationConfig, Config, ConfigResolution, ConfigResolver, ConfigSource, EStep,
    OfflineConfig, SkillBackfill,
};
pub use error::{Error, ErrorCategory, Result};
pub use id::{ClassificationId, SubjectId, UserId};

/// Schema version written into persisted estimator snapshots.
pub const SCHEMA_VERSION: &str = "1.0.0";
