//! Estimator configuration.
//!
//! The configuration travels with every persisted estimator so a snapshot
//! always rescores with the settings it was built with. Resolution of the
//! initial configuration lives in [`resolve`].

pub mod resolve;

pub use resolve::{compute_sha256, ConfigResolution, ConfigResolver, ConfigSource};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// How a classification's annotation payload is turned into a vote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    /// Workflow task whose answer carries the vote.
    pub task: String,
    /// Optional path into the task value, e.g. `"0.details"`.
    pub value_key: Option<String>,
    /// Separator used to split `value_key`.
    pub value_separator: String,
    /// Scalar answers meaning "real".
    pub true_values: Vec<Value>,
    /// Scalar answers meaning "bogus".
    pub false_values: Vec<Value>,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            task: "T0".to_string(),
            value_key: None,
            value_separator: ".".to_string(),
            true_values: vec![Value::from(1)],
            false_values: vec![Value::from(0)],
        }
    }
}

/// Subject update rule used in the EM E-step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EStep {
    /// Posterior from the product of every vote likelihood (log domain).
    #[default]
    JointLikelihood,
    /// Summed per-vote terms divided by the number of observations.
    Averaged,
}

/// How converged EM confusions are written back into user counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillBackfill {
    /// Synthesize counts from population-level real/bogus totals.
    #[default]
    PopulationScaled,
    /// Expected per-vote counts from the converged subject probabilities.
    ExpectedCounts,
}

/// Offline EM parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Stop once the mean absolute probability change drops below this.
    pub epsilon: f64,
    /// Minimum iterations when gold labels are authoritative.
    pub min_iterations_supervised: usize,
    /// Minimum iterations in unsupervised or gold-ignoring runs.
    pub min_iterations_unsupervised: usize,
    /// Hard iteration cap.
    pub max_iterations: usize,
    pub e_step: EStep,
    pub skill_backfill: SkillBackfill,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-8,
            min_iterations_supervised: 2,
            min_iterations_unsupervised: 40,
            max_iterations: 1000,
            e_step: EStep::default(),
            skill_backfill: SkillBackfill::default(),
        }
    }
}

/// Complete estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub annotation: AnnotationConfig,
    /// Prior probability that a fresh subject is real.
    pub p0: f64,
    /// Laplace pseudo-count for user skills.
    pub gamma: f64,
    /// Target false-positive rate for retirement calibration.
    pub fpr: f64,
    /// Target missed-detection rate for retirement calibration.
    pub mdr: f64,
    /// Bogus cutoff used when no real gold subjects exist.
    pub p_retire_dud: f64,
    /// Real cutoff used when no bogus gold subjects exist.
    pub p_retire_lens: f64,
    /// Whether gold subjects take part in retirement.
    pub retire_gold: bool,
    pub offline: OfflineConfig,
    pub online_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            annotation: AnnotationConfig::default(),
            p0: 2e-4,
            gamma: 1.0,
            fpr: 0.01,
            mdr: 0.1,
            p_retire_dud: 1e-3,
            p_retire_lens: 0.9,
            retire_gold: false,
            offline: OfflineConfig::default(),
            online_name: None,
        }
    }
}

impl Config {
    /// Parse a config from JSON and validate it.
    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)
            .map_err(|e| Error::InvalidConfig(format!("parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation.
    pub fn validate(&self) -> Result<()> {
        let open_unit = [
            ("p0", self.p0),
            ("p_retire_dud", self.p_retire_dud),
            ("p_retire_lens", self.p_retire_lens),
        ];
        for (name, value) in open_unit {
            if !(value > 0.0 && value < 1.0) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be in (0, 1), got {}",
                    name, value
                )));
            }
        }
        for (name, value) in [("fpr", self.fpr), ("mdr", self.mdr)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(self.gamma > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "gamma must be positive, got {}",
                self.gamma
            )));
        }
        if self.p_retire_dud >= self.p_retire_lens {
            return Err(Error::InvalidConfig(format!(
                "p_retire_dud ({}) must be below p_retire_lens ({})",
                self.p_retire_dud, self.p_retire_lens
            )));
        }
        if self.offline.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "offline.max_iterations must be at least 1".to_string(),
            ));
        }
        if !(self.offline.epsilon >= 0.0) {
            return Err(Error::InvalidConfig(
                "offline.epsilon must be non-negative".to_string(),
            ));
        }
        if self.annotation.task.is_empty() {
            return Err(Error::InvalidConfig(
                "annotation.task must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().expect("defaults are valid");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = Config::from_json(r#"{"p0": 0.01, "offline": {"max_iterations": 50}}"#)
            .expect("parse");
        assert_eq!(config.p0, 0.01);
        assert_eq!(config.offline.max_iterations, 50);
        assert_eq!(config.offline.min_iterations_unsupervised, 40);
        assert_eq!(config.annotation.task, "T0");
    }

    #[test]
    fn rejects_degenerate_prior() {
        let err = Config::from_json(r#"{"p0": 1.0}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_crossed_fallback_cutoffs() {
        let config = Config {
            p_retire_dud: 0.95,
            p_retire_lens: 0.9,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn enums_use_snake_case() {
        let json = serde_json::to_string(&OfflineConfig::default()).unwrap();
        assert!(json.contains("\"joint_likelihood\""));
        assert!(json.contains("\"population_scaled\""));
    }
}
