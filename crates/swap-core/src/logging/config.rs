//! Logging configuration.
//!
//! Resolution, lowest to highest precedence:
//! - defaults (human format, `info`)
//! - `RUST_LOG`, taken verbatim as an `EnvFilter` directive
//! - `SWAP_LOG` (a plain level) and `SWAP_LOG_FORMAT`
//! - CLI flags (`-v`, `-q`, `--log-format`)
//!
//! `SWAP_LOG_TIMESTAMPS=0` drops timestamps from human output.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable console format (default).
    #[default]
    Human,
    /// Machine-parseable JSON lines.
    Jsonl,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" | "console" | "pretty" => Ok(LogFormat::Human),
            "jsonl" | "json" | "structured" => Ok(LogFormat::Jsonl),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

/// Log level filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Completely silent.
    Off,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            "off" | "none" | "quiet" => Ok(LogLevel::Off),
            _ => Err(format!("unknown log level: {}", s)),
        }
    }
}

/// Resolved logging settings for one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: LogLevel,
    /// Full `RUST_LOG` directive; wins over `level` when it parses.
    pub directives: Option<String>,
    /// Whether to include timestamps in human output.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            format: LogFormat::Human,
            level: LogLevel::Info,
            directives: None,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Resolve from the process environment and CLI overrides.
    pub fn from_env(cli_level: Option<LogLevel>, cli_format: Option<LogFormat>) -> Self {
        Self::resolve(|name| std::env::var(name).ok(), cli_level, cli_format)
    }

    fn resolve(
        var: impl Fn(&str) -> Option<String>,
        cli_level: Option<LogLevel>,
        cli_format: Option<LogFormat>,
    ) -> Self {
        let mut config = LogConfig::default();

        match var("SWAP_LOG").and_then(|v| v.parse::<LogLevel>().ok()) {
            Some(level) => config.level = level,
            None => config.directives = var("RUST_LOG").filter(|v| !v.trim().is_empty()),
        }
        if let Some(format) = var("SWAP_LOG_FORMAT").and_then(|v| v.parse().ok()) {
            config.format = format;
        }
        if let Some(v) = var("SWAP_LOG_TIMESTAMPS") {
            config.timestamps = !matches!(v.trim(), "0" | "false" | "off" | "no");
        }

        if let Some(level) = cli_level {
            config.level = level;
            config.directives = None;
        }
        if let Some(format) = cli_format {
            config.format = format;
        }
        config
    }

    /// Subscriber filter; falls back to `level` when the directive is bad.
    pub fn env_filter(&self) -> EnvFilter {
        self.directives
            .as_deref()
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(|| EnvFilter::new(self.level.directive()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Jsonl);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("quiet".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn swap_log_beats_rust_log() {
        let vars = env(&[("SWAP_LOG", "error"), ("RUST_LOG", "debug")]);
        let config = LogConfig::resolve(vars, None, None);
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.directives, None);

        let config = LogConfig::resolve(
            env(&[("RUST_LOG", "swap_core=debug"), ("SWAP_LOG_FORMAT", "jsonl")]),
            None,
            None,
        );
        assert_eq!(config.directives.as_deref(), Some("swap_core=debug"));
        assert_eq!(config.format, LogFormat::Jsonl);
    }

    #[test]
    fn cli_overrides_env() {
        let config = LogConfig::resolve(
            env(&[("RUST_LOG", "trace"), ("SWAP_LOG_FORMAT", "jsonl")]),
            Some(LogLevel::Error),
            Some(LogFormat::Human),
        );
        assert_eq!(config.level, LogLevel::Error);
        assert_eq!(config.directives, None);
        assert_eq!(config.format, LogFormat::Human);
    }

    #[test]
    fn timestamps_can_be_disabled() {
        assert!(LogConfig::resolve(env(&[]), None, None).timestamps);
        let config = LogConfig::resolve(env(&[("SWAP_LOG_TIMESTAMPS", "0")]), None, None);
        assert!(!config.timestamps);
    }

    #[test]
    fn filter_prefers_directives_over_level() {
        use tracing_subscriber::filter::LevelFilter;

        let config = LogConfig {
            level: LogLevel::Warn,
            ..LogConfig::default()
        };
        assert_eq!(config.env_filter().max_level_hint(), Some(LevelFilter::WARN));

        let config = LogConfig {
            directives: Some("swap_core=debug".to_string()),
            ..config
        };
        assert_eq!(config.env_filter().max_level_hint(), Some(LevelFilter::DEBUG));
    }
}
