//! Exit codes for the `swap` CLI.
//!
//! Exit code ranges:
//! - 0: success
//! - 10-19: user/environment errors (recoverable by user action)
//! - 20-29: internal errors (bugs, should be reported)

use swap_common::{Error, ErrorCategory};

/// Exit codes for `swap` operations.
///
/// These codes are a stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Clean = 0,

    // ========================================================================
    // User / Environment Errors (10-19)
    // ========================================================================
    /// Invalid arguments
    ArgsError = 10,

    /// Config file missing or invalid
    ConfigError = 11,

    /// Input file unreadable or not in the expected format
    InputError = 12,

    /// Estimator snapshot unreadable or incompatible
    StoreError = 15,

    // ========================================================================
    // Internal Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O error
    IoError = 21,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean)
    }

    /// User/environment error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Internal error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    /// Map a library error onto its exit code.
    pub fn from_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ConfigError,
            ErrorCategory::Ingest => ExitCode::InputError,
            ErrorCategory::Store => ExitCode::StoreError,
            ErrorCategory::Inference => ExitCode::InternalError,
            ErrorCategory::Io => match err {
                Error::Json(_) => ExitCode::InputError,
                _ => ExitCode::IoError,
            },
        }
    }

    /// Error code name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::InputError => "ERR_INPUT",
            ExitCode::StoreError => "ERR_STORE",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_are_consistent() {
        assert!(ExitCode::Clean.is_success());
        assert!(ExitCode::ArgsError.is_user_error());
        assert!(ExitCode::StoreError.is_user_error());
        assert!(ExitCode::IoError.is_internal_error());
        assert!(!ExitCode::ConfigError.is_internal_error());
    }

    #[test]
    fn maps_error_categories() {
        assert_eq!(
            ExitCode::from_error(&Error::SnapshotCorrupted("x".into())),
            ExitCode::StoreError
        );
        assert_eq!(
            ExitCode::from_error(&Error::InvalidConfig("x".into())),
            ExitCode::ConfigError
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "no");
        assert_eq!(ExitCode::from_error(&Error::Io(io)), ExitCode::IoError);
    }

    #[test]
    fn display_includes_code() {
        assert_eq!(ExitCode::StoreError.to_string(), "ERR_STORE (15)");
    }
}
