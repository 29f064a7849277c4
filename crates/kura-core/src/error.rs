//! Error and issue types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a whole library scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A library root could not be read at all.
    #[error("Library root is inaccessible: {path}")]
    RootInaccessible { path: PathBuf },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// The scan was cancelled before it started reconciling.
    #[error("Scan cancelled")]
    Cancelled,

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl ScanError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

impl From<ConfigError> for ScanError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfig {
            message: err.to_string(),
        }
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for the expected schema.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// An exclude pattern is not a valid glob.
    #[error("Invalid exclude pattern `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// A library definition failed validation.
    #[error("Invalid library `{library}`: {message}")]
    Library { library: String, message: String },
}

/// Kind of non-fatal scan issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    /// Several rules matched a file name; the earliest rule won.
    ParseAmbiguous,
    /// No rule matched; the file was kept with fallback values.
    ParseFailed,
    /// The file could not be stat'ed or read this pass.
    FileUnreadable,
    /// A series disappeared from disk.
    SeriesVanished,
    /// A numeric token could not be parsed and fell back to a sentinel.
    MalformedRange,
    /// Reconciling or committing one series failed.
    ReconcileFailed,
}

impl IssueKind {
    /// Stable reason code reported to the error collaborator.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::ParseAmbiguous => "parse.ambiguous",
            Self::ParseFailed => "parse.failed",
            Self::FileUnreadable => "file.unreadable",
            Self::SeriesVanished => "series.vanished",
            Self::MalformedRange => "range.malformed",
            Self::ReconcileFailed => "series.reconcile_failed",
        }
    }

    /// Whether the issue should be surfaced as a warning rather than info.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Self::ParseAmbiguous | Self::MalformedRange)
    }
}

/// Non-fatal issue encountered during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanIssue {
    /// Path (file or series folder) the issue relates to.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of issue.
    pub kind: IssueKind,
}

impl ScanIssue {
    /// Create a new scan issue.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: IssueKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create an unreadable-file issue from an I/O error.
    pub fn unreadable(path: impl Into<PathBuf>, error: &std::io::Error) -> Self {
        let path = path.into();
        Self {
            message: format!("Unreadable: {error}"),
            path,
            kind: IssueKind::FileUnreadable,
        }
    }

    /// Create a parse-failure issue.
    pub fn parse_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::new(path, message, IssueKind::ParseFailed)
    }

    /// Create an issue for a numeric token that fell back to a sentinel.
    pub fn malformed_range(path: impl Into<PathBuf>, field: &str, token: &str) -> Self {
        Self::new(
            path,
            format!("Malformed {field} `{token}`, treated as loose-leaf"),
            IssueKind::MalformedRange,
        )
    }

    /// Create a reconciliation-failure issue for a series.
    pub fn reconcile_failed(series: &str, path: impl Into<PathBuf>, reason: &str) -> Self {
        Self::new(
            path,
            format!("Series `{series}` failed to reconcile: {reason}"),
            IssueKind::ReconcileFailed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_io() {
        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, ScanError::PermissionDenied { .. }));

        let err = ScanError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ScanError::NotFound { .. }));
    }

    #[test]
    fn test_unreadable_issue() {
        let err = std::io::Error::new(std::io::ErrorKind::Other, "locked");
        let issue = ScanIssue::unreadable("/lib/a.cbz", &err);
        assert_eq!(issue.kind, IssueKind::FileUnreadable);
        assert!(issue.message.contains("locked"));
        assert!(issue.kind.is_warning());
    }

    #[test]
    fn test_reason_codes_are_distinct() {
        let kinds = [
            IssueKind::ParseAmbiguous,
            IssueKind::ParseFailed,
            IssueKind::FileUnreadable,
            IssueKind::SeriesVanished,
            IssueKind::MalformedRange,
            IssueKind::ReconcileFailed,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.reason_code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }
}
