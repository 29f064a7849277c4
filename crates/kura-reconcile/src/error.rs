//! Error types for reconciliation, persistence and scan jobs.

use std::path::PathBuf;

use kura_core::{LibraryId, ScanError};
use thiserror::Error;

/// Failure reconciling one series. Other series are unaffected.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The stored series belongs to another library.
    #[error("Series `{series}` belongs to library {found}, not {expected}")]
    LibraryMismatch {
        series: String,
        expected: LibraryId,
        found: LibraryId,
    },

    /// Nothing on disk could be read, so the stored graph is left alone.
    #[error("Series `{series}` has no readable files")]
    NoReadableFiles { series: String },

    /// The persistence collaborator refused the change set.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by a [`SeriesStore`](crate::SeriesStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Series id is unknown to the store.
    #[error("Series {id} not found")]
    NotFound { id: u64 },

    /// Reading or writing backing storage failed.
    #[error("Store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Backing storage could not be decoded.
    #[error("Store at {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    /// The change set conflicts with stored state.
    #[error("Store rejected series `{series}`: {message}")]
    Rejected { series: String, message: String },
}

/// Errors that abort a library scan job.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Existing series could not be loaded, so nothing can be diffed.
    #[error("Failed to load library {library}: {source}")]
    Load {
        library: LibraryId,
        #[source]
        source: StoreError,
    },

    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_messages() {
        let err = StoreError::NotFound { id: 42 };
        assert_eq!(err.to_string(), "Series 42 not found");

        let err = ReconcileError::from(StoreError::Rejected {
            series: "Beelzebub".into(),
            message: "duplicate".into(),
        });
        assert_eq!(err.to_string(), "Store rejected series `Beelzebub`: duplicate");
    }

    #[test]
    fn test_job_error_wraps_scan_error() {
        let err = JobError::from(ScanError::Cancelled);
        assert_eq!(err.to_string(), "Scan cancelled");
    }
}
