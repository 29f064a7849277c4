//! Scan progress reporting.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Stage a library scan is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ScanPhase {
    #[default]
    Walking,
    Parsing,
    Grouping,
    Reconciling,
    Done,
}

/// Progress information during a scan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanProgress {
    pub phase: ScanPhase,
    /// Media files found so far.
    pub files_found: u64,
    /// Series detected by grouping.
    pub series_total: u64,
    /// Series reconciled so far.
    pub series_done: u64,
    /// Path or series currently being processed.
    pub current_path: PathBuf,
    /// Number of issues encountered.
    pub errors_count: u64,
    /// Time elapsed since the scan started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Progress snapshot for a phase change.
    pub fn phase(phase: ScanPhase, elapsed: Duration) -> Self {
        Self {
            phase,
            elapsed,
            ..Self::default()
        }
    }

    /// Fraction of series reconciled, if known.
    pub fn series_fraction(&self) -> Option<f64> {
        (self.series_total > 0).then(|| self.series_done as f64 / self.series_total as f64)
    }

    /// Files found per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_found as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_fraction() {
        let mut progress = ScanProgress::phase(ScanPhase::Reconciling, Duration::from_secs(2));
        assert_eq!(progress.series_fraction(), None);
        progress.series_total = 4;
        progress.series_done = 1;
        assert_eq!(progress.series_fraction(), Some(0.25));
    }

    #[test]
    fn test_files_per_second() {
        let progress = ScanProgress {
            files_found: 100,
            elapsed: Duration::from_secs(4),
            ..ScanProgress::default()
        };
        assert_eq!(progress.files_per_second(), 25.0);
        assert_eq!(ScanProgress::default().files_per_second(), 0.0);
    }
}
