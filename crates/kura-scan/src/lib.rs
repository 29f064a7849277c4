//! Library scanning for kura.
//!
//! This crate walks library roots in parallel, runs every media file through
//! the filename parser and groups the results into series, volumes and
//! chapters.
//!
//! # Overview
//!
//! - **Parallel traversal** via jwalk/rayon
//! - **Progress updates** via broadcast channels
//! - **Per-library locks** that coalesce overlapping scan requests
//! - **Deterministic grouping** independent of directory enumeration order
//!
//! # Example
//!
//! ```rust,no_run
//! use kura_core::{LibraryConfig, LibraryType, ParserSettings};
//! use kura_scan::ScanOrchestrator;
//!
//! let config = LibraryConfig::new("/srv/manga", LibraryType::Manga);
//! let orchestrator = ScanOrchestrator::new(ParserSettings::default());
//! let scan = orchestrator.scan_libraries_for_series(&config).unwrap();
//!
//! for series in &scan.series {
//!     println!("{}: {} files", series.name, series.file_count());
//! }
//! ```

mod lock;
mod orchestrator;
mod progress;
mod walker;

pub use lock::{LibraryScanLocks, ScanGuard, ScanTicket};
pub use orchestrator::{
    ChapterBucket, LibraryScan, ScanOrchestrator, ScannedFile, ScannedSeries, VolumeBucket,
    group_series,
};
pub use progress::{ScanPhase, ScanProgress};
pub use walker::{DiscoveredFile, LibraryWalker, WalkResult};

// Re-export core types for convenience
pub use kura_core::{LibraryConfig, ScanError, ScanIssue};
