//! Reconciliation of scanned series against stored state.
//!
//! The [`ReconciliationEngine`] diffs one scanned series against its stored
//! graph and produces a [`ChangeSet`] while keeping entity ids stable. A
//! [`LibraryScanJob`] drives a whole library: it serializes scans per
//! library, reconciles series on a bounded worker pool, hands new and
//! changed files to a [`BookInspector`] and commits through a
//! [`SeriesStore`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kura_core::{LibraryConfig, LibraryType, ParserSettings};
//! use kura_reconcile::{LibraryScanJob, MemoryStore};
//! use kura_scan::ScanOrchestrator;
//! use parking_lot::Mutex;
//!
//! let store = Arc::new(Mutex::new(MemoryStore::new()));
//! let job = LibraryScanJob::new(ScanOrchestrator::new(ParserSettings::default()), store);
//! let report = job
//!     .run(&LibraryConfig::new("/srv/manga", LibraryType::Manga))
//!     .unwrap();
//! println!("{} series added", report.series_added);
//! ```

mod changeset;
mod engine;
mod error;
mod inspector;
mod job;
mod store;

pub use changeset::{ChangeSet, ChapterChange, FileChange, FileMove, VolumeChange};
pub use engine::{ReconcileOutcome, ReconciliationEngine, VanishedOutcome};
pub use error::{JobError, ReconcileError, StoreError};
pub use inspector::{BookInspector, NullInspector};
pub use job::{LibraryScanJob, LibraryScanReport};
pub use store::{MemoryStore, SeriesStore};
