//! Core types and traits for kura.
//!
//! This crate provides the data structures shared by the parser, the scanner
//! and the reconciliation engine: the persisted Series → Volume → Chapter →
//! MangaFile graph, the transient [`ParsedInfo`] produced per file, range math,
//! natural ordering and library configuration.

mod config;
mod entity;
mod error;
mod format;
pub mod lookup;
mod parsed;
mod paths;
pub mod range;
mod sort;

pub use config::{
    KuraConfig, LibraryConfig, LibraryConfigBuilder, LibraryId, ParserSettings, ScanSettings,
};
pub use entity::{
    Chapter, ChapterId, FileId, IdAllocator, MangaFile, Series, SeriesId, Volume, VolumeId,
};
pub use error::{ConfigError, IssueKind, ScanError, ScanIssue};
pub use format::{FileTypeGroup, LibraryType, MangaFormat};
pub use parsed::{FileStat, ParsedInfo};
pub use paths::normalize_path;
pub use sort::NaturalSortComparer;
