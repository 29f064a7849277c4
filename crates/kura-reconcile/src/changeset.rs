//! The staged difference between stored and on-disk state for one series.

use std::path::PathBuf;

use compact_str::CompactString;
use serde::Serialize;

use kura_core::{ChapterId, FileId, SeriesId, VolumeId};

/// A volume inserted or removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeChange {
    /// `None` for volumes created this pass.
    pub id: Option<VolumeId>,
    pub name: CompactString,
    pub min_number: f32,
}

/// A chapter inserted or removed, keyed by its owning volume name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterChange {
    pub id: Option<ChapterId>,
    pub volume: CompactString,
    pub range: CompactString,
    pub is_special: bool,
}

/// A file inserted, removed or refreshed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileChange {
    pub id: Option<FileId>,
    pub path: PathBuf,
    pub volume: CompactString,
    pub chapter: CompactString,
}

/// A file that kept its path but now belongs to another chapter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMove {
    pub id: Option<FileId>,
    pub path: PathBuf,
    /// Volume and chapter range the file left.
    pub from: (CompactString, CompactString),
    /// Volume and chapter range the file joined.
    pub to: (CompactString, CompactString),
}

/// Inserts, updates and removals needed to converge one series to disk.
///
/// Persistence applies a change set inside its own transaction; entities
/// created here carry no id until it does.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    pub series_id: Option<SeriesId>,
    pub series_name: String,
    /// The series did not exist before this pass.
    pub created: bool,
    /// A tombstoned series reappeared on disk.
    pub revived: bool,
    /// The series vanished and is kept as a tombstone.
    pub tombstoned: bool,
    /// Format, folder or localized name changed.
    pub metadata_changed: bool,
    /// The file supplying the series cover changed.
    pub cover_changed: bool,
    pub added_volumes: Vec<VolumeChange>,
    pub removed_volumes: Vec<VolumeChange>,
    pub added_chapters: Vec<ChapterChange>,
    pub removed_chapters: Vec<ChapterChange>,
    pub added_files: Vec<FileChange>,
    pub removed_files: Vec<FileChange>,
    pub moved_files: Vec<FileMove>,
    /// Files whose size or modification time advanced.
    pub refreshed_files: Vec<FileChange>,
}

impl ChangeSet {
    pub fn new(series_id: Option<SeriesId>, series_name: impl Into<String>) -> Self {
        Self {
            series_id,
            series_name: series_name.into(),
            ..Self::default()
        }
    }

    /// Whether applying this change set would be a no-op.
    pub fn is_empty(&self) -> bool {
        !self.created
            && !self.revived
            && !self.tombstoned
            && !self.metadata_changed
            && !self.cover_changed
            && self.added_volumes.is_empty()
            && self.removed_volumes.is_empty()
            && self.added_chapters.is_empty()
            && self.removed_chapters.is_empty()
            && self.added_files.is_empty()
            && self.removed_files.is_empty()
            && self.moved_files.is_empty()
            && self.refreshed_files.is_empty()
    }

    /// Paths whose page count or cover must be recomputed.
    pub fn files_to_inspect(&self) -> impl Iterator<Item = &PathBuf> {
        self.added_files
            .iter()
            .chain(self.refreshed_files.iter())
            .map(|f| &f.path)
    }

    /// One-line summary for logs.
    pub fn summary(&self) -> String {
        format!(
            "+{}v -{}v +{}c -{}c +{}f -{}f ~{}f >{}f",
            self.added_volumes.len(),
            self.removed_volumes.len(),
            self.added_chapters.len(),
            self.removed_chapters.len(),
            self.added_files.len(),
            self.removed_files.len(),
            self.refreshed_files.len(),
            self.moved_files.len(),
        )
    }
}
