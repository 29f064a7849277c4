//! Persisted library entities: Series → Volume → Chapter → MangaFile.
//!
//! Ownership is strictly top-down. Back-references are plain IDs; an entity
//! that has not been persisted yet carries `None` until the store assigns one.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

use crate::config::LibraryId;
use crate::format::MangaFormat;
use crate::parsed::{FileStat, ParsedInfo};
use crate::paths::normalize_path;
use crate::range::{self, NumberRange};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Create a new id from a u64.
            pub fn new(id: u64) -> Self {
                Self(id)
            }
        }
    };
}

entity_id!(
    /// Identifier of a persisted series.
    SeriesId
);
entity_id!(
    /// Identifier of a persisted volume.
    VolumeId
);
entity_id!(
    /// Identifier of a persisted chapter.
    ChapterId
);
entity_id!(
    /// Identifier of a persisted file.
    FileId
);

/// A single file on disk, owned by exactly one chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MangaFile {
    pub id: Option<FileId>,
    /// Path as found on disk.
    pub file_path: PathBuf,
    pub format: MangaFormat,
    /// Extension without the dot, lowercased.
    pub extension: CompactString,
    pub pages: u32,
    pub bytes: u64,
    pub last_modified_utc: DateTime<Utc>,
}

impl MangaFile {
    /// Create a new, unpersisted file.
    pub fn new(file_path: impl Into<PathBuf>, format: MangaFormat, stat: FileStat) -> Self {
        let file_path = file_path.into();
        let extension = file_path
            .extension()
            .map(|e| CompactString::from(e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        Self {
            id: None,
            file_path,
            format,
            extension,
            pages: 0,
            bytes: stat.bytes,
            last_modified_utc: stat.modified,
        }
    }

    /// Identity key of this file within a library.
    pub fn normalized_path(&self) -> String {
        normalize_path(&self.file_path)
    }

    /// Whether this file lives at `path` (after normalization).
    pub fn matches_path(&self, path: &Path) -> bool {
        self.normalized_path() == normalize_path(path)
    }
}

/// A chapter (or special) grouping one or more files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: Option<ChapterId>,
    /// Display range, e.g. `2-4`; the cleaned title for specials.
    pub range: CompactString,
    /// Canonical minimum as a string.
    pub number: CompactString,
    pub min_number: f32,
    pub max_number: f32,
    pub is_special: bool,
    pub sort_order: f32,
    pub title: String,
    pub pages: u32,
    pub files: Vec<MangaFile>,
}

impl Chapter {
    /// Create a chapter from a range token.
    pub fn new(range: &str, is_special: bool) -> Self {
        let parsed = NumberRange::parse(range);
        let (min_number, max_number) = if is_special {
            (range::DEFAULT_CHAPTER_NUMBER, range::DEFAULT_CHAPTER_NUMBER)
        } else {
            (parsed.min, parsed.max)
        };
        Self {
            id: None,
            range: range.into(),
            number: range::format_number(min_number).into(),
            min_number,
            max_number,
            is_special,
            sort_order: min_number,
            title: String::new(),
            pages: 0,
            files: Vec::new(),
        }
    }

    /// Create the chapter a parsed file belongs to.
    pub fn from_info(info: &ParsedInfo) -> Self {
        let mut chapter = Self::new(&info.range_key(), info.is_special_info());
        chapter.title = info.title.clone();
        chapter
    }

    /// Attach a file, returning `self` for chaining.
    pub fn with_file(mut self, file: MangaFile) -> Self {
        self.files.push(file);
        self.update_pages();
        self
    }

    /// Whether any owned file sits at `path`.
    pub fn has_file(&self, path: &Path) -> bool {
        let wanted = normalize_path(path);
        self.files.iter().any(|f| f.normalized_path() == wanted)
    }

    /// Recompute the page total from files.
    pub fn update_pages(&mut self) {
        self.pages = self.files.iter().map(|f| f.pages).sum();
    }
}

/// A volume; loose-leaf and specials buckets are volumes with sentinel numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub id: Option<VolumeId>,
    pub name: CompactString,
    pub number: i32,
    pub min_number: f32,
    pub max_number: f32,
    pub pages: u32,
    pub chapters: Vec<Chapter>,
}

impl Volume {
    /// Create a volume from its range token.
    pub fn new(name: &str) -> Self {
        let parsed = NumberRange::parse(name);
        Self {
            id: None,
            name: name.into(),
            number: parsed.min as i32,
            min_number: parsed.min,
            max_number: parsed.max,
            pages: 0,
            chapters: Vec::new(),
        }
    }

    /// Attach a chapter, returning `self` for chaining.
    pub fn with_chapter(mut self, chapter: Chapter) -> Self {
        self.chapters.push(chapter);
        self.update_pages();
        self
    }

    /// Pseudo-volume holding chapters without a real volume.
    pub fn is_loose_leaf(&self) -> bool {
        range::is_loose_leaf(self.min_number)
    }

    /// The specials bucket.
    pub fn is_special(&self) -> bool {
        range::is_special_volume(self.min_number)
    }

    /// Recompute the page total from chapters.
    pub fn update_pages(&mut self) {
        for chapter in &mut self.chapters {
            chapter.update_pages();
        }
        self.pages = self.chapters.iter().map(|c| c.pages).sum();
    }

    /// Total number of files in this volume.
    pub fn file_count(&self) -> usize {
        self.chapters.iter().map(|c| c.files.len()).sum()
    }
}

/// A series and everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: Option<SeriesId>,
    pub library_id: LibraryId,
    pub name: String,
    pub normalized_name: String,
    pub sort_name: String,
    #[serde(default)]
    pub localized_name: Option<String>,
    #[serde(default)]
    pub normalized_localized_name: Option<String>,
    pub original_name: String,
    pub format: MangaFormat,
    #[serde(default)]
    pub folder_path: Option<PathBuf>,
    pub pages: u32,
    /// Readers have progress recorded against this series.
    #[serde(default)]
    pub has_progress: bool,
    /// Kept as a tombstone after its folder vanished.
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub last_scanned: Option<DateTime<Utc>>,
    pub volumes: Vec<Volume>,
}

impl Series {
    /// Create a new, unpersisted series. `normalize` produces the identity key.
    pub fn new(library_id: LibraryId, name: &str, normalize: impl Fn(&str) -> String) -> Self {
        Self {
            id: None,
            library_id,
            name: name.to_string(),
            normalized_name: normalize(name),
            sort_name: name.to_string(),
            localized_name: None,
            normalized_localized_name: None,
            original_name: name.to_string(),
            format: MangaFormat::Unknown,
            folder_path: None,
            pages: 0,
            has_progress: false,
            deleted: false,
            last_scanned: None,
            volumes: Vec::new(),
        }
    }

    /// Change the display name and recompute the normalized key.
    pub fn rename(&mut self, name: &str, normalize: impl Fn(&str) -> String) {
        self.name = name.to_string();
        self.sort_name = name.to_string();
        self.normalized_name = normalize(name);
    }

    /// Set or clear the localized name and recompute its normalized key.
    pub fn set_localized_name(&mut self, name: Option<&str>, normalize: impl Fn(&str) -> String) {
        self.localized_name = name.map(str::to_string);
        self.normalized_localized_name = name.map(normalize);
    }

    /// Recompute page totals bottom-up.
    pub fn update_pages(&mut self) {
        for volume in &mut self.volumes {
            volume.update_pages();
        }
        self.pages = self.volumes.iter().map(|v| v.pages).sum();
    }

    /// Iterate every file in the series.
    pub fn files(&self) -> impl Iterator<Item = &MangaFile> {
        self.volumes
            .iter()
            .flat_map(|v| v.chapters.iter())
            .flat_map(|c| c.files.iter())
    }

    /// Total number of files.
    pub fn file_count(&self) -> usize {
        self.volumes.iter().map(Volume::file_count).sum()
    }
}

/// Assigns sequential IDs to entities that do not have one yet.
#[derive(Debug, Clone, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    /// Start allocating after the highest id already present in `series`.
    pub fn after<'a>(series: impl IntoIterator<Item = &'a Series>) -> Self {
        let mut max = 0;
        for s in series {
            max = max.max(s.id.map_or(0, |id| id.0));
            for v in &s.volumes {
                max = max.max(v.id.map_or(0, |id| id.0));
                for c in &v.chapters {
                    max = max.max(c.id.map_or(0, |id| id.0));
                    for f in &c.files {
                        max = max.max(f.id.map_or(0, |id| id.0));
                    }
                }
            }
        }
        Self { next: max + 1 }
    }

    fn take(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Give every unpersisted entity in the series an id.
    pub fn assign(&mut self, series: &mut Series) {
        if series.id.is_none() {
            series.id = Some(SeriesId::new(self.take()));
        }
        for volume in &mut series.volumes {
            if volume.id.is_none() {
                volume.id = Some(VolumeId::new(self.take()));
            }
            for chapter in &mut volume.chapters {
                if chapter.id.is_none() {
                    chapter.id = Some(ChapterId::new(self.take()));
                }
                for file in &mut chapter.files {
                    if file.id.is_none() {
                        file.id = Some(FileId::new(self.take()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat() -> FileStat {
        FileStat::new(1024, DateTime::<Utc>::UNIX_EPOCH)
    }

    #[test]
    fn test_chapter_from_range() {
        let chapter = Chapter::new("2-4", false);
        assert_eq!(chapter.min_number, 2.0);
        assert_eq!(chapter.max_number, 4.0);
        assert_eq!(chapter.number, "2");
        assert_eq!(chapter.sort_order, 2.0);
    }

    #[test]
    fn test_special_chapter_uses_default_number() {
        let chapter = Chapter::new("Some Special 3", true);
        assert!(chapter.is_special);
        assert_eq!(chapter.min_number, range::DEFAULT_CHAPTER_NUMBER);
        assert_eq!(chapter.range, "Some Special 3");
    }

    #[test]
    fn test_volume_sentinels() {
        assert!(Volume::new(range::LOOSE_LEAF_VOLUME).is_loose_leaf());
        assert!(Volume::new(range::SPECIAL_VOLUME).is_special());
        let volume = Volume::new("3-5");
        assert_eq!(volume.number, 3);
        assert_eq!(volume.max_number, 5.0);
    }

    #[test]
    fn test_pages_roll_up() {
        let mut file = MangaFile::new("/lib/A/A v01.cbz", MangaFormat::Archive, stat());
        file.pages = 20;
        let volume = Volume::new("1").with_chapter(Chapter::new("1", false).with_file(file));
        let mut series = Series::new(1, "A", |s| s.to_lowercase());
        series.volumes.push(volume);
        series.update_pages();
        assert_eq!(series.pages, 20);
        assert_eq!(series.file_count(), 1);
    }

    #[test]
    fn test_id_allocator_fills_gaps_only() {
        let mut series = Series::new(1, "A", |s| s.to_lowercase());
        series.id = Some(SeriesId::new(7));
        series.volumes.push(
            Volume::new("1").with_chapter(
                Chapter::new("1", false).with_file(MangaFile::new(
                    "/lib/A/a.cbz",
                    MangaFormat::Archive,
                    stat(),
                )),
            ),
        );

        let mut ids = IdAllocator::after([&series]);
        ids.assign(&mut series);

        assert_eq!(series.id, Some(SeriesId::new(7)));
        assert_eq!(series.volumes[0].id, Some(VolumeId::new(8)));
        assert_eq!(series.volumes[0].chapters[0].id, Some(ChapterId::new(9)));
        assert_eq!(series.volumes[0].chapters[0].files[0].id, Some(FileId::new(10)));
    }
}
