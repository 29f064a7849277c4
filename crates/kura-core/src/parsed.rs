//! Transient per-file parse results.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::format::MangaFormat;
use crate::range::{self, NumberRange};

/// Structured result of parsing one file path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedInfo {
    /// Series name; never empty.
    pub series: String,
    /// Alternate series name supplied by embedded metadata.
    #[serde(default)]
    pub localized_series: Option<String>,
    /// Raw volume range token.
    pub volumes: String,
    /// Raw chapter range token.
    pub chapters: String,
    /// Edition marker removed from the series name, e.g. `Omnibus`.
    pub edition: String,
    pub is_special: bool,
    pub format: MangaFormat,
    pub full_path: PathBuf,
    pub filename: String,
    /// Cleaned file stem.
    pub title: String,
}

impl ParsedInfo {
    /// Create an info with sentinel volume/chapter tokens.
    pub fn new(series: impl Into<String>, full_path: impl Into<PathBuf>) -> Self {
        let full_path = full_path.into();
        let filename = full_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self {
            series: series.into(),
            localized_series: None,
            volumes: range::LOOSE_LEAF_VOLUME.to_string(),
            chapters: range::DEFAULT_CHAPTER.to_string(),
            edition: String::new(),
            is_special: false,
            format: MangaFormat::from_path(&full_path),
            full_path,
            filename,
            title: String::new(),
        }
    }

    /// Set the volume token, returning `self`.
    pub fn with_volumes(mut self, volumes: impl Into<String>) -> Self {
        self.volumes = volumes.into();
        self
    }

    /// Set the chapter token, returning `self`.
    pub fn with_chapters(mut self, chapters: impl Into<String>) -> Self {
        self.chapters = chapters.into();
        self
    }

    /// Whether this file is bonus content rather than part of the main numbering.
    pub fn is_special_info(&self) -> bool {
        self.is_special
    }

    /// Whether the volume token is the loose-leaf sentinel.
    pub fn has_no_volume(&self) -> bool {
        self.volumes == range::LOOSE_LEAF_VOLUME
    }

    /// Whether the chapter token is the default sentinel.
    pub fn has_no_chapter(&self) -> bool {
        self.chapters == range::DEFAULT_CHAPTER
    }

    /// Volume bucket this file belongs to.
    pub fn volume_key(&self) -> &str {
        if self.is_special {
            range::SPECIAL_VOLUME
        } else {
            &self.volumes
        }
    }

    /// Chapter identity within its volume: the range, or the title for specials.
    pub fn range_key(&self) -> String {
        if self.is_special {
            if self.title.is_empty() {
                self.filename.clone()
            } else {
                self.title.clone()
            }
        } else {
            self.chapters.clone()
        }
    }

    /// Parsed chapter range; specials use the default chapter number.
    pub fn chapter_range(&self) -> NumberRange {
        if self.is_special {
            NumberRange::parse(range::DEFAULT_CHAPTER)
        } else {
            NumberRange::parse(&self.chapters)
        }
    }

    /// Parsed volume range.
    pub fn volume_range(&self) -> NumberRange {
        NumberRange::parse(self.volume_key())
    }
}

/// Size and modification time of a file, as reported by the file system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    pub bytes: u64,
    pub modified: DateTime<Utc>,
}

impl FileStat {
    /// Create a new stat record.
    pub fn new(bytes: u64, modified: DateTime<Utc>) -> Self {
        Self { bytes, modified }
    }

    /// Build from std metadata, falling back to the epoch for missing mtimes.
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        Self {
            bytes: metadata.len(),
            modified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_sentinels() {
        let info = ParsedInfo::new("Beelzebub", "/manga/Beelzebub/Beelzebub.cbz");
        assert!(info.has_no_volume());
        assert!(info.has_no_chapter());
        assert_eq!(info.filename, "Beelzebub.cbz");
        assert_eq!(info.format, MangaFormat::Archive);
    }

    #[test]
    fn test_special_keys() {
        let mut info = ParsedInfo::new("Darker than Black", "/m/Darker than Black - SP01.cbz");
        info.is_special = true;
        info.title = "Darker than Black - SP01".to_string();
        assert_eq!(info.volume_key(), range::SPECIAL_VOLUME);
        assert_eq!(info.range_key(), "Darker than Black - SP01");
        assert_eq!(info.chapter_range().min, range::DEFAULT_CHAPTER_NUMBER);
    }

    #[test]
    fn test_chapter_range() {
        let info = ParsedInfo::new("A", "/m/A.cbz").with_chapters("000-006");
        let range = info.chapter_range();
        assert_eq!((range.min, range.max), (0.0, 6.0));
    }
}
