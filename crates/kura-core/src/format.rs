//! Library types and file formats.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of library, which selects the rule groups used for parsing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    /// Manga: `vNN cNN` naming, specials such as omake.
    #[default]
    Manga,
    /// Western comics: `#NN` issues.
    Comic,
    /// Books: one file per volume, parsed with the manga rules.
    Book,
    /// Loose image folders: structure comes from the folder chain.
    Image,
}

impl LibraryType {
    /// Whether the comic rule groups apply.
    pub fn is_comic(&self) -> bool {
        matches!(self, Self::Comic)
    }
}

/// Format of a single file on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MangaFormat {
    /// Loose image (one page).
    Image,
    /// Zip/rar/7z/tar archive of images.
    Archive,
    /// EPUB book.
    Epub,
    /// PDF document.
    Pdf,
    /// Anything else.
    #[default]
    Unknown,
}

const ARCHIVE_EXTENSIONS: &[&str] = &["cbz", "zip", "cbr", "rar", "cb7", "7z", "cbt", "tar"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "bmp"];

impl MangaFormat {
    /// Classify a file by its extension (case-insensitive).
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Classify a bare extension without the leading dot.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        if ARCHIVE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Archive
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Self::Image
        } else if ext == "epub" {
            Self::Epub
        } else if ext == "pdf" {
            Self::Pdf
        } else {
            Self::Unknown
        }
    }

    /// Book-style formats hold one volume per file.
    pub fn is_book(&self) -> bool {
        matches!(self, Self::Epub | Self::Pdf)
    }

    /// The file-type group this format belongs to.
    pub fn group(&self) -> Option<FileTypeGroup> {
        match self {
            Self::Archive => Some(FileTypeGroup::Archive),
            Self::Image => Some(FileTypeGroup::Images),
            Self::Epub => Some(FileTypeGroup::Epub),
            Self::Pdf => Some(FileTypeGroup::Pdf),
            Self::Unknown => None,
        }
    }
}

/// A group of formats a library can be configured to accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileTypeGroup {
    Archive,
    Epub,
    Pdf,
    Images,
}

impl FileTypeGroup {
    /// All groups, the default for a new library.
    pub fn all() -> Vec<Self> {
        vec![Self::Archive, Self::Epub, Self::Pdf, Self::Images]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(MangaFormat::from_path("a/b/Series v01.cbz"), MangaFormat::Archive);
        assert_eq!(MangaFormat::from_path("a/b/Series v01.CBR"), MangaFormat::Archive);
        assert_eq!(MangaFormat::from_path("001.JPG"), MangaFormat::Image);
        assert_eq!(MangaFormat::from_path("Book.epub"), MangaFormat::Epub);
        assert_eq!(MangaFormat::from_path("Book.pdf"), MangaFormat::Pdf);
        assert_eq!(MangaFormat::from_path("notes.txt"), MangaFormat::Unknown);
        assert_eq!(MangaFormat::from_path("no_extension"), MangaFormat::Unknown);
    }

    #[test]
    fn test_format_group() {
        assert_eq!(MangaFormat::Archive.group(), Some(FileTypeGroup::Archive));
        assert_eq!(MangaFormat::Unknown.group(), None);
        assert!(MangaFormat::Epub.is_book());
        assert!(!MangaFormat::Archive.is_book());
    }
}
