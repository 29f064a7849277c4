//! Archive and book collaborator.

use std::io;
use std::path::Path;

use kura_core::MangaFormat;

/// Reads page counts and cover images out of media files.
///
/// Only consulted for files a change set marks as new or refreshed.
pub trait BookInspector: Send + Sync {
    fn page_count(&self, path: &Path, format: MangaFormat) -> io::Result<u32>;

    /// Encoded cover image, if the file has one.
    fn cover_bytes(&self, path: &Path, format: MangaFormat) -> io::Result<Option<Vec<u8>>>;
}

/// Inspector that opens nothing. A loose image counts as one page.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullInspector;

impl BookInspector for NullInspector {
    fn page_count(&self, _path: &Path, format: MangaFormat) -> io::Result<u32> {
        Ok(u32::from(format == MangaFormat::Image))
    }

    fn cover_bytes(&self, _path: &Path, _format: MangaFormat) -> io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}
