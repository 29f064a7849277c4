//! Small queries over volume and chapter collections.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::entity::{Chapter, Volume};
use crate::format::MangaFormat;
use crate::parsed::ParsedInfo;
use crate::paths::normalize_path;
use crate::range::{self, NumberRange};
use crate::sort::NaturalSortComparer;

/// Whether an existing chapter is the identity match for a parsed file.
///
/// Specials only match specials, by range key. Regular chapters match on the
/// raw range or on equal min/max numbers.
pub fn chapter_matches(chapter: &Chapter, info: &ParsedInfo) -> bool {
    if chapter.is_special != info.is_special_info() {
        return false;
    }
    let key = info.range_key();
    if chapter.range == key.as_str() {
        return true;
    }
    if chapter.is_special {
        return false;
    }
    let parsed = info.chapter_range();
    chapter.min_number == parsed.min && chapter.max_number == parsed.max
}

/// Position of the chapter `info` belongs to, preferring one that already owns the file.
pub fn chapter_position_by_range(chapters: &[Chapter], info: &ParsedInfo) -> Option<usize> {
    let mut first = None;
    for (idx, chapter) in chapters.iter().enumerate() {
        if !chapter_matches(chapter, info) {
            continue;
        }
        if chapter.has_file(&info.full_path) {
            return Some(idx);
        }
        first.get_or_insert(idx);
    }
    first
}

/// The chapter `info` belongs to, if any.
pub fn get_chapter_by_range<'a>(chapters: &'a [Chapter], info: &ParsedInfo) -> Option<&'a Chapter> {
    chapter_position_by_range(chapters, info).map(|idx| &chapters[idx])
}

/// Whether `chapter` already represents `info`, either by owning its file or by range.
///
/// Query for callers holding a single chapter. Reconciliation places files
/// with [`chapter_position_by_range`], which applies the same owning-file
/// preference across a whole volume.
pub fn has_info(chapter: &Chapter, info: &ParsedInfo) -> bool {
    if chapter.has_file(&info.full_path) {
        return true;
    }
    if chapter.is_special != info.is_special_info() {
        return false;
    }
    if chapter.is_special {
        return chapter.range == info.range_key().as_str()
            || (!chapter.title.is_empty() && chapter.title == info.title);
    }
    chapter_matches(chapter, info)
}

/// Position of the volume with the same minimum number as `token`.
pub fn volume_position(volumes: &[Volume], token: &str) -> Option<usize> {
    let wanted = NumberRange::parse(token).min;
    volumes.iter().position(|v| v.min_number == wanted)
}

/// Collapse duplicate volume tokens, keeping first-seen order.
///
/// Works on raw tokens for listings; grouping and reconciliation key volumes
/// by number through [`volume_position`].
pub fn distinct_volumes<I, S>(tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for token in tokens {
        let token = token.as_ref();
        if seen.insert(token.to_string()) {
            out.push(token.to_string());
        }
    }
    out
}

/// Chapters in reading order: numbered chapters by sort order, then specials.
pub fn ordered_chapters<'a>(chapters: &'a [Chapter], sorter: &NaturalSortComparer) -> Vec<&'a Chapter> {
    let mut ordered: Vec<&Chapter> = chapters.iter().collect();
    ordered.sort_by(|a, b| compare_chapters(a, b, sorter));
    ordered
}

fn compare_chapters(a: &Chapter, b: &Chapter, sorter: &NaturalSortComparer) -> Ordering {
    a.is_special
        .cmp(&b.is_special)
        .then_with(|| a.sort_order.total_cmp(&b.sort_order))
        .then_with(|| sorter.compare(&a.range, &b.range, true))
}

/// First chapter in reading order that owns at least one file.
pub fn first_chapter_with_files<'a>(
    chapters: &'a [Chapter],
    sorter: &NaturalSortComparer,
) -> Option<&'a Chapter> {
    ordered_chapters(chapters, sorter)
        .into_iter()
        .find(|c| !c.files.is_empty())
}

/// Volume whose cover represents the series.
///
/// Book formats take the lowest-numbered volume. Everything else takes the
/// lowest real volume, then loose-leaf, then specials. Ties go to natural
/// order on the volume name.
pub fn cover_volume<'a>(
    volumes: &'a [Volume],
    format: MangaFormat,
    sorter: &NaturalSortComparer,
) -> Option<&'a Volume> {
    let candidates = volumes.iter().filter(|v| v.file_count() > 0);
    if format.is_book() {
        candidates.min_by(|a, b| {
            a.min_number
                .total_cmp(&b.min_number)
                .then_with(|| sorter.compare(&a.name, &b.name, true))
        })
    } else {
        candidates.min_by(|a, b| {
            range::compare_volume_numbers(a.min_number, b.min_number)
                .then_with(|| sorter.compare(&a.name, &b.name, true))
        })
    }
}

/// Chapter whose first file supplies the series cover.
pub fn cover_chapter<'a>(
    volumes: &'a [Volume],
    format: MangaFormat,
    sorter: &NaturalSortComparer,
) -> Option<&'a Chapter> {
    cover_volume(volumes, format, sorter)
        .and_then(|volume| first_chapter_with_files(&volume.chapters, sorter))
}

/// Whether two paths name the same file.
pub fn same_file(a: &std::path::Path, b: &std::path::Path) -> bool {
    normalize_path(a) == normalize_path(b)
}
