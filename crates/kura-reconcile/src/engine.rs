//! Converges a stored series graph to what a scan found on disk.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use kura_core::lookup::{self, chapter_position_by_range, volume_position};
use kura_core::range::compare_volume_numbers;
use kura_core::{
    Chapter, FileStat, MangaFile, MangaFormat, NaturalSortComparer, ParsedInfo, Series, Volume,
    normalize_path,
};
use kura_parse::normalize;
use kura_scan::ScannedSeries;

use crate::changeset::{ChangeSet, ChapterChange, FileChange, FileMove, VolumeChange};
use crate::error::ReconcileError;

/// Result of reconciling one series.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// The converged graph, ready to hand to persistence.
    pub series: Series,
    pub changes: ChangeSet,
    /// File that supplies the series cover.
    pub cover: Option<PathBuf>,
}

/// What to do with a series whose files are all gone.
#[derive(Debug, Clone)]
pub enum VanishedOutcome {
    /// Readers have progress against it: keep it, flagged as deleted.
    Tombstone { series: Series, changes: ChangeSet },
    /// Nothing depends on it: drop it.
    Remove { changes: ChangeSet },
}

/// Diffs scanned series against stored ones.
///
/// One engine serves a whole library pass and may be shared across worker
/// threads; each call touches a single series.
pub struct ReconciliationEngine<'a> {
    sorter: &'a NaturalSortComparer,
    unreadable_dirs: &'a [PathBuf],
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(sorter: &'a NaturalSortComparer) -> Self {
        Self {
            sorter,
            unreadable_dirs: &[],
        }
    }

    /// Files below these directories are kept even when the scan did not see them.
    pub fn with_unreadable_dirs(mut self, dirs: &'a [PathBuf]) -> Self {
        self.unreadable_dirs = dirs;
        self
    }

    /// Converge `existing` (or a new series) to `scanned`.
    ///
    /// Entity ids survive whenever a volume, chapter or file still matches, so
    /// reconciling an unchanged folder yields an empty change set.
    pub fn reconcile(
        &self,
        existing: Option<&Series>,
        scanned: &ScannedSeries,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let (mut series, created) = match existing {
            Some(stored) if stored.library_id != scanned.library_id => {
                return Err(ReconcileError::LibraryMismatch {
                    series: stored.name.clone(),
                    expected: scanned.library_id,
                    found: stored.library_id,
                });
            }
            Some(stored) => (stored.clone(), false),
            None => (new_series(scanned), true),
        };
        let previous_cover = existing.and_then(|stored| self.cover_path(stored));

        let mut changes = ChangeSet::new(series.id, &series.name);
        changes.created = created;
        if series.deleted {
            series.deleted = false;
            changes.revived = true;
        }
        if !created {
            changes.metadata_changed = apply_metadata(&mut series, scanned);
        }

        let mut locations = index_files(&series);
        let mut seen = HashSet::new();

        for file in scanned.files() {
            let key = normalize_path(&file.info.full_path);
            let Some(stat) = file.stat else {
                // Unreadable this pass: whatever is stored stays as it is.
                seen.insert(key);
                continue;
            };
            if !seen.insert(key.clone()) {
                continue;
            }

            let v = place_volume(&mut series, &file.info, &mut changes);
            let c = place_chapter(&mut series.volumes[v], &file.info, &mut changes);

            match locations.get(&key).copied() {
                Some(at) if at == (v, c) => {
                    refresh_in_place(&mut series, (v, c), &file.info.full_path, stat, &mut changes);
                }
                Some(from) => {
                    if move_file(&mut series, from, (v, c), &file.info.full_path, stat, &mut changes) {
                        locations.insert(key, (v, c));
                    } else {
                        add_file(&mut series, (v, c), &file.info, stat, &mut changes);
                    }
                }
                None => {
                    add_file(&mut series, (v, c), &file.info, stat, &mut changes);
                    locations.insert(key, (v, c));
                }
            }
        }

        self.remove_unseen(&mut series, &seen, &mut changes);
        prune_empty(&mut series, &mut changes);

        if series.file_count() == 0 {
            return Err(ReconcileError::NoReadableFiles {
                series: series.name.clone(),
            });
        }

        self.sort(&mut series);
        series.update_pages();

        let cover = self.cover_path(&series);
        changes.cover_changed = cover != previous_cover;

        debug!(
            series = %series.name,
            created,
            changes = %changes.summary(),
            "reconciled series"
        );
        Ok(ReconcileOutcome {
            series,
            changes,
            cover,
        })
    }

    /// Stage the full removal of a series whose folder is gone.
    pub fn reconcile_vanished(&self, existing: &Series) -> VanishedOutcome {
        let mut changes = ChangeSet::new(existing.id, &existing.name);
        for volume in &existing.volumes {
            changes.removed_volumes.push(volume_change(volume));
            for chapter in &volume.chapters {
                changes.removed_chapters.push(chapter_change(volume, chapter));
                for file in &chapter.files {
                    changes.removed_files.push(file_change(volume, chapter, file));
                }
            }
        }

        if existing.has_progress {
            let mut series = existing.clone();
            series.deleted = true;
            changes.tombstoned = true;
            VanishedOutcome::Tombstone { series, changes }
        } else {
            VanishedOutcome::Remove { changes }
        }
    }

    /// First file of the cover chapter, in natural order.
    pub fn cover_path(&self, series: &Series) -> Option<PathBuf> {
        let chapter = lookup::cover_chapter(&series.volumes, series.format, self.sorter)?;
        chapter
            .files
            .iter()
            .min_by(|a, b| {
                self.sorter.compare(
                    &a.file_path.to_string_lossy(),
                    &b.file_path.to_string_lossy(),
                    true,
                )
            })
            .map(|f| f.file_path.clone())
    }

    fn is_unreadable(&self, path: &Path) -> bool {
        self.unreadable_dirs.iter().any(|dir| path.starts_with(dir))
    }

    fn remove_unseen(&self, series: &mut Series, seen: &HashSet<String>, changes: &mut ChangeSet) {
        for volume in &mut series.volumes {
            let volume_name = volume.name.clone();
            for chapter in &mut volume.chapters {
                let range = chapter.range.clone();
                let removed = &mut changes.removed_files;
                chapter.files.retain(|file| {
                    let keep = seen.contains(&file.normalized_path()) || self.is_unreadable(&file.file_path);
                    if !keep {
                        removed.push(FileChange {
                            id: file.id,
                            path: file.file_path.clone(),
                            volume: volume_name.clone(),
                            chapter: range.clone(),
                        });
                    }
                    keep
                });
            }
        }
    }

    fn sort(&self, series: &mut Series) {
        let sorter = self.sorter;
        series.volumes.sort_by(|a, b| {
            compare_volume_numbers(a.min_number, b.min_number)
                .then_with(|| sorter.compare(&a.name, &b.name, true))
        });
        for volume in &mut series.volumes {
            volume.chapters.sort_by(|a, b| {
                a.is_special
                    .cmp(&b.is_special)
                    .then_with(|| a.sort_order.total_cmp(&b.sort_order))
                    .then_with(|| sorter.compare(&a.range, &b.range, true))
            });
            for chapter in &mut volume.chapters {
                sorter.sort_by_path(&mut chapter.files, |f| f.file_path.as_path());
            }
        }
    }
}

fn new_series(scanned: &ScannedSeries) -> Series {
    let mut series = Series::new(scanned.library_id, &scanned.name, normalize);
    series.set_localized_name(scanned.localized_name.as_deref(), normalize);
    series.format = scanned.format;
    series.folder_path = scanned.folder_path.clone();
    series
}

/// Copy series-level facts from disk. Returns whether anything changed.
fn apply_metadata(series: &mut Series, scanned: &ScannedSeries) -> bool {
    let mut changed = false;
    if scanned.format != MangaFormat::Unknown && series.format != scanned.format {
        series.format = scanned.format;
        changed = true;
    }
    if scanned.folder_path.is_some() && series.folder_path != scanned.folder_path {
        series.folder_path = scanned.folder_path.clone();
        changed = true;
    }
    if scanned.localized_name.is_some() && series.localized_name != scanned.localized_name {
        series.set_localized_name(scanned.localized_name.as_deref(), normalize);
        changed = true;
    }
    changed
}

/// Normalized path of every stored file to its (volume, chapter) position.
fn index_files(series: &Series) -> HashMap<String, (usize, usize)> {
    let mut index = HashMap::new();
    for (v, volume) in series.volumes.iter().enumerate() {
        for (c, chapter) in volume.chapters.iter().enumerate() {
            for file in &chapter.files {
                index.entry(file.normalized_path()).or_insert((v, c));
            }
        }
    }
    index
}

fn place_volume(series: &mut Series, info: &ParsedInfo, changes: &mut ChangeSet) -> usize {
    let token = info.volume_key();
    if let Some(idx) = volume_position(&series.volumes, token) {
        return idx;
    }
    let volume = Volume::new(token);
    changes.added_volumes.push(volume_change(&volume));
    series.volumes.push(volume);
    series.volumes.len() - 1
}

fn place_chapter(volume: &mut Volume, info: &ParsedInfo, changes: &mut ChangeSet) -> usize {
    if let Some(idx) = chapter_position_by_range(&volume.chapters, info) {
        return idx;
    }
    let chapter = Chapter::from_info(info);
    changes.added_chapters.push(chapter_change(volume, &chapter));
    volume.chapters.push(chapter);
    volume.chapters.len() - 1
}

/// Update a stored file's stat. Returns whether it changed.
fn refresh_stat(file: &mut MangaFile, stat: FileStat) -> bool {
    if stat.modified > file.last_modified_utc || stat.bytes != file.bytes {
        file.bytes = stat.bytes;
        file.last_modified_utc = stat.modified;
        true
    } else {
        false
    }
}

fn refresh_in_place(
    series: &mut Series,
    (v, c): (usize, usize),
    path: &Path,
    stat: FileStat,
    changes: &mut ChangeSet,
) {
    let volume = &mut series.volumes[v];
    let chapter = &mut volume.chapters[c];
    let Some(file) = chapter.files.iter_mut().find(|f| f.matches_path(path)) else {
        return;
    };
    if refresh_stat(file, stat) {
        let change = FileChange {
            id: file.id,
            path: file.file_path.clone(),
            volume: volume.name.clone(),
            chapter: chapter.range.clone(),
        };
        changes.refreshed_files.push(change);
    }
}

/// Move a stored file between chapters. Returns `false` if it was not found.
fn move_file(
    series: &mut Series,
    (fv, fc): (usize, usize),
    (tv, tc): (usize, usize),
    path: &Path,
    stat: FileStat,
    changes: &mut ChangeSet,
) -> bool {
    let source = &mut series.volumes[fv];
    let from = (source.name.clone(), source.chapters[fc].range.clone());
    let Some(idx) = source.chapters[fc].files.iter().position(|f| f.matches_path(path)) else {
        return false;
    };
    let mut file = source.chapters[fc].files.remove(idx);
    let refreshed = refresh_stat(&mut file, stat);

    let target = &mut series.volumes[tv];
    let to = (target.name.clone(), target.chapters[tc].range.clone());
    if refreshed {
        changes.refreshed_files.push(FileChange {
            id: file.id,
            path: file.file_path.clone(),
            volume: to.0.clone(),
            chapter: to.1.clone(),
        });
    }
    changes.moved_files.push(FileMove {
        id: file.id,
        path: file.file_path.clone(),
        from,
        to,
    });
    target.chapters[tc].files.push(file);
    true
}

fn add_file(
    series: &mut Series,
    (v, c): (usize, usize),
    info: &ParsedInfo,
    stat: FileStat,
    changes: &mut ChangeSet,
) {
    let volume = &mut series.volumes[v];
    let chapter = &mut volume.chapters[c];
    let file = MangaFile::new(&info.full_path, info.format, stat);
    changes.added_files.push(FileChange {
        id: None,
        path: file.file_path.clone(),
        volume: volume.name.clone(),
        chapter: chapter.range.clone(),
    });
    chapter.files.push(file);
}

/// Drop chapters without files, then volumes without chapters.
fn prune_empty(series: &mut Series, changes: &mut ChangeSet) {
    for volume in &mut series.volumes {
        let name = volume.name.clone();
        let removed = &mut changes.removed_chapters;
        volume.chapters.retain(|chapter| {
            if chapter.files.is_empty() {
                removed.push(ChapterChange {
                    id: chapter.id,
                    volume: name.clone(),
                    range: chapter.range.clone(),
                    is_special: chapter.is_special,
                });
                false
            } else {
                true
            }
        });
    }
    let removed = &mut changes.removed_volumes;
    series.volumes.retain(|volume| {
        if volume.chapters.is_empty() {
            removed.push(volume_change(volume));
            false
        } else {
            true
        }
    });
}

fn volume_change(volume: &Volume) -> VolumeChange {
    VolumeChange {
        id: volume.id,
        name: volume.name.clone(),
        min_number: volume.min_number,
    }
}

fn chapter_change(volume: &Volume, chapter: &Chapter) -> ChapterChange {
    ChapterChange {
        id: chapter.id,
        volume: volume.name.clone(),
        range: chapter.range.clone(),
        is_special: chapter.is_special,
    }
}

fn file_change(volume: &Volume, chapter: &Chapter, file: &MangaFile) -> FileChange {
    FileChange {
        id: file.id,
        path: file.file_path.clone(),
        volume: volume.name.clone(),
        chapter: chapter.range.clone(),
    }
}
