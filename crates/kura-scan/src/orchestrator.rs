//! Groups parsed files into per-series scan results.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, info};

use kura_core::lookup::chapter_matches;
use kura_core::range::{self, NumberRange};
use kura_core::{
    Chapter, FileStat, LibraryConfig, LibraryId, MangaFormat, NaturalSortComparer, ParsedInfo,
    ParserSettings, ScanError, ScanIssue,
};
use kura_parse::{FilenameParser, MetadataHints, MetadataSource, normalize};

use crate::progress::{ScanPhase, ScanProgress};
use crate::walker::{DiscoveredFile, LibraryWalker};

/// One parsed file with its on-disk state.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    pub info: ParsedInfo,
    /// `None` when the file could not be stat'ed this pass.
    pub stat: Option<FileStat>,
}

/// Files that belong to one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterBucket {
    /// Range key: the chapter range, or the title for specials.
    pub range: String,
    pub min_number: f32,
    pub max_number: f32,
    pub is_special: bool,
    pub title: String,
    pub files: Vec<ScannedFile>,
}

impl ChapterBucket {
    fn from_info(info: &ParsedInfo) -> Self {
        let parsed = info.chapter_range();
        Self {
            range: info.range_key(),
            min_number: parsed.min,
            max_number: parsed.max,
            is_special: info.is_special_info(),
            title: info.title.clone(),
            files: Vec::new(),
        }
    }

    fn accepts(&self, info: &ParsedInfo) -> bool {
        chapter_matches(&Chapter::new(&self.range, self.is_special), info)
    }
}

/// Chapters that belong to one volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeBucket {
    /// Volume token as first seen.
    pub name: String,
    pub min_number: f32,
    pub max_number: f32,
    pub chapters: Vec<ChapterBucket>,
}

impl VolumeBucket {
    pub fn is_special(&self) -> bool {
        range::is_special_volume(self.min_number)
    }

    pub fn file_count(&self) -> usize {
        self.chapters.iter().map(|c| c.files.len()).sum()
    }
}

/// Everything found on disk for one series.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedSeries {
    pub library_id: LibraryId,
    /// Display name.
    pub name: String,
    /// Grouping key.
    pub normalized_name: String,
    pub localized_name: Option<String>,
    /// Distinct raw series names folded into this group.
    pub aliases: Vec<String>,
    pub format: MangaFormat,
    /// Deepest folder containing every file.
    pub folder_path: Option<PathBuf>,
    /// Volumes in display order: real volumes, loose-leaf, specials.
    pub volumes: Vec<VolumeBucket>,
}

impl ScannedSeries {
    /// Every scanned file in bucket order.
    pub fn files(&self) -> impl Iterator<Item = &ScannedFile> {
        self.volumes
            .iter()
            .flat_map(|v| v.chapters.iter())
            .flat_map(|c| c.files.iter())
    }

    pub fn file_count(&self) -> usize {
        self.volumes.iter().map(VolumeBucket::file_count).sum()
    }

    /// Whether `name` normalizes to this series or one of its aliases.
    pub fn answers_to(&self, name: &str) -> bool {
        let key = normalize(name);
        !key.is_empty()
            && (key == self.normalized_name
                || self.localized_name.as_deref().map(normalize).as_deref() == Some(key.as_str())
                || self.aliases.iter().any(|a| normalize(a) == key))
    }
}

/// Result of scanning one library.
#[derive(Debug)]
pub struct LibraryScan {
    pub library_id: LibraryId,
    pub series: Vec<ScannedSeries>,
    /// Media files parsed.
    pub total_files: usize,
    /// Files ignored by type or exclude pattern.
    pub files_skipped: usize,
    /// Files found but not stat'ed.
    pub files_unreadable: usize,
    /// Directories that could not be listed; series under them are not
    /// considered vanished.
    pub unreadable_dirs: Vec<PathBuf>,
    /// Roots that yielded no media files. Stored series under them are kept.
    pub empty_roots: Vec<PathBuf>,
    pub elapsed: Duration,
    pub issues: Vec<ScanIssue>,
}

impl LibraryScan {
    /// Whether `path` sits below a directory that could not be listed.
    pub fn is_under_unreadable(&self, path: &Path) -> bool {
        self.unreadable_dirs.iter().any(|dir| path.starts_with(dir))
    }

    /// Whether `path` sits below a root that yielded no files this pass.
    pub fn is_under_empty_root(&self, path: &Path) -> bool {
        self.empty_roots.iter().any(|root| path.starts_with(root))
    }
}

/// Walks, parses and groups a library.
pub struct ScanOrchestrator {
    parser: Arc<FilenameParser>,
    metadata: Option<Arc<dyn MetadataSource>>,
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl ScanOrchestrator {
    pub fn new(settings: ParserSettings) -> Self {
        Self::with_parser(Arc::new(FilenameParser::new(settings)))
    }

    pub fn with_parser(parser: Arc<FilenameParser>) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            parser,
            metadata: None,
            progress_tx,
        }
    }

    /// Read embedded metadata for every parsed file.
    pub fn with_metadata(mut self, source: Arc<dyn MetadataSource>) -> Self {
        self.metadata = Some(source);
        self
    }

    /// Report progress on an existing channel.
    pub fn with_progress(mut self, progress_tx: broadcast::Sender<ScanProgress>) -> Self {
        self.progress_tx = progress_tx;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Sender for later scan stages that report on the same channel.
    pub fn progress_sender(&self) -> broadcast::Sender<ScanProgress> {
        self.progress_tx.clone()
    }

    pub fn parser(&self) -> &FilenameParser {
        &self.parser
    }

    /// Walk every root of the library and group its files by series.
    ///
    /// Output is independent of file-system enumeration order.
    pub fn scan_libraries_for_series(&self, config: &LibraryConfig) -> Result<LibraryScan, ScanError> {
        let start = Instant::now();
        let walker = LibraryWalker::with_progress(self.progress_tx.clone());
        let walked = walker.walk(config)?;

        let sorter = NaturalSortComparer::new();
        let mut files = walked.files;
        sorter.sort_by_path(&mut files, |f| f.path.as_path());

        let _ = self
            .progress_tx
            .send(ScanProgress::phase(ScanPhase::Parsing, start.elapsed()));
        let parsed = self.parse_all(&files, config);

        let mut issues = walked.issues;
        let mut scanned = Vec::with_capacity(parsed.len());
        for (file, (info, file_issues)) in files.iter().zip(parsed) {
            issues.extend(file_issues);
            scanned.push(ScannedFile {
                info,
                stat: file.stat,
            });
        }

        let _ = self
            .progress_tx
            .send(ScanProgress::phase(ScanPhase::Grouping, start.elapsed()));
        let series = group_series(config.id, scanned, &sorter);
        sorter.clear();

        let scan = LibraryScan {
            library_id: config.id,
            total_files: files.len(),
            files_skipped: walked.skipped,
            files_unreadable: files.iter().filter(|f| f.stat.is_none()).count(),
            unreadable_dirs: walked.unreadable_dirs,
            empty_roots: walked.empty_roots,
            series,
            elapsed: start.elapsed(),
            issues,
        };
        info!(
            library = config.id,
            series = scan.series.len(),
            files = scan.total_files,
            skipped = scan.files_skipped,
            elapsed = ?scan.elapsed,
            "library scan grouped"
        );
        Ok(scan)
    }

    fn parse_all(
        &self,
        files: &[DiscoveredFile],
        config: &LibraryConfig,
    ) -> Vec<(ParsedInfo, Vec<ScanIssue>)> {
        files
            .par_iter()
            .map(|file| {
                let outcome =
                    self.parser
                        .parse_with_diagnostics(&file.path, &file.root, config.library_type);
                let mut info = outcome.info;
                let mut issues = outcome.issues;
                if let Some(hints) = self.metadata.as_ref().and_then(|m| m.hints(&file.path)) {
                    hints.apply(&mut info);
                    issues.extend(malformed_hints(&file.path, &hints, &info));
                }
                (info, issues)
            })
            .collect()
    }
}

/// Issues for hinted volume or chapter tokens that carry no number.
fn malformed_hints(path: &Path, hints: &MetadataHints, info: &ParsedInfo) -> Vec<ScanIssue> {
    if info.is_special {
        return Vec::new();
    }
    [("volume", &hints.volume), ("chapter", &hints.chapter)]
        .into_iter()
        .filter_map(|(field, token)| {
            let token = token.as_deref()?.trim();
            if token.is_empty() || !NumberRange::parse(token).malformed {
                return None;
            }
            debug!(path = %path.display(), field, token, "malformed range in metadata");
            Some(ScanIssue::malformed_range(path, field, token))
        })
        .collect()
}

/// Group files into series, volumes and chapters.
///
/// Files are put in natural path order first, so the result does not depend
/// on the order they arrive in.
pub fn group_series(
    library_id: LibraryId,
    mut files: Vec<ScannedFile>,
    sorter: &NaturalSortComparer,
) -> Vec<ScannedSeries> {
    sorter.sort_by_path(&mut files, |f| f.info.full_path.as_path());
    let aliases = localized_aliases(&files);

    let mut groups: BTreeMap<String, Vec<ScannedFile>> = BTreeMap::new();
    for file in files {
        let key = resolve_alias(&aliases, normalize(&file.info.series));
        groups.entry(key).or_default().push(file);
    }

    groups
        .into_iter()
        .map(|(key, files)| build_series(library_id, key, files, sorter))
        .collect()
}

/// Map each localized name key to the key of the series that claimed it.
fn localized_aliases(files: &[ScannedFile]) -> HashMap<String, String> {
    let mut aliases = HashMap::new();
    for file in files {
        let Some(localized) = file.info.localized_series.as_deref() else {
            continue;
        };
        let alias = normalize(localized);
        let canonical = normalize(&file.info.series);
        if alias.is_empty() || alias == canonical {
            continue;
        }
        aliases.entry(alias).or_insert(canonical);
    }
    aliases
}

fn resolve_alias(aliases: &HashMap<String, String>, key: String) -> String {
    let mut current = key;
    for _ in 0..aliases.len() {
        match aliases.get(&current) {
            Some(next) if *next != current => current = next.clone(),
            _ => break,
        }
    }
    current
}

fn build_series(
    library_id: LibraryId,
    key: String,
    files: Vec<ScannedFile>,
    sorter: &NaturalSortComparer,
) -> ScannedSeries {
    // The file that carries a localized name speaks for the group.
    let lead = files
        .iter()
        .find(|f| f.info.localized_series.is_some())
        .or_else(|| files.first());
    let name = lead.map(|f| f.info.series.clone()).unwrap_or_else(|| key.clone());
    let localized_name = lead.and_then(|f| f.info.localized_series.clone());
    let format = files.first().map(|f| f.info.format).unwrap_or_default();
    let folder_path = common_folder(files.iter().map(|f| f.info.full_path.as_path()));

    let mut aliases: Vec<String> = Vec::new();
    for file in &files {
        if file.info.series != name && !aliases.contains(&file.info.series) {
            aliases.push(file.info.series.clone());
        }
    }

    let mut volumes: Vec<VolumeBucket> = Vec::new();
    for file in files {
        let volume_range = NumberRange::parse(file.info.volume_key());
        let volume_idx = match volumes.iter().position(|v| v.min_number == volume_range.min) {
            Some(idx) => idx,
            None => {
                volumes.push(VolumeBucket {
                    name: file.info.volume_key().to_string(),
                    min_number: volume_range.min,
                    max_number: volume_range.max,
                    chapters: Vec::new(),
                });
                volumes.len() - 1
            }
        };
        let volume = &mut volumes[volume_idx];
        let chapter_idx = match volume.chapters.iter().position(|c| c.accepts(&file.info)) {
            Some(idx) => idx,
            None => {
                volume.chapters.push(ChapterBucket::from_info(&file.info));
                volume.chapters.len() - 1
            }
        };
        volume.chapters[chapter_idx].files.push(file);
    }

    volumes.sort_by(|a, b| {
        range::compare_volume_numbers(a.min_number, b.min_number)
            .then_with(|| sorter.compare(&a.name, &b.name, true))
    });
    for volume in &mut volumes {
        volume.chapters.sort_by(|a, b| {
            a.is_special
                .cmp(&b.is_special)
                .then_with(|| a.min_number.total_cmp(&b.min_number))
                .then_with(|| sorter.compare(&a.range, &b.range, true))
        });
    }

    debug!(series = %name, key = %key, volumes = volumes.len(), "grouped series");
    ScannedSeries {
        library_id,
        name,
        normalized_name: key,
        localized_name,
        aliases,
        format,
        folder_path,
        volumes,
    }
}

/// Deepest directory that contains every path.
fn common_folder<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
    let mut common: Option<PathBuf> = None;
    for path in paths {
        let parent = path.parent()?;
        common = Some(match common {
            None => parent.to_path_buf(),
            Some(current) => current
                .components()
                .zip(parent.components())
                .take_while(|(a, b)| a == b)
                .map(|(a, _)| a)
                .collect(),
        });
    }
    common.filter(|p| !p.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;

    fn scanned(info: ParsedInfo) -> ScannedFile {
        ScannedFile {
            info,
            stat: Some(FileStat::new(1, DateTime::<Utc>::UNIX_EPOCH)),
        }
    }

    #[test]
    fn test_group_folds_spelling_variants() {
        let sorter = NaturalSortComparer::new();
        let files = vec![
            scanned(ParsedInfo::new("Akame ga KILL!", "/m/a/Akame ga KILL! v01.cbz").with_volumes("1")),
            scanned(ParsedInfo::new("Akame ga Kill", "/m/a/Akame ga Kill v02.cbz").with_volumes("2")),
        ];
        let series = group_series(1, files, &sorter);
        assert_eq!(series.len(), 1);
        // "Kill v02" sorts before "KILL! v01", so its spelling names the group.
        assert_eq!(series[0].name, "Akame ga Kill");
        assert_eq!(series[0].aliases, vec!["Akame ga KILL!"]);
        assert_eq!(series[0].volumes.len(), 2);
    }

    #[test]
    fn test_localized_hint_redirects_group() {
        let sorter = NaturalSortComparer::new();
        let mut hinted = ParsedInfo::new("Attack on Titan", "/m/aot/Attack on Titan v02.cbz").with_volumes("2");
        hinted.localized_series = Some("Shingeki no Kyojin".to_string());
        let files = vec![
            scanned(hinted),
            scanned(ParsedInfo::new("Shingeki no Kyojin", "/m/aot/Shingeki no Kyojin v01.cbz").with_volumes("1")),
        ];
        let series = group_series(1, files, &sorter);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "Attack on Titan");
        assert_eq!(series[0].localized_name.as_deref(), Some("Shingeki no Kyojin"));
        assert!(series[0].answers_to("shingeki no kyojin"));
    }

    #[test]
    fn test_buckets_merge_equal_numbers() {
        let sorter = NaturalSortComparer::new();
        let files = vec![
            scanned(ParsedInfo::new("A", "/m/A/A v01 c001.cbz").with_volumes("01").with_chapters("001")),
            scanned(ParsedInfo::new("A", "/m/A/A v1 c1.zip").with_volumes("1").with_chapters("1")),
        ];
        let series = group_series(1, files, &sorter);
        assert_eq!(series[0].volumes.len(), 1);
        assert_eq!(series[0].volumes[0].name, "01");
        assert_eq!(series[0].volumes[0].chapters.len(), 1);
        assert_eq!(series[0].volumes[0].chapters[0].files.len(), 2);
    }

    #[test]
    fn test_volume_order_puts_sentinels_last() {
        let sorter = NaturalSortComparer::new();
        let mut special = ParsedInfo::new("A", "/m/A/Specials/A Omake.cbz");
        special.is_special = true;
        special.title = "A Omake".to_string();
        let files = vec![
            scanned(special),
            scanned(ParsedInfo::new("A", "/m/A/A c010.cbz").with_chapters("010")),
            scanned(ParsedInfo::new("A", "/m/A/A v10.cbz").with_volumes("10")),
            scanned(ParsedInfo::new("A", "/m/A/A v2.cbz").with_volumes("2")),
        ];
        let series = group_series(1, files, &sorter);
        let names: Vec<_> = series[0].volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["2", "10", range::LOOSE_LEAF_VOLUME, range::SPECIAL_VOLUME]);
        assert!(series[0].volumes[3].is_special());
        assert_eq!(series[0].volumes[3].chapters[0].range, "A Omake");
    }

    #[test]
    fn test_common_folder() {
        let paths = [Path::new("/m/A/Vol 1/a.cbz"), Path::new("/m/A/Vol 2/b.cbz")];
        assert_eq!(common_folder(paths), Some(PathBuf::from("/m/A")));
        assert_eq!(common_folder(std::iter::empty()), None);
    }

    #[test]
    fn test_alias_resolution_stops_on_cycles() {
        let mut aliases = HashMap::new();
        aliases.insert("a".to_string(), "b".to_string());
        aliases.insert("b".to_string(), "a".to_string());
        let resolved = resolve_alias(&aliases, "a".to_string());
        assert!(resolved == "a" || resolved == "b");
    }
}
