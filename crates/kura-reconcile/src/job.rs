//! A complete library pass: walk, group, reconcile, commit.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use kura_core::{
    IssueKind, LibraryConfig, LibraryId, NaturalSortComparer, ScanError, ScanIssue, Series,
    normalize_path,
};
use kura_parse::normalize;
use kura_scan::{
    LibraryScan, LibraryScanLocks, ScanOrchestrator, ScanPhase, ScanProgress, ScanTicket,
    ScannedSeries,
};

use crate::changeset::ChangeSet;
use crate::engine::{ReconcileOutcome, ReconciliationEngine, VanishedOutcome};
use crate::error::{JobError, ReconcileError};
use crate::inspector::{BookInspector, NullInspector};
use crate::store::SeriesStore;

/// Summary of one library scan job.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LibraryScanReport {
    pub library_id: LibraryId,
    /// Another scan was running; this request was folded into it.
    pub coalesced: bool,
    /// Passes run, including reruns requested while scanning.
    pub passes: usize,
    pub files_parsed: usize,
    pub files_skipped: usize,
    pub files_unreadable: usize,
    pub series_added: usize,
    pub series_updated: usize,
    pub series_unchanged: usize,
    pub series_removed: usize,
    pub series_tombstoned: usize,
    pub series_failed: usize,
    /// Series left untouched because the job was cancelled or their root
    /// returned no files.
    pub series_skipped: usize,
    pub issues: Vec<ScanIssue>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

impl LibraryScanReport {
    fn coalesced(library_id: LibraryId) -> Self {
        Self {
            library_id,
            coalesced: true,
            ..Self::default()
        }
    }

    /// Issues that should be surfaced as warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &ScanIssue> {
        self.issues.iter().filter(|i| i.kind.is_warning())
    }

    /// Series touched by this pass.
    pub fn series_changed(&self) -> usize {
        self.series_added + self.series_updated + self.series_removed + self.series_tombstoned
    }
}

/// One scanned series paired with the stored series it converges.
struct SeriesUnit<'a> {
    scanned: &'a ScannedSeries,
    existing: Option<Series>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitStatus {
    Added,
    Updated,
    Unchanged,
    Failed,
    Skipped,
}

struct UnitResult {
    status: UnitStatus,
    issues: Vec<ScanIssue>,
}

impl UnitResult {
    fn status(status: UnitStatus) -> Self {
        Self {
            status,
            issues: Vec::new(),
        }
    }
}

/// Runs full library passes against a [`SeriesStore`].
pub struct LibraryScanJob<S> {
    orchestrator: ScanOrchestrator,
    store: Arc<Mutex<S>>,
    inspector: Arc<dyn BookInspector>,
    locks: LibraryScanLocks,
    cancel: CancellationToken,
    worker_threads: usize,
}

impl<S: SeriesStore> LibraryScanJob<S> {
    pub fn new(orchestrator: ScanOrchestrator, store: Arc<Mutex<S>>) -> Self {
        Self {
            orchestrator,
            store,
            inspector: Arc::new(NullInspector),
            locks: LibraryScanLocks::new(),
            cancel: CancellationToken::new(),
            worker_threads: 0,
        }
    }

    pub fn with_inspector(mut self, inspector: Arc<dyn BookInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    /// Share scan locks with other jobs over the same libraries.
    pub fn with_locks(mut self, locks: LibraryScanLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Size of the per-series worker pool; 0 picks the rayon default.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.orchestrator.subscribe()
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    /// Scan `config` and converge the store to it.
    ///
    /// A request for a library that is already being scanned returns a
    /// coalesced report at once; the running scan makes one more pass.
    pub fn run(&self, config: &LibraryConfig) -> Result<LibraryScanReport, JobError> {
        let mut guard = match self.locks.try_begin(config.id) {
            ScanTicket::Started(guard) => guard,
            ScanTicket::Coalesced => {
                info!(library = config.id, "scan already running, request coalesced");
                return Ok(LibraryScanReport::coalesced(config.id));
            }
        };

        let mut passes = 0;
        loop {
            passes += 1;
            let mut report = self.run_once(config)?;
            report.passes = passes;
            if report.cancelled || !guard.finish() {
                return Ok(report);
            }
            debug!(library = config.id, "rescan requested while scanning, running again");
        }
    }

    fn run_once(&self, config: &LibraryConfig) -> Result<LibraryScanReport, JobError> {
        let start = Instant::now();
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled.into());
        }

        let scan = self.orchestrator.scan_libraries_for_series(config).map_err(|err| {
            error!(library = config.id, error = %err, "library scan aborted");
            err
        })?;
        if self.cancel.is_cancelled() {
            return Err(ScanError::Cancelled.into());
        }

        let existing = self
            .store
            .lock()
            .load_library(config.id)
            .map_err(|source| JobError::Load {
                library: config.id,
                source,
            })?;
        let (units, unclaimed) = match_series(&scan.series, existing);

        let sorter = NaturalSortComparer::new();
        let engine = ReconciliationEngine::new(&sorter).with_unreadable_dirs(&scan.unreadable_dirs);
        let progress_tx = self.orchestrator.progress_sender();
        let total = units.len() as u64;
        let done = AtomicU64::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.worker_threads)
            .build()?;
        let results: Vec<UnitResult> = pool.install(|| {
            units
                .par_iter()
                .map(|unit| {
                    let result = self.process(unit, &engine);
                    let series_done = done.fetch_add(1, Ordering::Relaxed) + 1;
                    let _ = progress_tx.send(ScanProgress {
                        phase: ScanPhase::Reconciling,
                        files_found: scan.total_files as u64,
                        series_total: total,
                        series_done,
                        current_path: unit.scanned.folder_path.clone().unwrap_or_default(),
                        elapsed: start.elapsed(),
                        ..ScanProgress::default()
                    });
                    result
                })
                .collect()
        });

        let mut report = LibraryScanReport {
            library_id: config.id,
            files_parsed: scan.total_files,
            files_skipped: scan.files_skipped,
            files_unreadable: scan.files_unreadable,
            issues: scan.issues.clone(),
            ..LibraryScanReport::default()
        };
        for result in results {
            match result.status {
                UnitStatus::Added => report.series_added += 1,
                UnitStatus::Updated => report.series_updated += 1,
                UnitStatus::Unchanged => report.series_unchanged += 1,
                UnitStatus::Failed => report.series_failed += 1,
                UnitStatus::Skipped => report.series_skipped += 1,
            }
            report.issues.extend(result.issues);
        }

        report.cancelled = self.cancel.is_cancelled();
        if report.cancelled {
            warn!(
                library = config.id,
                skipped = report.series_skipped,
                "scan cancelled, vanished series left untouched"
            );
        } else {
            self.handle_vanished(&engine, &scan, unclaimed, &mut report);
        }

        sorter.clear();
        report.elapsed = start.elapsed();
        let _ = progress_tx.send(ScanProgress {
            phase: ScanPhase::Done,
            files_found: report.files_parsed as u64,
            series_total: total,
            series_done: done.load(Ordering::Relaxed),
            errors_count: report.issues.len() as u64,
            elapsed: report.elapsed,
            ..ScanProgress::default()
        });
        info!(
            library = config.id,
            files = report.files_parsed,
            skipped = report.files_skipped,
            added = report.series_added,
            updated = report.series_updated,
            removed = report.series_removed + report.series_tombstoned,
            failed = report.series_failed,
            elapsed = ?report.elapsed,
            "library scan complete"
        );
        Ok(report)
    }

    /// Reconcile and commit one series. Never panics the pool on failure.
    fn process(&self, unit: &SeriesUnit<'_>, engine: &ReconciliationEngine<'_>) -> UnitResult {
        if self.cancel.is_cancelled() {
            return UnitResult::status(UnitStatus::Skipped);
        }

        let outcome = match engine.reconcile(unit.existing.as_ref(), unit.scanned) {
            Ok(outcome) => outcome,
            Err(err) => return failed(unit.scanned, &err),
        };
        if outcome.changes.is_empty() {
            return UnitResult::status(UnitStatus::Unchanged);
        }

        let ReconcileOutcome {
            mut series,
            changes,
            cover,
        } = outcome;
        let mut issues = Vec::new();
        self.inspect(&mut series, &changes, &mut issues);
        series.last_scanned = Some(Utc::now());
        let format = series.format;

        let committed = match self.store.lock().commit(series, &changes) {
            Ok(committed) => committed,
            Err(err) => {
                let mut result = failed(unit.scanned, &ReconcileError::Store(err));
                result.issues.extend(issues);
                return result;
            }
        };

        if changes.cover_changed {
            if let (Some(path), Some(id)) = (cover, committed.id) {
                match self.inspector.cover_bytes(&path, format) {
                    Ok(Some(bytes)) => {
                        if let Err(err) = self.store.lock().save_cover(id, bytes) {
                            warn!(series = %committed.name, error = %err, "failed to save cover");
                            issues.push(ScanIssue::reconcile_failed(
                                &committed.name,
                                &path,
                                &err.to_string(),
                            ));
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "failed to read cover");
                        issues.push(ScanIssue::unreadable(&path, &err));
                    }
                }
            }
        }

        let status = if changes.created {
            UnitStatus::Added
        } else {
            UnitStatus::Updated
        };
        UnitResult { status, issues }
    }

    /// Recompute page counts for new and refreshed files.
    fn inspect(&self, series: &mut Series, changes: &ChangeSet, issues: &mut Vec<ScanIssue>) {
        let wanted: HashSet<String> = changes.files_to_inspect().map(normalize_path).collect();
        if wanted.is_empty() {
            return;
        }
        for volume in &mut series.volumes {
            for chapter in &mut volume.chapters {
                for file in &mut chapter.files {
                    if !wanted.contains(&file.normalized_path()) {
                        continue;
                    }
                    match self.inspector.page_count(&file.file_path, file.format) {
                        Ok(pages) => file.pages = pages,
                        Err(err) => {
                            warn!(path = %file.file_path.display(), error = %err, "failed to count pages");
                            issues.push(ScanIssue::unreadable(&file.file_path, &err));
                        }
                    }
                }
            }
        }
        series.update_pages();
    }

    fn handle_vanished(
        &self,
        engine: &ReconciliationEngine<'_>,
        scan: &LibraryScan,
        unclaimed: Vec<Series>,
        report: &mut LibraryScanReport,
    ) {
        for series in unclaimed {
            if series.deleted {
                continue;
            }
            if is_under_unreadable(scan, &series) {
                debug!(series = %series.name, "series folder unreadable, not treating as vanished");
                continue;
            }
            if is_under_empty_root(scan, &series) {
                warn!(series = %series.name, "library root is empty, keeping stored series");
                report.series_skipped += 1;
                report.issues.push(ScanIssue::new(
                    series.folder_path.clone().unwrap_or_default(),
                    format!(
                        "Series `{}` not found because its library root returned no files; kept",
                        series.name
                    ),
                    IssueKind::FileUnreadable,
                ));
                continue;
            }

            let path = series.folder_path.clone().unwrap_or_default();
            let result = match engine.reconcile_vanished(&series) {
                VanishedOutcome::Tombstone { series, changes } => self
                    .store
                    .lock()
                    .commit(series, &changes)
                    .map(|_| report.series_tombstoned += 1),
                VanishedOutcome::Remove { .. } => match series.id {
                    Some(id) => self
                        .store
                        .lock()
                        .remove(id)
                        .map(|_| report.series_removed += 1),
                    None => Ok(()),
                },
            };

            match result {
                Ok(()) => {
                    info!(series = %series.name, progress = series.has_progress, "series vanished");
                    report.issues.push(ScanIssue::new(
                        &path,
                        format!("Series `{}` vanished from disk", series.name),
                        IssueKind::SeriesVanished,
                    ));
                }
                Err(err) => {
                    warn!(series = %series.name, error = %err, "failed to remove vanished series");
                    report.series_failed += 1;
                    report.issues.push(ScanIssue::reconcile_failed(
                        &series.name,
                        &path,
                        &err.to_string(),
                    ));
                }
            }
        }
    }
}

fn failed(scanned: &ScannedSeries, err: &ReconcileError) -> UnitResult {
    warn!(series = %scanned.name, error = %err, "series reconciliation failed");
    let path = scanned
        .folder_path
        .clone()
        .or_else(|| scanned.files().next().map(|f| f.info.full_path.clone()))
        .unwrap_or_else(PathBuf::new);
    UnitResult {
        status: UnitStatus::Failed,
        issues: vec![ScanIssue::reconcile_failed(&scanned.name, path, &err.to_string())],
    }
}

fn is_under_unreadable(scan: &LibraryScan, series: &Series) -> bool {
    series
        .folder_path
        .as_deref()
        .is_some_and(|p| scan.is_under_unreadable(p))
        || series.files().any(|f| scan.is_under_unreadable(&f.file_path))
}

fn is_under_empty_root(scan: &LibraryScan, series: &Series) -> bool {
    series
        .folder_path
        .as_deref()
        .is_some_and(|p| scan.is_under_empty_root(p))
        || series.files().any(|f| scan.is_under_empty_root(&f.file_path))
}

/// Pair scanned series with stored ones.
///
/// Normalized names are tried first across all stored series, then
/// localized and original-name aliases. Each stored series is claimed once.
fn match_series(scanned: &[ScannedSeries], existing: Vec<Series>) -> (Vec<SeriesUnit<'_>>, Vec<Series>) {
    let mut taken: HashSet<usize> = HashSet::new();
    let mut claims: Vec<Option<usize>> = vec![None; scanned.len()];

    for (i, s) in scanned.iter().enumerate() {
        let found = existing
            .iter()
            .enumerate()
            .position(|(idx, e)| !taken.contains(&idx) && e.normalized_name == s.normalized_name);
        if let Some(idx) = found {
            taken.insert(idx);
            claims[i] = Some(idx);
        }
    }
    for (i, s) in scanned.iter().enumerate() {
        if claims[i].is_some() {
            continue;
        }
        let found = existing
            .iter()
            .enumerate()
            .position(|(idx, e)| !taken.contains(&idx) && is_alias(e, s));
        if let Some(idx) = found {
            taken.insert(idx);
            claims[i] = Some(idx);
        }
    }

    let mut pool: Vec<Option<Series>> = existing.into_iter().map(Some).collect();
    let units = scanned
        .iter()
        .zip(claims)
        .map(|(s, claim)| SeriesUnit {
            scanned: s,
            existing: claim.and_then(|idx| pool[idx].take()),
        })
        .collect();
    let unclaimed = pool.into_iter().flatten().collect();
    (units, unclaimed)
}

fn is_alias(stored: &Series, scanned: &ScannedSeries) -> bool {
    let key = scanned.normalized_name.as_str();
    stored.normalized_localized_name.as_deref() == Some(key)
        || normalize(&stored.original_name) == key
        || scanned.answers_to(&stored.name)
        || stored
            .localized_name
            .as_deref()
            .is_some_and(|l| scanned.answers_to(l))
}

#[cfg(test)]
mod tests {
    use kura_core::{MangaFormat, ParsedInfo};
    use kura_scan::{ScannedFile, group_series};

    use super::*;

    fn scanned(names: &[&str]) -> Vec<ScannedSeries> {
        let sorter = NaturalSortComparer::new();
        let files = names
            .iter()
            .map(|name| ScannedFile {
                info: ParsedInfo::new(*name, format!("/m/{name}/{name} v01.cbz")).with_volumes("1"),
                stat: None,
            })
            .collect();
        group_series(1, files, &sorter)
    }

    fn stored(name: &str) -> Series {
        let mut series = Series::new(1, name, normalize);
        series.format = MangaFormat::Archive;
        series
    }

    #[test]
    fn test_match_by_normalized_name() {
        let scanned = scanned(&["Beelzebub", "Vagabond"]);
        let (units, unclaimed) = match_series(&scanned, vec![stored("VAGABOND"), stored("Gone")]);
        assert!(units[0].existing.is_none());
        assert_eq!(units[1].existing.as_ref().map(|s| s.name.as_str()), Some("VAGABOND"));
        assert_eq!(unclaimed.len(), 1);
        assert_eq!(unclaimed[0].name, "Gone");
        assert_eq!(units[1].existing.as_ref().unwrap().normalized_name, "vagabond");
    }

    #[test]
    fn test_match_by_localized_alias() {
        let scanned = scanned(&["Shingeki no Kyojin"]);
        let mut aot = stored("Attack on Titan");
        aot.set_localized_name(Some("Shingeki no Kyojin"), normalize);
        let (units, unclaimed) = match_series(&scanned, vec![aot]);
        assert_eq!(
            units[0].existing.as_ref().map(|s| s.name.as_str()),
            Some("Attack on Titan")
        );
        assert!(unclaimed.is_empty());
    }

    #[test]
    fn test_exact_match_wins_over_alias() {
        let scanned = scanned(&["Shingeki no Kyojin"]);
        let mut aot = stored("Attack on Titan");
        aot.set_localized_name(Some("Shingeki no Kyojin"), normalize);
        let exact = stored("Shingeki no Kyojin");
        let (units, unclaimed) = match_series(&scanned, vec![aot, exact]);
        assert_eq!(
            units[0].existing.as_ref().map(|s| s.name.as_str()),
            Some("Shingeki no Kyojin")
        );
        assert_eq!(unclaimed.len(), 1);
    }
}
