//! JWalk-based traversal of library roots.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use jwalk::{Parallelism, WalkDir};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use kura_core::{
    FileStat, IssueKind, LibraryConfig, MangaFormat, ScanError, ScanIssue, normalize_path,
};

use crate::progress::{ScanPhase, ScanProgress};

/// A media file found under a library root.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// The library root the file was found under.
    pub root: PathBuf,
    pub format: MangaFormat,
    /// `None` when the file could not be stat'ed this pass.
    pub stat: Option<FileStat>,
}

/// Everything found while walking a library.
#[derive(Debug, Default)]
pub struct WalkResult {
    pub files: Vec<DiscoveredFile>,
    /// Files ignored by type or exclude pattern.
    pub skipped: usize,
    /// Directories that could not be listed.
    pub unreadable_dirs: Vec<PathBuf>,
    /// Roots that yielded no media files at all.
    pub empty_roots: Vec<PathBuf>,
    pub issues: Vec<ScanIssue>,
}

/// Walks library roots in parallel.
pub struct LibraryWalker {
    progress_tx: broadcast::Sender<ScanProgress>,
}

impl LibraryWalker {
    /// Create a walker reporting to its own progress channel.
    pub fn new() -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self { progress_tx }
    }

    /// Create a walker reporting to an existing channel.
    pub fn with_progress(progress_tx: broadcast::Sender<ScanProgress>) -> Self {
        Self { progress_tx }
    }

    /// Subscribe to walk progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<ScanProgress> {
        self.progress_tx.subscribe()
    }

    /// Walk every root of `config`.
    ///
    /// Fails only when a root itself is unusable; per-entry problems become issues.
    pub fn walk(&self, config: &LibraryConfig) -> Result<WalkResult, ScanError> {
        let start = Instant::now();
        let excludes = config.exclude_matcher()?;
        let mut result = WalkResult::default();
        let mut seen = HashSet::new();

        for root in &config.roots {
            let root_path = root.canonicalize().map_err(|err| {
                warn!(root = %root.display(), error = %err, "library root is inaccessible");
                ScanError::RootInaccessible { path: root.clone() }
            })?;
            if !root_path.is_dir() {
                return Err(ScanError::NotADirectory { path: root_path });
            }

            let parallelism = match config.threads {
                0 => Parallelism::RayonDefaultPool {
                    busy_timeout: std::time::Duration::from_millis(100),
                },
                n => Parallelism::RayonNewPool(n),
            };

            // Hidden entries are filtered below; the root itself is always walked.
            let filter = config.clone();
            let walker = WalkDir::new(&root_path)
                .parallelism(parallelism)
                .skip_hidden(false)
                .follow_links(config.follow_symlinks)
                .process_read_dir(move |_, _, _, children| {
                    children.retain(|entry| match entry {
                        Ok(entry) => {
                            entry.depth == 0
                                || !filter.is_builtin_ignored(&entry.file_name().to_string_lossy())
                        }
                        Err(_) => true,
                    });
                });
            let found_before = result.files.len();

            for entry_result in walker {
                let entry = match entry_result {
                    Ok(entry) => entry,
                    Err(err) => {
                        let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| root_path.clone());
                        warn!(path = %path.display(), error = %err, "failed to read directory entry");
                        result.issues.push(ScanIssue::new(
                            &path,
                            err.to_string(),
                            IssueKind::FileUnreadable,
                        ));
                        result.unreadable_dirs.push(path);
                        continue;
                    }
                };

                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                let relative = path.strip_prefix(&root_path).unwrap_or(&path);
                if excludes.is_match(relative) || excludes.is_match(entry.file_name()) {
                    debug!(path = %path.display(), "excluded by pattern");
                    result.skipped += 1;
                    continue;
                }

                let format = MangaFormat::from_path(&path);
                if !config.accepts(format) {
                    result.skipped += 1;
                    continue;
                }

                if !seen.insert(normalize_path(&path)) {
                    continue;
                }

                let stat = match entry.metadata() {
                    Ok(metadata) => Some(FileStat::from_metadata(&metadata)),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "failed to stat file");
                        result.issues.push(ScanIssue::new(
                            &path,
                            format!("Unreadable: {err}"),
                            IssueKind::FileUnreadable,
                        ));
                        None
                    }
                };

                result.files.push(DiscoveredFile {
                    path: path.clone(),
                    root: root_path.clone(),
                    format,
                    stat,
                });

                if result.files.len() % 1000 == 0 {
                    let _ = self.progress_tx.send(ScanProgress {
                        phase: ScanPhase::Walking,
                        files_found: result.files.len() as u64,
                        current_path: path,
                        errors_count: result.issues.len() as u64,
                        elapsed: start.elapsed(),
                        ..ScanProgress::default()
                    });
                }
            }

            if result.files.len() == found_before {
                warn!(root = %root_path.display(), "library root yielded no media files");
                result.empty_roots.push(root_path);
            }
        }

        debug!(
            files = result.files.len(),
            skipped = result.skipped,
            elapsed = ?start.elapsed(),
            "walk complete"
        );
        Ok(result)
    }
}

impl Default for LibraryWalker {
    fn default() -> Self {
        Self::new()
    }
}
