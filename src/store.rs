//! JSON file-backed series store.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use kura_core::{LibraryId, Series, SeriesId};
use kura_reconcile::{ChangeSet, MemoryStore, SeriesStore, StoreError};

const STATE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StateFile {
    version: u32,
    series: Vec<Series>,
}

/// Keeps every library's series in one JSON document.
///
/// Changes live in memory until [`JsonStore::save`]; covers are written
/// next to the document as they arrive.
pub struct JsonStore {
    path: PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    /// Load the state file, or start empty when it does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let series = if path.exists() {
            let text = fs::read_to_string(&path).map_err(|source| StoreError::Io {
                path: path.clone(),
                source,
            })?;
            let state: StateFile =
                serde_json::from_str(&text).map_err(|err| StoreError::Corrupt {
                    path: path.clone(),
                    message: err.to_string(),
                })?;
            if state.version != STATE_VERSION {
                return Err(StoreError::Corrupt {
                    path,
                    message: format!("unsupported state version {}", state.version),
                });
            }
            state.series
        } else {
            Vec::new()
        };
        debug!(path = %path.display(), series = series.len(), "opened state");
        Ok(Self {
            path,
            inner: MemoryStore::from_series(series),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.inner.all()
    }

    fn covers_dir(&self) -> PathBuf {
        self.path.with_extension("covers")
    }

    /// Write the state file atomically.
    pub fn save(&self) -> Result<(), StoreError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StoreError::Io { path, source }
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }

        let state = StateFile {
            version: STATE_VERSION,
            series: self.inner.all().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&state).map_err(|err| StoreError::Corrupt {
            path: self.path.clone(),
            message: err.to_string(),
        })?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, json).map_err(io_err(&staging))?;
        fs::rename(&staging, &self.path).map_err(io_err(&self.path))?;
        info!(path = %self.path.display(), series = state.series.len(), "saved state");
        Ok(())
    }
}

impl SeriesStore for JsonStore {
    fn load_library(&self, library: LibraryId) -> Result<Vec<Series>, StoreError> {
        self.inner.load_library(library)
    }

    fn commit(&mut self, series: Series, changes: &ChangeSet) -> Result<Series, StoreError> {
        self.inner.commit(series, changes)
    }

    fn remove(&mut self, id: SeriesId) -> Result<(), StoreError> {
        let cover = self.covers_dir().join(format!("{}.img", id.0));
        if cover.exists() {
            fs::remove_file(&cover).map_err(|source| StoreError::Io { path: cover, source })?;
        }
        self.inner.remove(id)
    }

    fn save_cover(&mut self, id: SeriesId, bytes: Vec<u8>) -> Result<(), StoreError> {
        let dir = self.covers_dir();
        fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!("{}.img", id.0));
        fs::write(&path, &bytes).map_err(|source| StoreError::Io { path, source })?;
        self.inner.save_cover(id, bytes)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use kura_core::{Chapter, FileStat, MangaFile, MangaFormat, Volume};
    use kura_parse::normalize;
    use tempfile::TempDir;

    use super::*;

    fn series(name: &str) -> Series {
        let file = MangaFile::new(
            format!("/m/{name}/a.cbz"),
            MangaFormat::Archive,
            FileStat::new(10, DateTime::<Utc>::UNIX_EPOCH),
        );
        let mut series = Series::new(1, name, normalize);
        series
            .volumes
            .push(Volume::new("1").with_chapter(Chapter::new("1", false).with_file(file)));
        series
    }

    #[test]
    fn test_state_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state/kura.json");

        let mut store = JsonStore::open(&path).unwrap();
        let committed = store.commit(series("Beelzebub"), &ChangeSet::default()).unwrap();
        store.save().unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        let loaded = reopened.load_library(1).unwrap();
        assert_eq!(loaded, vec![committed]);

        // Ids continue after the loaded ones.
        let mut reopened = reopened;
        let next = reopened.commit(series("Vagabond"), &ChangeSet::default()).unwrap();
        assert_eq!(next.id, Some(SeriesId::new(5)));
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kura.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(JsonStore::open(&path), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_cover_written_beside_state() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonStore::open(temp.path().join("kura.json")).unwrap();
        let id = store
            .commit(series("Beelzebub"), &ChangeSet::default())
            .unwrap()
            .id
            .unwrap();
        store.save_cover(id, vec![0xFF, 0xD8]).unwrap();
        let cover = temp.path().join(format!("kura.covers/{}.img", id.0));
        assert_eq!(fs::read(&cover).unwrap(), vec![0xFF, 0xD8]);

        store.remove(id).unwrap();
        assert!(!cover.exists());
    }
}
