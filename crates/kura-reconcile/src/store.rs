//! Persistence collaborator.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use kura_core::{IdAllocator, LibraryId, Series, SeriesId};

use crate::changeset::ChangeSet;
use crate::error::StoreError;

/// Owns stored series and assigns ids to inserted entities.
pub trait SeriesStore: Send {
    /// Every stored series of a library, tombstones included.
    fn load_library(&self, library: LibraryId) -> Result<Vec<Series>, StoreError>;

    /// Persist a reconciled series. Returns it with ids assigned.
    fn commit(&mut self, series: Series, changes: &ChangeSet) -> Result<Series, StoreError>;

    /// Drop a series and everything it owns.
    fn remove(&mut self, id: SeriesId) -> Result<(), StoreError>;

    /// Store the cover image of a series.
    fn save_cover(&mut self, id: SeriesId, bytes: Vec<u8>) -> Result<(), StoreError>;
}

/// In-process store.
#[derive(Debug)]
pub struct MemoryStore {
    series: BTreeMap<SeriesId, Series>,
    covers: HashMap<SeriesId, Vec<u8>>,
    ids: IdAllocator,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::from_series(Vec::new())
    }

    /// Seed the store; entities without ids get one.
    pub fn from_series(series: Vec<Series>) -> Self {
        let mut ids = IdAllocator::after(series.iter());
        let series = series
            .into_iter()
            .filter_map(|mut s| {
                ids.assign(&mut s);
                s.id.map(|id| (id, s))
            })
            .collect();
        Self {
            series,
            covers: HashMap::new(),
            ids,
            commits: 0,
        }
    }

    pub fn get(&self, id: SeriesId) -> Option<&Series> {
        self.series.get(&id)
    }

    /// Mutable access for callers that record reading progress.
    pub fn get_mut(&mut self, id: SeriesId) -> Option<&mut Series> {
        self.series.get_mut(&id)
    }

    pub fn find_by_name(&self, library: LibraryId, name: &str) -> Option<&Series> {
        self.series
            .values()
            .find(|s| s.library_id == library && s.name == name)
    }

    pub fn cover(&self, id: SeriesId) -> Option<&[u8]> {
        self.covers.get(&id).map(Vec::as_slice)
    }

    pub fn all(&self) -> impl Iterator<Item = &Series> {
        self.series.values()
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Number of successful commits.
    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn into_series(self) -> Vec<Series> {
        self.series.into_values().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesStore for MemoryStore {
    fn load_library(&self, library: LibraryId) -> Result<Vec<Series>, StoreError> {
        Ok(self
            .series
            .values()
            .filter(|s| s.library_id == library)
            .cloned()
            .collect())
    }

    fn commit(&mut self, mut series: Series, changes: &ChangeSet) -> Result<Series, StoreError> {
        if series.id.is_none() {
            let duplicate = self.series.values().any(|s| {
                s.library_id == series.library_id
                    && !s.deleted
                    && s.normalized_name == series.normalized_name
            });
            if duplicate {
                return Err(StoreError::Rejected {
                    series: series.name,
                    message: "a series with the same normalized name already exists".into(),
                });
            }
        }

        self.ids.assign(&mut series);
        let Some(id) = series.id else {
            return Err(StoreError::Rejected {
                series: series.name,
                message: "no id assigned".into(),
            });
        };
        debug!(series = %series.name, id = id.0, changes = %changes.summary(), "committed series");
        self.series.insert(id, series.clone());
        self.commits += 1;
        Ok(series)
    }

    fn remove(&mut self, id: SeriesId) -> Result<(), StoreError> {
        self.covers.remove(&id);
        self.series
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { id: id.0 })
    }

    fn save_cover(&mut self, id: SeriesId, bytes: Vec<u8>) -> Result<(), StoreError> {
        if !self.series.contains_key(&id) {
            return Err(StoreError::NotFound { id: id.0 });
        }
        self.covers.insert(id, bytes);
        Ok(())
    }
}
