//! Per-library scan serialization with coalescing.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use kura_core::LibraryId;
use tracing::debug;

#[derive(Debug, Default)]
struct LockState {
    rerun_requested: bool,
}

/// Tracks which libraries have a scan in flight.
///
/// A second request for a busy library does not queue another scan: it sets
/// a rerun flag that the running scan picks up when it finishes.
#[derive(Debug, Clone, Default)]
pub struct LibraryScanLocks {
    active: Arc<DashMap<LibraryId, LockState>>,
}

/// Outcome of asking to scan a library.
#[derive(Debug)]
pub enum ScanTicket {
    /// The caller owns the library until the guard is finished or dropped.
    Started(ScanGuard),
    /// A scan is already running; it will run once more when it completes.
    Coalesced,
}

impl LibraryScanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `library`, or fold this request into the scan already running.
    pub fn try_begin(&self, library: LibraryId) -> ScanTicket {
        match self.active.entry(library) {
            Entry::Occupied(mut occupied) => {
                occupied.get_mut().rerun_requested = true;
                debug!(library, "scan already running, coalescing request");
                ScanTicket::Coalesced
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockState::default());
                ScanTicket::Started(ScanGuard {
                    active: Arc::clone(&self.active),
                    library,
                    released: false,
                })
            }
        }
    }

    /// Whether a scan of `library` is in flight.
    pub fn is_running(&self, library: LibraryId) -> bool {
        self.active.contains_key(&library)
    }
}

/// Exclusive claim on one library's scan slot.
#[derive(Debug)]
pub struct ScanGuard {
    active: Arc<DashMap<LibraryId, LockState>>,
    library: LibraryId,
    released: bool,
}

impl ScanGuard {
    pub fn library(&self) -> LibraryId {
        self.library
    }

    /// End the current pass. Returns `true` when another request arrived
    /// meanwhile; the guard is then still held and the caller should scan again.
    pub fn finish(&mut self) -> bool {
        if self.released {
            return false;
        }
        if self
            .active
            .remove_if(&self.library, |_, state| !state.rerun_requested)
            .is_some()
        {
            self.released = true;
            return false;
        }
        match self.active.get_mut(&self.library) {
            Some(mut state) => {
                state.rerun_requested = false;
                true
            }
            None => {
                self.released = true;
                false
            }
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        if !self.released {
            self.active.remove(&self.library);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_request_is_coalesced() {
        let locks = LibraryScanLocks::new();
        let ScanTicket::Started(mut guard) = locks.try_begin(1) else {
            panic!("first scan should start");
        };
        assert!(matches!(locks.try_begin(1), ScanTicket::Coalesced));
        assert!(matches!(locks.try_begin(1), ScanTicket::Coalesced));

        // Two requests collapse into a single rerun.
        assert!(guard.finish());
        assert!(locks.is_running(1));
        assert!(!guard.finish());
        assert!(!locks.is_running(1));
    }

    #[test]
    fn test_libraries_are_independent() {
        let locks = LibraryScanLocks::new();
        let first = locks.try_begin(1);
        let second = locks.try_begin(2);
        assert!(matches!(first, ScanTicket::Started(_)));
        assert!(matches!(second, ScanTicket::Started(_)));
    }

    #[test]
    fn test_drop_releases() {
        let locks = LibraryScanLocks::new();
        {
            let _ticket = locks.try_begin(7);
            assert!(locks.is_running(7));
        }
        assert!(!locks.is_running(7));
        assert!(matches!(locks.try_begin(7), ScanTicket::Started(_)));
    }
}
