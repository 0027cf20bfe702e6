use std::sync::atomic::{AtomicUsize, Ordering};

use super::{LogEntry, LogStore, StorageError};

/// Volatile log store, used by tests and single-process clusters.
#[derive(Debug, Default)]
pub struct MemLogStore {
    entries: Vec<LogEntry>,
    init_calls: AtomicUsize,
}

impl MemLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose last entry sits at `(term, index)`.
    pub fn with_last(term: u64, index: u64) -> Self {
        let mut store = Self::new();
        if index > 0 {
            store.entries.push(LogEntry {
                term,
                index,
                entry: String::new(),
            });
        }
        store
    }

    pub fn append(&mut self, term: u64, entry: &str) -> u64 {
        let index = self.entries.last().map_or(0, |e| e.index) + 1;
        self.entries.push(LogEntry {
            term,
            index,
            entry: entry.to_string(),
        });
        index
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }
}

impl LogStore for MemLogStore {
    fn init_log(&self) -> Result<(u64, u64), StorageError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.entries.last().map_or((0, 0), |e| (e.term, e.index)))
    }
}
