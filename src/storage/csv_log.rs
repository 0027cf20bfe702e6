use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use ::log::{debug, info};

use super::{LogEntry, LogStore, StorageError};

const HEADERS: [&str; 3] = ["Term", "Index", "Entry"];

/// Log store backed by a single CSV file with a `Term,Index,Entry` header.
pub struct CsvLogStore {
    path: PathBuf,
}

impl CsvLogStore {
    /// Opens the log at `path`, creating it (and its directory) when missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let store = Self { path };
        let fresh = match std::fs::metadata(&store.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        if fresh {
            info!("Creating log file at {}", store.path.display());
            store.rewrite(&[])?;
        }

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `entry` at the next index under `term` and returns that index.
    pub fn append(&self, term: u64, entry: &str) -> Result<u64, StorageError> {
        let (last_term, last_index) = self.init_log()?;
        if term < last_term {
            return Err(StorageError::InvalidEntry(format!(
                "term {term} is older than last logged term {last_term}"
            )));
        }

        let record = LogEntry {
            term,
            index: last_index + 1,
            entry: entry.to_string(),
        };

        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.serialize(&record)?;
        wtr.flush()?;

        debug!("Appended log entry {} (term {})", record.index, record.term);
        Ok(record.index)
    }

    pub fn latest(&self) -> Result<Option<LogEntry>, StorageError> {
        Ok(self.read_all()?.pop())
    }

    pub fn entry_at(&self, index: u64) -> Result<Option<LogEntry>, StorageError> {
        Ok(self.read_all()?.into_iter().find(|e| e.index == index))
    }

    /// Removes every entry at or after `index`. Returns how many were dropped.
    pub fn truncate_from(&self, index: u64) -> Result<usize, StorageError> {
        if index == 0 {
            return Err(StorageError::InvalidEntry("log indices start at 1".into()));
        }

        let entries = self.read_all()?;
        let before = entries.len();
        let kept: Vec<LogEntry> = entries.into_iter().filter(|e| e.index < index).collect();
        let removed = before - kept.len();

        if removed > 0 {
            self.rewrite(&kept)?;
        }
        Ok(removed)
    }

    fn read_all(&self) -> Result<Vec<LogEntry>, StorageError> {
        let file = File::open(&self.path)?;
        let mut rdr = csv::Reader::from_reader(file);

        let headers = rdr.headers()?;
        if headers.iter().ne(HEADERS.iter().copied()) {
            return Err(StorageError::HeaderMismatch {
                expected: HEADERS.join(","),
                found: headers.iter().collect::<Vec<_>>().join(","),
            });
        }

        let mut entries = Vec::new();
        for row in rdr.deserialize() {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn rewrite(&self, entries: &[LogEntry]) -> Result<(), StorageError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&self.path)?;
        wtr.write_record(HEADERS)?;
        for entry in entries {
            wtr.serialize(entry)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl LogStore for CsvLogStore {
    fn init_log(&self) -> Result<(u64, u64), StorageError> {
        match self.latest()? {
            Some(last) => Ok((last.term, last.index)),
            None => Ok((0, 0)),
        }
    }
}
