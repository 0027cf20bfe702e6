mod csv_log;
mod error;
mod memory;

use serde::{Deserialize, Serialize};

pub use self::csv_log::CsvLogStore;
pub use self::error::StorageError;
pub use self::memory::MemLogStore;

/// One row of the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogEntry {
    pub term: u64,
    pub index: u64,
    pub entry: String,
}

/// Durable log as seen by the consensus core. Only the startup read is
/// required; entry-level operations live on the concrete stores.
pub trait LogStore: Send + Sync {
    /// Last known `(term, index)`, or `(0, 0)` for an empty log.
    fn init_log(&self) -> Result<(u64, u64), StorageError>;
}
