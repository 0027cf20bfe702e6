use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Unexpected log header: expected {expected}, found {found}")]
    HeaderMismatch { expected: String, found: String },

    #[error("Invalid log entry: {0}")]
    InvalidEntry(String),
}
