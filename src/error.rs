use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The caller broke the input contract (empty query, malformed record).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The chunk store could not be reached or answered with a failure.
    #[error("chunk store unavailable: {0}")]
    StoreUnavailable(String),

    /// The embedding model could not be loaded or invoked.
    #[error("encoder unavailable: {0}")]
    EncoderUnavailable(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),
}

impl Error {
    /// Whether a failed call may succeed if attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::StoreUnavailable(_)
                | Error::EncoderUnavailable(_)
                | Error::Io(_)
                | Error::Redb(_)
                | Error::RedbDatabase(_)
                | Error::RedbStorage(_)
                | Error::RedbTransaction(_)
                | Error::RedbTable(_)
                | Error::RedbCommit(_)
        )
    }

    /// Classify a failure raised by a chunk store.
    ///
    /// Contract violations pass through untouched; everything else the
    /// store reports is an infrastructure failure.
    pub fn into_store_failure(self) -> Error {
        match self {
            Error::InvalidInput(_)
            | Error::DimensionMismatch { .. }
            | Error::StoreUnavailable(_) => self,
            other => Error::StoreUnavailable(other.to_string()),
        }
    }

    /// Classify a failure raised by an encoder.
    pub fn into_encoder_failure(self) -> Error {
        match self {
            Error::InvalidInput(_)
            | Error::DimensionMismatch { .. }
            | Error::EncoderUnavailable(_) => self,
            other => Error::EncoderUnavailable(other.to_string()),
        }
    }
}

impl From<candle_core::Error> for Error {
    fn from(e: candle_core::Error) -> Self {
        Error::EncoderUnavailable(format!("tensor computation error: {e}"))
    }
}
