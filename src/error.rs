use thiserror::Error;

/// Errors produced by ledger operations.
///
/// `InvalidInput` and `NotFound` are the two caller-facing kinds; everything
/// else is a storage failure that the access layer reports as a server error.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("Gasto não encontrado")]
    NotFound(i64),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LedgerError {
    /// True for the error kinds caused by the caller rather than the store.
    pub fn is_client_error(&self) -> bool {
        matches!(self, LedgerError::InvalidInput(_) | LedgerError::NotFound(_))
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
