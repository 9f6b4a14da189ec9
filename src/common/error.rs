use thiserror::Error;

use super::types::PageId;

/// Database error types
#[derive(Error, Debug)]
pub enum FileHashError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt database: {0}")]
    Corrupt(String),

    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    #[error("Key not found")]
    KeyNotFound,

    #[error("Key already exists")]
    KeyExists,

    #[error("Record of {size} bytes exceeds the page capacity of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },

    #[error("Buffer pool is full, no evictable frames available")]
    PoolExhausted,

    #[error("Page {0} is latched by another pin")]
    PageBusy(PageId),

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Cannot open database: {0}")]
    Open(String),

    #[error("Database handle is in panic state")]
    PanicState,

    #[error("Database is opened read-only")]
    ReadOnly,

    #[error("User info of {len} bytes exceeds the reserved {max} bytes")]
    UserInfoTooLarge { len: usize, max: usize },

    #[error("Configuration {0} not found")]
    ConfigNotFound(u32),
}

impl FileHashError {
    /// Whether this error leaves the handle in an unknown state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FileHashError::Corrupt(_) | FileHashError::Invariant(_))
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        FileHashError::Corrupt(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FileHashError>;
