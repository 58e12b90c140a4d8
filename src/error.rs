use thiserror::Error;

#[derive(Error, Debug)]
pub enum KruzhokError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for KruzhokError {
    fn from(e: rocksdb::Error) -> Self {
        KruzhokError::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, KruzhokError>;
