use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or inconsistent index artifacts. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Artifact mismatch: lexical index has {matrix_rows} rows, metadata has {metadata_rows} entries")]
    ArtifactMismatch { matrix_rows: usize, metadata_rows: usize },

    #[error("Artifact mismatch at row {row}: lexical index has code {index_code}, metadata has {metadata_code}")]
    RowCodeMismatch {
        row: usize,
        index_code: String,
        metadata_code: String,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Duplicate catalog code: {0}")]
    DuplicateCode(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// True for errors that must stop the service from serving queries.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::ArtifactMismatch { .. } | Error::RowCodeMismatch { .. }
        )
    }
}

impl From<csv::Error> for Error {
    fn from(e: csv::Error) -> Self {
        Error::Catalog(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
