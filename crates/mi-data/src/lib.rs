//! Data sources and the analytical store
//!
//! - `sources::tdms` reads TDMS measurement files
//! - `sources::csv_sample` dumps a CSV file as JSON rows
//! - `store` writes tables into the embedded store
//! - `ingest` ties the pieces together behind a single call

pub mod ingest;
pub mod sources;
pub mod store;

use std::path::PathBuf;

use arrow::error::ArrowError;
use mi_core::CoreError;
use thiserror::Error;

pub use ingest::{
    ingest, ingest_into, ingest_source, ingest_table, ingest_with, load_table, IngestReport,
};
pub use sources::{sample, sample_rows, Sample, TdmsFile};
pub use store::Store;

/// Errors that can occur while ingesting or sampling
#[derive(Error, Debug)]
pub enum DataError {
    #[error("source path is not valid UTF-8: {0}")]
    Decode(std::str::Utf8Error),

    #[error("cannot read {}: {source}", .path.display())]
    SourceRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed source file: {0}")]
    SourceFormat(String),

    #[error("unsupported source feature: {0}")]
    Unsupported(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("value cannot be stored: {0}")]
    StoreValue(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("schema error: {0}")]
    Schema(CoreError),

    #[error("Arrow error: {0}")]
    Arrow(ArrowError),
}

/// Coarse classification of a [`DataError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The path buffer was not valid UTF-8
    Decode,
    /// The source file is missing, unreadable or malformed
    SourceRead,
    /// The store rejected a connection or write
    Store,
    /// Output could not be rendered
    Serialization,
    /// Columns could not be named or aligned
    Schema,
}

impl DataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataError::Decode(_) => ErrorKind::Decode,
            DataError::SourceRead { .. }
            | DataError::SourceFormat(_)
            | DataError::Unsupported(_)
            | DataError::Csv(_) => ErrorKind::SourceRead,
            DataError::Store(_) | DataError::StoreValue(_) => ErrorKind::Store,
            DataError::Serialization(_) => ErrorKind::Serialization,
            DataError::Schema(_) | DataError::Arrow(_) => ErrorKind::Schema,
        }
    }
}

impl From<CoreError> for DataError {
    fn from(error: CoreError) -> Self {
        match error {
            CoreError::Decode(e) => DataError::Decode(e),
            CoreError::Arrow(e) => DataError::Arrow(e),
            e @ (CoreError::AmbiguousTimeIndex(_) | CoreError::LengthMismatch { .. }) => {
                DataError::SourceFormat(e.to_string())
            }
            other => DataError::Schema(other),
        }
    }
}

impl From<ArrowError> for DataError {
    fn from(error: ArrowError) -> Self {
        DataError::Arrow(error)
    }
}

impl From<serde_json::Error> for DataError {
    fn from(error: serde_json::Error) -> Self {
        DataError::Serialization(error.to_string())
    }
}
