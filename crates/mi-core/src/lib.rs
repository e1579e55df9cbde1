//! Core functionality for the measurement ingest workspace
//!
//! This crate holds the I/O-free pieces: decoding caller supplied paths,
//! column-name normalization, the in-memory table model and the ingest
//! configuration. File formats and the analytical store live in `mi-data`.

pub mod config;
pub mod naming;
pub mod source_path;
pub mod table;

use arrow::error::ArrowError;
use thiserror::Error;

// Re-export commonly used types
pub use config::{CollisionPolicy, IngestOptions, IN_MEMORY_STORE};
pub use naming::{normalize_column_name, resolve_column_names};
pub use source_path::SourcePath;
pub use table::{Table, TimedColumn, TIME_COLUMN};

/// Errors raised by the I/O-free layer
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("path is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),

    #[error("column '{name}' produced by both '{first}' and '{second}'")]
    ColumnCollision {
        name: String,
        first: String,
        second: String,
    },

    #[error("column '{column}' has {times} timestamps but {values} values")]
    LengthMismatch {
        column: String,
        times: usize,
        values: usize,
    },

    #[error("column '{0}' repeats a timestamp and cannot be aligned with the other columns")]
    AmbiguousTimeIndex(String),

    #[error("invalid time column: {0}")]
    InvalidTimeColumn(String),

    #[error("expected {expected} column names, got {actual}")]
    ColumnCount {
        expected: usize,
        actual: usize,
    },

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

pub mod source {
    use crate::table::{Table, TimedColumn};
    use crate::CoreError;

    /// A file format that can be turned into a time-indexed table
    pub trait MeasurementSource {
        /// Error type of the concrete reader
        type Error: From<CoreError>;

        /// Name used in log lines
        fn source_name(&self) -> &str;

        /// Every data column together with its own absolute time track
        fn timed_columns(&self) -> Result<Vec<TimedColumn>, Self::Error>;

        /// Align all columns on a shared time index
        fn to_table(&self) -> Result<Table, Self::Error> {
            let columns = self.timed_columns()?;
            Ok(Table::from_timed_columns(columns)?)
        }
    }
}

pub use source::MeasurementSource;
