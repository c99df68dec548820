//! Error types for dataset persistence

use std::io;
use thiserror::Error;

/// Boxed error used to carry foreign causes (codecs, caller callbacks)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for dataset operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for dataset operations
#[derive(Error, Debug)]
pub enum Error {
    /// Null, empty or malformed input to an operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A field type has no storage mapping
    #[error("Unsupported schema: {0}")]
    UnsupportedSchema(String),

    /// Backing storage for a dataset could not be created
    #[error("Failed to provision dataset '{dataset}': {source}")]
    DatasetProvisioning {
        /// Name of the dataset being provisioned
        dataset: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// The named dataset does not exist in the repository
    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    /// Stored dataset metadata could not be interpreted
    #[error("Corrupted metadata for dataset '{dataset}': {reason}")]
    CorruptedMetadata {
        /// Name of the dataset
        dataset: String,
        /// What was wrong with the metadata
        reason: String,
    },

    /// Record serialization or channel I/O failed
    #[error("Record I/O error on dataset '{dataset}': {source}")]
    RecordIo {
        /// Name of the dataset being read or written
        dataset: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// Error raised by a caller-supplied callback
    #[error("Callback error: {0}")]
    Callback(#[source] BoxError),

    /// I/O error outside a record channel
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Wrap an error raised inside a record or repository callback
    pub fn callback<E: Into<BoxError>>(error: E) -> Self {
        Error::Callback(error.into())
    }

    /// Record I/O failure on `dataset`
    pub fn record_io<E: Into<BoxError>>(dataset: &str, error: E) -> Self {
        Error::RecordIo {
            dataset: dataset.to_string(),
            source: error.into(),
        }
    }

    /// Provisioning failure on `dataset`
    pub fn provisioning<E: Into<BoxError>>(dataset: &str, error: E) -> Self {
        Error::DatasetProvisioning {
            dataset: dataset.to_string(),
            source: error.into(),
        }
    }

    /// Whether this error came from a caller-supplied callback
    pub fn is_callback(&self) -> bool {
        matches!(self, Error::Callback(_))
    }
}
