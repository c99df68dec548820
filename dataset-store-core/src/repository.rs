//! Repository, dataset handle and record channel traits
//!
//! A [`DatasetRepository`] manages named, schema-typed datasets. Opening a
//! dataset yields a [`DatasetHandle`], from which scoped record channels are
//! obtained: a [`RecordWriter`] to append encoded records and a
//! [`RecordReader`] to stream them back. Channels carry encoded record bytes;
//! encoding is chosen by the dataset's [`crate::Format`].

use std::fmt;
use std::sync::Arc;

use crate::descriptor::DatasetDescriptor;
use crate::error::Result;

/// The backing service managing every dataset
#[cfg_attr(test, mockall::automock)]
pub trait DatasetRepository: Send + Sync {
    /// Provision a new dataset; fails if `name` already exists
    fn create(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>>;

    /// Open an existing dataset
    ///
    /// Returns [`crate::Error::DatasetNotFound`] when `name` does not exist.
    fn load(&self, name: &str) -> Result<Arc<dyn DatasetHandle>>;

    /// Check whether a dataset exists
    fn exists(&self, name: &str) -> Result<bool>;

    /// Remove a dataset with all of its records and metadata
    ///
    /// Returns `Ok(false)` if there was nothing to delete.
    fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all datasets, sorted
    fn list(&self) -> Result<Vec<String>>;

    /// Open `name` if it exists, otherwise provision it with `descriptor`
    ///
    /// Schema compatibility of an existing dataset is left to the repository.
    fn create_or_open(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
        if self.exists(name)? {
            self.load(name)
        } else {
            self.create(name, descriptor)
        }
    }
}

/// An open, provisioned dataset
pub trait DatasetHandle: Send + Sync + fmt::Debug {
    /// Dataset name
    fn name(&self) -> &str;

    /// Descriptor the dataset was provisioned with
    fn descriptor(&self) -> &DatasetDescriptor;

    /// Open a channel appending records to this dataset
    fn new_writer(&self) -> Result<Box<dyn RecordWriter>>;

    /// Open a channel streaming every record of this dataset
    fn new_reader(&self) -> Result<Box<dyn RecordReader>>;
}

/// Write channel over a dataset
///
/// Records written before a failure stay written. `close` flushes and is
/// idempotent; implementations flush on drop when `close` was never called.
pub trait RecordWriter: Send {
    /// Append one encoded record
    fn write(&mut self, record: &[u8]) -> Result<()>;

    /// Flush and release the channel
    fn close(&mut self) -> Result<()>;
}

/// Read channel over a dataset
pub trait RecordReader: Send {
    /// Next encoded record, or `None` once exhausted
    fn next_record(&mut self) -> Result<Option<Vec<u8>>>;

    /// Release the channel
    fn close(&mut self) -> Result<()>;
}
