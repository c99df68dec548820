//! In-memory dataset repository
//!
//! Keeps every dataset as a vector of encoded records. Useful for tests and
//! for ephemeral stores; nothing survives the process.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info};

use crate::descriptor::DatasetDescriptor;
use crate::error::{Error, Result};
use crate::naming::validate_dataset_name;
use crate::repository::{DatasetHandle, DatasetRepository, RecordReader, RecordWriter};

type Records = Arc<RwLock<Vec<Vec<u8>>>>;

/// A repository holding all datasets in memory
#[derive(Debug, Default)]
pub struct InMemoryDatasetRepository {
    /// Datasets by name
    datasets: RwLock<HashMap<String, Arc<MemoryDataset>>>,

    /// Number of provisioning calls received
    provision_calls: AtomicUsize,
}

impl InMemoryDatasetRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `create` / `create_or_open` calls received so far
    pub fn provision_calls(&self) -> usize {
        self.provision_calls.load(Ordering::SeqCst)
    }

    /// Number of records currently stored in `name`
    pub fn record_count(&self, name: &str) -> Option<usize> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        datasets
            .get(name)
            .map(|dataset| dataset.records.read().unwrap_or_else(PoisonError::into_inner).len())
    }

    fn insert_new(
        datasets: &mut HashMap<String, Arc<MemoryDataset>>,
        name: &str,
        descriptor: &DatasetDescriptor,
    ) -> Arc<MemoryDataset> {
        let dataset = Arc::new(MemoryDataset {
            name: name.to_string(),
            descriptor: descriptor.clone(),
            records: Arc::default(),
        });
        datasets.insert(name.to_string(), Arc::clone(&dataset));
        info!(dataset = %name, format = %descriptor.format(), "created in-memory dataset");
        dataset
    }
}

impl DatasetRepository for InMemoryDatasetRepository {
    fn create(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
        validate_dataset_name(name)?;
        self.provision_calls.fetch_add(1, Ordering::SeqCst);

        let mut datasets = self.datasets.write().unwrap_or_else(PoisonError::into_inner);
        if datasets.contains_key(name) {
            return Err(Error::provisioning(name, "dataset already exists"));
        }

        Ok(Self::insert_new(&mut datasets, name, descriptor))
    }

    fn load(&self, name: &str) -> Result<Arc<dyn DatasetHandle>> {
        validate_dataset_name(name)?;
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        match datasets.get(name) {
            Some(dataset) => Ok(Arc::clone(dataset) as Arc<dyn DatasetHandle>),
            None => Err(Error::DatasetNotFound(name.to_string())),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        validate_dataset_name(name)?;
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        Ok(datasets.contains_key(name))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        validate_dataset_name(name)?;
        let mut datasets = self.datasets.write().unwrap_or_else(PoisonError::into_inner);
        let removed = datasets.remove(name).is_some();
        if removed {
            info!(dataset = %name, "deleted in-memory dataset");
        }
        Ok(removed)
    }

    fn list(&self) -> Result<Vec<String>> {
        let datasets = self.datasets.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = datasets.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn create_or_open(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
        validate_dataset_name(name)?;
        self.provision_calls.fetch_add(1, Ordering::SeqCst);

        let mut datasets = self.datasets.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = datasets.get(name) {
            return Ok(Arc::clone(existing) as Arc<dyn DatasetHandle>);
        }

        Ok(Self::insert_new(&mut datasets, name, descriptor))
    }
}

/// A dataset stored in memory
#[derive(Debug)]
pub struct MemoryDataset {
    name: String,
    descriptor: DatasetDescriptor,
    records: Records,
}

impl DatasetHandle for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    fn new_writer(&self) -> Result<Box<dyn RecordWriter>> {
        Ok(Box::new(MemoryRecordWriter {
            dataset: self.name.clone(),
            records: Arc::clone(&self.records),
            closed: false,
        }))
    }

    fn new_reader(&self) -> Result<Box<dyn RecordReader>> {
        let snapshot = self.records.read().unwrap_or_else(PoisonError::into_inner).clone();
        debug!(dataset = %self.name, records = snapshot.len(), "opened in-memory reader");
        Ok(Box::new(MemoryRecordReader {
            pending: snapshot.into(),
        }))
    }
}

/// Appends each record to the dataset as soon as it is written
struct MemoryRecordWriter {
    dataset: String,
    records: Records,
    closed: bool,
}

impl RecordWriter for MemoryRecordWriter {
    fn write(&mut self, record: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::record_io(&self.dataset, "write after close"));
        }
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.to_vec());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

/// Streams a snapshot taken when the reader was opened
struct MemoryRecordReader {
    pending: VecDeque<Vec<u8>>,
}

impl RecordReader for MemoryRecordReader {
    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.pending.pop_front())
    }

    fn close(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}
