//! Filesystem dataset repository
//!
//! Every dataset is a directory under the repository base path:
//!
//! ```text
//! <base>/<name>/.metadata/descriptor.json
//! <base>/<name>/.metadata/schema.json
//! <base>/<name>/<uuid>.json | <uuid>.bin
//! ```
//!
//! A dataset exists once its `.metadata` directory is in place. Each write
//! channel that receives at least one record adds one data file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use dataset_store_core::naming::validate_dataset_name;
use dataset_store_core::{
    DatasetDescriptor, DatasetHandle, DatasetRepository, Error, RecordReader, RecordWriter, Result,
};

use crate::config::RepositoryConfig;
use crate::metadata::{has_metadata, read_metadata, write_metadata};
use crate::reader::{list_data_files, DataFileReader};
use crate::writer::DataFileWriter;

/// Outcome of an attempt to provision a dataset directory
enum Provisioned {
    /// Metadata was written by this call
    Created(Arc<FileSystemDataset>),

    /// The dataset already had metadata
    Existing,
}

/// A dataset repository backed by a local directory
#[derive(Debug, Clone)]
pub struct FileSystemDatasetRepository {
    config: RepositoryConfig,
}

impl FileSystemDatasetRepository {
    /// Open a repository with the given configuration
    pub fn open(config: RepositoryConfig) -> Result<Self> {
        config.validate()?;

        let base = &config.base_path;
        if base.exists() {
            if !base.is_dir() {
                return Err(Error::InvalidArgument(format!(
                    "repository base path {} is not a directory",
                    base.display()
                )));
            }
        } else if config.create_base_path {
            fs::create_dir_all(base)?;
            info!(base_path = %base.display(), "created repository base path");
        } else {
            return Err(Error::InvalidArgument(format!(
                "repository base path {} does not exist",
                base.display()
            )));
        }

        debug!(base_path = %base.display(), "opened filesystem repository");
        Ok(Self { config })
    }

    /// Open a repository rooted at `base_path` with default settings
    pub fn at<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        Self::open(RepositoryConfig::new(base_path))
    }

    /// Get the configuration
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Directory holding every dataset
    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Directory of the dataset called `name`
    pub fn dataset_path(&self, name: &str) -> PathBuf {
        self.config.base_path.join(name)
    }

    fn handle(&self, name: &str, descriptor: DatasetDescriptor) -> Arc<FileSystemDataset> {
        let path = self.dataset_path(name);
        Arc::new(FileSystemDataset {
            name: name.to_string(),
            descriptor: descriptor.with_location(&path),
            path,
            buffer_size: self.config.buffer_size,
            sync_on_close: self.config.sync_on_close,
        })
    }

    fn provision(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Provisioned> {
        validate_dataset_name(name)?;
        let dir = self.dataset_path(name);

        let claimed = match fs::create_dir(&dir) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                if has_metadata(&dir) {
                    return Ok(Provisioned::Existing);
                }
                if !dir.is_dir() {
                    return Err(Error::provisioning(name, format!("{} is not a directory", dir.display())));
                }
                // Left behind by an interrupted provisioning, adopt it
                false
            }
            Err(e) => return Err(Error::provisioning(name, e)),
        };

        if let Err(e) = write_metadata(&dir, name, descriptor) {
            if has_metadata(&dir) {
                // Another process finished first
                return Ok(Provisioned::Existing);
            }
            if claimed {
                let _ = fs::remove_dir_all(&dir);
            }
            return Err(e);
        }

        info!(dataset = %name, format = %descriptor.format(), path = %dir.display(), "created dataset");
        Ok(Provisioned::Created(self.handle(name, descriptor.clone())))
    }
}

impl DatasetRepository for FileSystemDatasetRepository {
    fn create(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
        match self.provision(name, descriptor)? {
            Provisioned::Created(dataset) => Ok(dataset as Arc<dyn DatasetHandle>),
            Provisioned::Existing => Err(Error::provisioning(name, "dataset already exists")),
        }
    }

    fn load(&self, name: &str) -> Result<Arc<dyn DatasetHandle>> {
        validate_dataset_name(name)?;
        let descriptor = read_metadata(&self.dataset_path(name), name)?;
        debug!(dataset = %name, format = %descriptor.format(), "loaded dataset");
        Ok(self.handle(name, descriptor) as Arc<dyn DatasetHandle>)
    }

    fn exists(&self, name: &str) -> Result<bool> {
        validate_dataset_name(name)?;
        Ok(has_metadata(&self.dataset_path(name)))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        validate_dataset_name(name)?;
        let dir = self.dataset_path(name);
        let existed = has_metadata(&dir);

        match fs::remove_dir_all(&dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Error::Io(e)),
        }

        if existed {
            info!(dataset = %name, "deleted dataset");
        } else {
            debug!(dataset = %name, "removed dataset directory without metadata");
        }
        Ok(existed)
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.config.base_path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if validate_dataset_name(&name).is_ok() && has_metadata(&entry.path()) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn create_or_open(&self, name: &str, descriptor: &DatasetDescriptor) -> Result<Arc<dyn DatasetHandle>> {
        match self.provision(name, descriptor)? {
            Provisioned::Created(dataset) => Ok(dataset as Arc<dyn DatasetHandle>),
            Provisioned::Existing => {
                let dataset = self.load(name)?;
                if dataset.descriptor().schema() != descriptor.schema() {
                    warn!(dataset = %name, "stored schema differs from the requested schema, using the stored one");
                }
                Ok(dataset)
            }
        }
    }
}

/// A dataset stored in a directory
#[derive(Debug)]
pub struct FileSystemDataset {
    name: String,
    descriptor: DatasetDescriptor,
    path: PathBuf,
    buffer_size: usize,
    sync_on_close: bool,
}

impl FileSystemDataset {
    /// Directory holding the dataset
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Published data files, sorted by file name
    pub fn data_files(&self) -> Result<Vec<PathBuf>> {
        Ok(list_data_files(&self.path, self.descriptor.format())?)
    }
}

impl DatasetHandle for FileSystemDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> &DatasetDescriptor {
        &self.descriptor
    }

    fn new_writer(&self) -> Result<Box<dyn RecordWriter>> {
        if !has_metadata(&self.path) {
            return Err(Error::DatasetNotFound(self.name.clone()));
        }
        Ok(Box::new(DataFileWriter::new(
            &self.name,
            &self.path,
            self.descriptor.format(),
            self.buffer_size,
            self.sync_on_close,
        )))
    }

    fn new_reader(&self) -> Result<Box<dyn RecordReader>> {
        if !has_metadata(&self.path) {
            return Err(Error::DatasetNotFound(self.name.clone()));
        }
        Ok(Box::new(DataFileReader::open(
            &self.name,
            &self.path,
            self.descriptor.format(),
            self.buffer_size,
        )?))
    }
}
