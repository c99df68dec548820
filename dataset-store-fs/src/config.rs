//! Configuration for filesystem repositories

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dataset_store_core::{Error, Result};

/// Default write buffer size (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

fn default_create_base_path() -> bool {
    true
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

/// Configuration for a [`crate::FileSystemDatasetRepository`]
///
/// Can be deserialized; every key except `base_path` is optional:
///
/// ```json
/// { "base_path": "/var/lib/datasets", "buffer_size": 131072, "sync_on_close": true }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Directory holding one sub-directory per dataset
    pub base_path: PathBuf,

    /// Create `base_path` when the repository is opened
    #[serde(default = "default_create_base_path")]
    pub create_base_path: bool,

    /// Buffer size for data file channels
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Fsync data files when a write channel closes
    #[serde(default)]
    pub sync_on_close: bool,
}

impl RepositoryConfig {
    /// Configuration rooted at `base_path` with default settings
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            create_base_path: default_create_base_path(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            sync_on_close: false,
        }
    }

    /// Parse a configuration from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidArgument(format!("invalid repository configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    /// Set whether the base path is created on open
    pub fn create_base_path(mut self, create: bool) -> Self {
        self.create_base_path = create;
        self
    }

    /// Set the channel buffer size
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Set whether data files are fsynced on close
    pub fn sync_on_close(mut self, sync: bool) -> Self {
        self.sync_on_close = sync;
        self
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if self.base_path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("base_path must not be empty".into()));
        }
        if self.buffer_size == 0 {
            return Err(Error::InvalidArgument("buffer_size must be greater than 0".into()));
        }
        Ok(())
    }
}
