//! Filesystem dataset repository for dataset-store
//!
//! Stores each dataset as a directory of data files next to a `.metadata`
//! directory holding its descriptor and schema. Plug it into a
//! [`dataset_store_core::DatasetTemplate`]:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dataset_store_core::DatasetTemplate;
//! use dataset_store_fs::{FileSystemDatasetRepository, RepositoryConfig};
//!
//! let repository = FileSystemDatasetRepository::open(RepositoryConfig::new("/var/lib/datasets"))?;
//! let template = DatasetTemplate::new(Arc::new(repository));
//! # Ok::<(), dataset_store_core::Error>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod metadata;
pub mod reader;
pub mod repository;
pub mod writer;

pub use config::{RepositoryConfig, DEFAULT_BUFFER_SIZE};
pub use reader::DataFileReader;
pub use repository::{FileSystemDataset, FileSystemDatasetRepository};
pub use writer::DataFileWriter;
