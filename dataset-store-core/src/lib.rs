//! Schema-backed dataset persistence for plain Rust records
//!
//! This crate provides the orchestration layer between record types and a
//! dataset repository. A [`DatasetTemplate`] derives a dataset name and schema
//! from a record type, provisions the backing dataset once per type, and runs
//! scoped write/read channels against it. Storage engines plug in through the
//! [`DatasetRepository`] trait; an in-memory implementation is included.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use dataset_store_core::{DataType, DatasetOperations, DatasetTemplate, InMemoryDatasetRepository, Record, Schema};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct Person {
//!     id: i64,
//!     name: Option<String>,
//! }
//!
//! impl Record for Person {
//!     fn schema() -> Schema {
//!         Schema::builder()
//!             .required("id", DataType::Int64)
//!             .optional("name", DataType::String)
//!             .build()
//!     }
//! }
//!
//! let template = DatasetTemplate::new(Arc::new(InMemoryDatasetRepository::new()));
//! template.write(&[Person { id: 22, name: Some("Sven".into()) }]).unwrap();
//!
//! let people: Vec<Person> = template.read().unwrap();
//! assert_eq!(people.len(), 1);
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod memory;
pub mod naming;
pub mod record;
pub mod repository;
pub mod resolver;
pub mod schema;
pub mod template;

// Re-export key types for convenience
pub use cache::DatasetCache;
pub use codec::Format;
pub use descriptor::{DatasetDefinition, DatasetDescriptor};
pub use error::{BoxError, Error, Result};
pub use memory::InMemoryDatasetRepository;
pub use record::Record;
pub use repository::{DatasetHandle, DatasetRepository, RecordReader, RecordWriter};
pub use resolver::SchemaResolver;
pub use schema::{DataType, Field, Schema, SchemaBuilder, TimeUnit};
pub use template::{DatasetOperations, DatasetTemplate, DatasetTemplateBuilder};
