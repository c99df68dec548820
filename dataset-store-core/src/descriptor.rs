//! Dataset descriptors and per-type dataset definitions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::Format;
use crate::schema::Schema;

/// Everything a repository needs to provision or describe a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Schema of the stored records
    schema: Schema,

    /// Record encoding
    format: Format,

    /// Free-form properties stored with the dataset
    #[serde(default)]
    properties: BTreeMap<String, String>,

    /// Where the dataset lives, filled in by the repository
    #[serde(skip)]
    location: Option<PathBuf>,
}

impl DatasetDescriptor {
    /// Create a descriptor for `schema` using the default format
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            format: Format::default(),
            properties: BTreeMap::new(),
            location: None,
        }
    }

    /// Set the record format
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Add a property
    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Replace all properties
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Record where the dataset is stored
    pub fn with_location<P: AsRef<Path>>(mut self, location: P) -> Self {
        self.location = Some(location.as_ref().to_path_buf());
        self
    }

    /// Get the schema
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Get the record format
    pub fn format(&self) -> Format {
        self.format
    }

    /// Get all properties
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Get a single property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Get the storage location, if the repository has one
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }
}

/// How datasets for one record type should be provisioned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetDefinition {
    /// Record format; `None` falls back to the template default
    pub format: Option<Format>,

    /// Properties stored with the dataset
    pub properties: BTreeMap<String, String>,
}

impl DatasetDefinition {
    /// Definition using the given format
    pub fn with_format(format: Format) -> Self {
        Self {
            format: Some(format),
            properties: BTreeMap::new(),
        }
    }

    /// Add a property
    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    /// Build the descriptor for `schema`, using `default_format` when no
    /// format was chosen
    pub fn descriptor(&self, schema: Schema, default_format: Format) -> DatasetDescriptor {
        DatasetDescriptor::new(schema)
            .with_format(self.format.unwrap_or(default_format))
            .with_properties(self.properties.clone())
    }
}
