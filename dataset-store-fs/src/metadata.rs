//! Dataset metadata stored under `<dataset>/.metadata`
//!
//! The directory holds `descriptor.json` (format version, record format and
//! properties) and `schema.json`. It is assembled in a hidden staging
//! directory and renamed into place, so a dataset either has complete
//! metadata or none at all.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use dataset_store_core::{DatasetDescriptor, Error, Format, Result, Schema};

/// Name of the metadata directory inside a dataset directory
pub const METADATA_DIR: &str = ".metadata";

/// Descriptor file inside the metadata directory
pub const DESCRIPTOR_FILE: &str = "descriptor.json";

/// Schema file inside the metadata directory
pub const SCHEMA_FILE: &str = "schema.json";

/// Current metadata layout version
pub const METADATA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct DescriptorFile {
    version: u32,
    format: Format,
    #[serde(default)]
    properties: BTreeMap<String, String>,
}

/// Check whether `dataset_dir` holds dataset metadata
pub fn has_metadata(dataset_dir: &Path) -> bool {
    dataset_dir.join(METADATA_DIR).is_dir()
}

/// Write metadata for `descriptor` into `dataset_dir`
pub fn write_metadata(dataset_dir: &Path, name: &str, descriptor: &DatasetDescriptor) -> Result<()> {
    let staging = dataset_dir.join(format!("{}-{}.tmp", METADATA_DIR, Uuid::new_v4()));

    let staged = fs::create_dir(&staging).and_then(|()| {
        let header = DescriptorFile {
            version: METADATA_VERSION,
            format: descriptor.format(),
            properties: descriptor.properties().clone(),
        };
        write_json(&staging.join(DESCRIPTOR_FILE), &header)?;
        write_json(&staging.join(SCHEMA_FILE), descriptor.schema())?;
        fs::rename(&staging, dataset_dir.join(METADATA_DIR))
    });

    if let Err(e) = staged {
        // Staging directories are hidden, a leftover is harmless
        let _ = fs::remove_dir_all(&staging);
        return Err(Error::provisioning(name, e));
    }

    Ok(())
}

/// Read the descriptor stored in `dataset_dir`
pub fn read_metadata(dataset_dir: &Path, name: &str) -> Result<DatasetDescriptor> {
    let metadata_dir = dataset_dir.join(METADATA_DIR);
    if !metadata_dir.is_dir() {
        return Err(Error::DatasetNotFound(name.to_string()));
    }

    let header: DescriptorFile = read_json(&metadata_dir.join(DESCRIPTOR_FILE), name)?;
    if header.version != METADATA_VERSION {
        return Err(Error::CorruptedMetadata {
            dataset: name.to_string(),
            reason: format!("unsupported metadata version {}", header.version),
        });
    }
    let schema: Schema = read_json(&metadata_dir.join(SCHEMA_FILE), name)?;

    Ok(DatasetDescriptor::new(schema)
        .with_format(header.format)
        .with_properties(header.properties)
        .with_location(dataset_dir))
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.sync_all()
}

fn read_json<T: DeserializeOwned>(path: &Path, name: &str) -> Result<T> {
    let corrupted = |reason: String| Error::CorruptedMetadata {
        dataset: name.to_string(),
        reason,
    };

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(corrupted(format!("missing {}", path.display())));
        }
        Err(e) => return Err(Error::Io(e)),
    };

    serde_json::from_slice(&bytes).map_err(|e| corrupted(format!("{}: {}", path.display(), e)))
}
