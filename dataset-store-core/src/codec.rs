//! Record encodings used inside dataset data files

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// On-disk encoding of individual records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// One compact JSON document per line
    #[default]
    Json,

    /// Bincode frames, each prefixed with its length as a little-endian u32
    Bincode,
}

impl Format {
    /// File extension used for data files in this format
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Bincode => "bin",
        }
    }

    /// Encode one record for `dataset`
    pub fn encode<T: Serialize>(&self, dataset: &str, record: &T) -> Result<Vec<u8>> {
        match self {
            Format::Json => serde_json::to_vec(record).map_err(|e| Error::record_io(dataset, e)),
            Format::Bincode => bincode::serialize(record).map_err(|e| Error::record_io(dataset, e)),
        }
    }

    /// Decode one record of `dataset`
    pub fn decode<T: DeserializeOwned>(&self, dataset: &str, bytes: &[u8]) -> Result<T> {
        match self {
            Format::Json => serde_json::from_slice(bytes).map_err(|e| Error::record_io(dataset, e)),
            Format::Bincode => bincode::deserialize(bytes).map_err(|e| Error::record_io(dataset, e)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Bincode => write!(f, "bincode"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value: Option<f64>,
    }

    #[test]
    fn test_json_is_single_line() {
        let reading = Reading { sensor: "line\nbreak".into(), value: None };
        let bytes = Format::Json.encode("reading", &reading).unwrap();
        assert!(!bytes.contains(&b'\n'));
        assert_eq!(Format::Json.decode::<Reading>("reading", &bytes).unwrap(), reading);
    }

    #[test]
    fn test_bincode_keeps_nulls() {
        let reading = Reading { sensor: "t1".into(), value: None };
        let bytes = Format::Bincode.encode("reading", &reading).unwrap();
        let decoded: Reading = Format::Bincode.decode("reading", &bytes).unwrap();
        assert_eq!(decoded.value, None);
    }

    #[test]
    fn test_decode_failure_is_record_io() {
        let err = Format::Json.decode::<Reading>("reading", b"{not json").unwrap_err();
        assert!(matches!(err, Error::RecordIo { ref dataset, .. } if dataset == "reading"));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Format::Bincode).unwrap(), "\"bincode\"");
        assert_eq!(Format::default(), Format::Json);
        assert_eq!(Format::Bincode.extension(), "bin");
    }
}
