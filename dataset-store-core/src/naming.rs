//! Dataset identity naming
//!
//! Maps a record type to the string identity used to look up and create its
//! dataset. Derivation is pure: the same type always yields the same name.

use crate::error::{Error, Result};

/// Longest dataset name accepted by repositories
pub const MAX_DATASET_NAME_LEN: usize = 255;

/// Derive the default dataset name for `T`
///
/// Module paths are dropped and every type in the name, generic arguments
/// included, contributes its lowercased simple name, joined by `_`. So
/// `Wrapper<A>` and `Wrapper<B>` map to `wrapper_a` and `wrapper_b`.
pub fn default_dataset_name<T: ?Sized>() -> String {
    simple_name(std::any::type_name::<T>())
}

/// Reduce a fully qualified type name to its lowercased simple names
pub fn simple_name(type_name: &str) -> String {
    type_name
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == ':'))
        .filter_map(|path| path.rsplit("::").next())
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Check that `name` is usable as a dataset identity
pub fn validate_dataset_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument("dataset name must not be empty".into()));
    }
    if name.len() > MAX_DATASET_NAME_LEN {
        return Err(Error::InvalidArgument(format!(
            "dataset name is {} bytes long (max: {})",
            name.len(),
            MAX_DATASET_NAME_LEN
        )));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(Error::InvalidArgument(format!("dataset name '{}' must start with a letter, digit or '_'", name)));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(Error::InvalidArgument(format!("dataset name '{}' contains invalid character {:?}", name, bad)));
    }

    Ok(())
}
