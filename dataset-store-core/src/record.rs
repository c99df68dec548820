//! Record types that can be stored as datasets
//!
//! A [`Record`] is any serde-serializable value type that can also describe
//! its own [`Schema`]. The type itself acts as the token used to look up its
//! dataset, so no runtime inspection of values is needed.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::naming;
use crate::schema::Schema;

/// A plain data type persisted as one record of its own dataset
///
/// Optional attributes should be `Option<_>` fields: `None` is written and
/// read back as null for every storage format.
///
/// # Example
///
/// ```rust
/// use dataset_store_core::{DataType, Record, Schema};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Person {
///     id: i64,
///     name: Option<String>,
/// }
///
/// impl Record for Person {
///     fn schema() -> Schema {
///         Schema::builder()
///             .required("id", DataType::Int64)
///             .optional("name", DataType::String)
///             .build()
///     }
/// }
///
/// assert_eq!(Person::dataset_name(), "person");
/// ```
pub trait Record: Serialize + DeserializeOwned + Send + 'static {
    /// Structural description of this type's fields
    fn schema() -> Schema;

    /// Identity of the dataset holding records of this type
    fn dataset_name() -> String {
        naming::default_dataset_name::<Self>()
    }
}
