//! Schema resolution for record types
//!
//! Schemas are derived from [`Record::schema`], checked against the storage
//! type system once, and memoized per type for the resolver's lifetime.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::error::Result;
use crate::record::Record;
use crate::schema::Schema;

/// Memoizing schema registry keyed by record type
#[derive(Debug, Default)]
pub struct SchemaResolver {
    schemas: RwLock<HashMap<TypeId, Arc<Schema>>>,
}

impl SchemaResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the storage schema for `T`
    ///
    /// Fails with [`crate::Error::UnsupportedSchema`] if a field has no
    /// storage mapping. Failures are not memoized.
    pub fn resolve<T: Record>(&self) -> Result<Arc<Schema>> {
        let key = TypeId::of::<T>();

        if let Some(schema) = self.schemas.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(schema));
        }

        let schema = T::schema();
        schema.validate_for_storage()?;
        debug!(record = std::any::type_name::<T>(), fields = schema.len(), "resolved schema");

        // A racing resolver may have inserted first; keep whichever landed
        let mut schemas = self.schemas.write().unwrap_or_else(PoisonError::into_inner);
        let entry = schemas.entry(key).or_insert_with(|| Arc::new(schema));
        Ok(Arc::clone(entry))
    }

    /// Whether a schema for `T` has been resolved
    pub fn is_resolved<T: Record>(&self) -> bool {
        self.schemas
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }
}
