//! Schema definition for stored record types

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Data type for record fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean type
    Boolean,

    /// 8-bit signed integer
    Int8,

    /// 16-bit signed integer
    Int16,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 8-bit unsigned integer
    UInt8,

    /// 16-bit unsigned integer
    UInt16,

    /// 32-bit unsigned integer
    UInt32,

    /// 64-bit unsigned integer
    UInt64,

    /// 16-bit floating point
    Float16,

    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// UTF-8 encoded string
    String,

    /// Binary data
    Binary,

    /// Fixed-size binary data
    FixedSizeBinary(usize),

    /// Timestamp with optional timezone
    Timestamp(TimeUnit, Option<String>),

    /// Date (days since UNIX epoch)
    Date32,

    /// Date (milliseconds since UNIX epoch)
    Date64,

    /// Time of day with 32-bit resolution
    Time32(TimeUnit),

    /// Time of day with 64-bit resolution
    Time64(TimeUnit),

    /// Decimal value with precision and scale
    Decimal(usize, usize),

    /// List of values with a given type
    List(Box<DataType>),

    /// Nested record with named fields
    Struct(Vec<Field>),

    /// Map from key type to value type
    Map(Box<DataType>, Box<DataType>),

    /// Union type
    Union(Vec<DataType>),

    /// Null type
    Null,
}

/// Time unit for temporal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    /// Second
    Second,

    /// Millisecond
    Millisecond,

    /// Microsecond
    Microsecond,

    /// Nanosecond
    Nanosecond,
}

impl DataType {
    /// Check that values of this type can be stored, reporting the offending
    /// field path otherwise
    pub fn check_storable(&self, path: &str) -> Result<()> {
        let unsupported = |reason: String| Err(Error::UnsupportedSchema(format!("field '{}': {}", path, reason)));

        match self {
            DataType::Float16 => unsupported("Float16 has no storage mapping".into()),
            DataType::Union(_) => unsupported("union types have no storage mapping".into()),
            DataType::Null => unsupported("Null is not a column type".into()),
            DataType::FixedSizeBinary(0) => unsupported("FixedSizeBinary must have a non-zero width".into()),
            DataType::Decimal(precision, scale) if *precision == 0 || scale > precision => {
                unsupported(format!("invalid Decimal({}, {})", precision, scale))
            }
            DataType::Map(key, value) => {
                if **key != DataType::String {
                    return unsupported(format!("map keys must be String, found {}", key));
                }
                value.check_storable(&format!("{}.value", path))
            }
            DataType::List(item) => item.check_storable(&format!("{}.item", path)),
            DataType::Struct(fields) => {
                if fields.is_empty() {
                    return unsupported("nested records need at least one field".into());
                }
                check_fields(fields, Some(path))
            }
            _ => Ok(()),
        }
    }
}

/// Validate a list of sibling fields: unique names, storable types
fn check_fields(fields: &[Field], parent: Option<&str>) -> Result<()> {
    let mut seen = HashSet::with_capacity(fields.len());

    for field in fields {
        let path = match parent {
            Some(parent) => format!("{}.{}", parent, field.name),
            None => field.name.clone(),
        };

        if field.name.is_empty() {
            return Err(Error::UnsupportedSchema(format!("empty field name under '{}'", parent.unwrap_or("<root>"))));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(Error::UnsupportedSchema(format!("duplicate field '{}'", path)));
        }

        field.data_type.check_storable(&path)?;
    }

    Ok(())
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Int8 => write!(f, "Int8"),
            DataType::Int16 => write!(f, "Int16"),
            DataType::Int32 => write!(f, "Int32"),
            DataType::Int64 => write!(f, "Int64"),
            DataType::UInt8 => write!(f, "UInt8"),
            DataType::UInt16 => write!(f, "UInt16"),
            DataType::UInt32 => write!(f, "UInt32"),
            DataType::UInt64 => write!(f, "UInt64"),
            DataType::Float16 => write!(f, "Float16"),
            DataType::Float32 => write!(f, "Float32"),
            DataType::Float64 => write!(f, "Float64"),
            DataType::String => write!(f, "String"),
            DataType::Binary => write!(f, "Binary"),
            DataType::FixedSizeBinary(size) => write!(f, "FixedSizeBinary({})", size),
            DataType::Timestamp(unit, tz) => {
                if let Some(tz) = tz {
                    write!(f, "Timestamp({}, '{}')", unit, tz)
                } else {
                    write!(f, "Timestamp({})", unit)
                }
            }
            DataType::Date32 => write!(f, "Date32"),
            DataType::Date64 => write!(f, "Date64"),
            DataType::Time32(unit) => write!(f, "Time32({})", unit),
            DataType::Time64(unit) => write!(f, "Time64({})", unit),
            DataType::Decimal(precision, scale) => write!(f, "Decimal({}, {})", precision, scale),
            DataType::List(item_type) => write!(f, "List({})", item_type),
            DataType::Struct(fields) => {
                write!(f, "Struct({{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, "}})")
            }
            DataType::Map(key_type, value_type) => write!(f, "Map({} -> {})", key_type, value_type),
            DataType::Union(types) => {
                write!(f, "Union(")?;
                for (i, dtype) in types.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}", dtype)?;
                }
                write!(f, ")")
            }
            DataType::Null => write!(f, "Null"),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Second => write!(f, "Second"),
            TimeUnit::Millisecond => write!(f, "Millisecond"),
            TimeUnit::Microsecond => write!(f, "Microsecond"),
            TimeUnit::Nanosecond => write!(f, "Nanosecond"),
        }
    }
}

/// A field in a schema, with a name, data type, and nullability
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Name of the field
    pub name: String,

    /// Data type of the field
    pub data_type: DataType,

    /// Whether the field can be null
    pub nullable: bool,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
            metadata: None,
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this field
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// Check if this field is nullable
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Get a specific metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.get(key).map(String::as_str))
    }

    /// Set a metadata value
    pub fn set_metadata_value(&mut self, key: &str, value: &str) {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}: {} (nullable)", self.name, self.data_type)
        } else {
            write!(f, "{}: {} (non-nullable)", self.name, self.data_type)
        }
    }
}

/// A schema describing a record type's structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SchemaParts")]
pub struct Schema {
    /// Fields in this schema
    fields: Vec<Field>,

    /// Field indices by name for faster lookup
    #[serde(skip)]
    field_indices: HashMap<String, usize>,

    /// Additional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<BTreeMap<String, String>>,
}

/// Serialized shape of a [`Schema`]; the name index is rebuilt on load
#[derive(Deserialize)]
struct SchemaParts {
    fields: Vec<Field>,
    #[serde(default)]
    metadata: Option<BTreeMap<String, String>>,
}

impl From<SchemaParts> for Schema {
    fn from(parts: SchemaParts) -> Self {
        let mut schema = Schema::new(parts.fields);
        schema.metadata = parts.metadata;
        schema
    }
}

impl Schema {
    /// Create a new schema with the given fields
    pub fn new(fields: Vec<Field>) -> Self {
        let mut field_indices = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            field_indices.insert(field.name.clone(), i);
        }

        Self {
            fields,
            field_indices,
            metadata: None,
        }
    }

    /// Start building a schema field by field
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field by index
    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.field_indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("Field not found: {}", name)))
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Get a specific metadata value
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.get(key).map(String::as_str))
    }

    /// Set a metadata value
    pub fn set_metadata_value(&mut self, key: &str, value: &str) {
        self.metadata
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_string(), value.to_string());
    }

    /// Check that every field of this schema maps onto a storage type
    pub fn validate_for_storage(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::UnsupportedSchema("record types need at least one field".into()));
        }

        check_fields(&self.fields, None)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            writeln!(f, "  {}", field)?;
        }
        Ok(())
    }
}

/// Builder for [`Schema`]
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
    metadata: BTreeMap<String, String>,
}

impl SchemaBuilder {
    /// Add a non-nullable field
    pub fn required(mut self, name: &str, data_type: DataType) -> Self {
        self.fields.push(Field::new(name, data_type, false));
        self
    }

    /// Add a nullable field
    pub fn optional(mut self, name: &str, data_type: DataType) -> Self {
        self.fields.push(Field::new(name, data_type, true));
        self
    }

    /// Add a fully specified field
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Attach a schema-level metadata entry
    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Build the schema
    pub fn build(self) -> Schema {
        let mut schema = Schema::new(self.fields);
        if !self.metadata.is_empty() {
            schema.metadata = Some(self.metadata);
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn person_schema() -> Schema {
        Schema::builder()
            .required("id", DataType::Int64)
            .optional("name", DataType::String)
            .optional("birth_date", DataType::Timestamp(TimeUnit::Millisecond, None))
            .build()
    }

    #[test]
    fn test_builder_and_lookup() {
        let schema = person_schema();
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.index_of("name").unwrap(), 1);
        assert!(schema.field_by_name("name").unwrap().is_nullable());
        assert!(!schema.field(0).unwrap().is_nullable());
        assert!(schema.index_of("missing").is_err());
        assert!(schema.validate_for_storage().is_ok());
    }

    #[test]
    fn test_json_round_trip_rebuilds_index() {
        let mut schema = person_schema();
        schema.set_metadata_value("owner", "tests");

        let json = serde_json::to_string(&schema).unwrap();
        let restored: Schema = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, schema);
        assert_eq!(restored.index_of("birth_date").unwrap(), 2);
        assert_eq!(restored.metadata_value("owner"), Some("tests"));
    }

    #[test_case(DataType::Float16 ; "half floats")]
    #[test_case(DataType::Union(vec![DataType::Int32, DataType::String]) ; "unions")]
    #[test_case(DataType::Null ; "null columns")]
    #[test_case(DataType::FixedSizeBinary(0) ; "zero width binary")]
    #[test_case(DataType::Decimal(4, 6) ; "scale above precision")]
    #[test_case(DataType::Map(Box::new(DataType::Int32), Box::new(DataType::String)) ; "non string map keys")]
    #[test_case(DataType::List(Box::new(DataType::Null)) ; "list of nulls")]
    #[test_case(DataType::Struct(Vec::new()) ; "empty nested record")]
    fn test_unsupported_types(data_type: DataType) {
        let schema = Schema::builder()
            .required("id", DataType::Int64)
            .optional("bad", data_type)
            .build();

        let err = schema.validate_for_storage().unwrap_err();
        assert!(matches!(err, Error::UnsupportedSchema(ref msg) if msg.contains("bad")), "{}", err);
    }

    #[test]
    fn test_nested_path_in_error() {
        let address = DataType::Struct(vec![
            Field::new("street", DataType::String, true),
            Field::new("geo", DataType::Float16, true),
        ]);
        let schema = Schema::builder().required("address", address).build();

        let err = schema.validate_for_storage().unwrap_err();
        assert!(err.to_string().contains("address.geo"));
    }

    #[test]
    fn test_duplicate_and_empty_schemas_rejected() {
        let duplicated = Schema::builder()
            .required("id", DataType::Int64)
            .optional("id", DataType::String)
            .build();
        assert!(duplicated.validate_for_storage().is_err());
        assert!(Schema::new(Vec::new()).validate_for_storage().is_err());
    }

    #[test]
    fn test_nested_supported_types() {
        let schema = Schema::builder()
            .required("tags", DataType::List(Box::new(DataType::String)))
            .optional("attrs", DataType::Map(Box::new(DataType::String), Box::new(DataType::Float64)))
            .optional("price", DataType::Decimal(10, 2))
            .build();
        assert!(schema.validate_for_storage().is_ok());
    }

    #[test]
    fn test_display() {
        let schema = person_schema();
        let rendered = schema.to_string();
        assert!(rendered.starts_with("Schema: 3 fields"));
        assert!(rendered.contains("name: String (nullable)"));
        assert!(rendered.contains("Timestamp(Millisecond)"));
    }
}
