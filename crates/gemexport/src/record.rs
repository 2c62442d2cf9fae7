//! Row and schema types shared by the segment and WAL decoders.
//!
//! Segment chunks are columnar: a schema (with a trailing `time` column) plus
//! one value column per field and a timestamp column. WAL frames decode into
//! row-oriented [`Row`] values. Both shapes end up in the emitter, which
//! formats one output line per row.

/// Name of the implicit trailing timestamp column in a chunk schema.
pub const TIME_COLUMN: &str = "time";

/// Value type of a field column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FieldType {
    /// 64-bit IEEE float.
    Float = 0,
    /// Signed 64-bit integer.
    Integer = 1,
    /// Boolean.
    Boolean = 2,
    /// UTF-8 string.
    String = 3,
}

impl FieldType {
    /// Creates a FieldType from a u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Float),
            1 => Some(Self::Integer),
            2 => Some(Self::Boolean),
            3 => Some(Self::String),
            _ => None,
        }
    }
}

/// One column of a chunk schema: a field name and its value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    /// Field name. The last schema entry is always [`TIME_COLUMN`].
    pub name: String,
    /// Value type of the column.
    pub typ: FieldType,
}

impl FieldSchema {
    /// Creates a new schema column.
    pub fn new(name: impl Into<String>, typ: FieldType) -> Self {
        Self {
            name: name.into(),
            typ,
        }
    }
}

/// Columnar values for one field across all rows of a chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Float column.
    Float(Vec<f64>),
    /// Integer column.
    Integer(Vec<i64>),
    /// Boolean column.
    Boolean(Vec<bool>),
    /// String column.
    String(Vec<String>),
}

impl ColumnValues {
    /// Number of rows in the column.
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Integer(v) => v.len(),
            Self::Boolean(v) => v.len(),
            Self::String(v) => v.len(),
        }
    }

    /// Returns true if the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The field type this column stores.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Float(_) => FieldType::Float,
            Self::Integer(_) => FieldType::Integer,
            Self::Boolean(_) => FieldType::Boolean,
            Self::String(_) => FieldType::String,
        }
    }
}

/// A single tag pair of a WAL row or decoded series key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Creates a new tag pair.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A typed field value of a WAL row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// 64-bit IEEE float.
    Float(f64),
    /// Signed 64-bit integer.
    Integer(i64),
    /// Boolean.
    Boolean(bool),
    /// UTF-8 string.
    String(String),
}

impl FieldValue {
    /// The field type of this value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Self::Float(_) => FieldType::Float,
            Self::Integer(_) => FieldType::Integer,
            Self::Boolean(_) => FieldType::Boolean,
            Self::String(_) => FieldType::String,
        }
    }
}

/// A single field of a WAL row.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field key.
    pub key: String,
    /// Field value.
    pub value: FieldValue,
}

impl Field {
    /// Creates a new field.
    pub fn new(key: impl Into<String>, value: FieldValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// A row decoded from a WAL frame.
///
/// The measurement name carries the storage-layer version suffix
/// (`<mst>_<nnnn>`); strip it with [`strip_version_suffix`] before emitting.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Measurement name, including the version suffix.
    pub name: String,
    /// Ordered tag pairs.
    pub tags: Vec<Tag>,
    /// Ordered fields, in encoder order.
    pub fields: Vec<Field>,
    /// Timestamp in nanoseconds since epoch.
    pub timestamp: i64,
}

/// Strips the storage-layer version suffix from a measurement name.
///
/// Measurement directories and indexed series keys carry a `_<nnnn>` suffix
/// (`average_temperature_0000`); everything after the last underscore is the
/// version. Names without an underscore are returned unchanged.
pub fn strip_version_suffix(name: &str) -> &str {
    match name.rfind('_') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}
