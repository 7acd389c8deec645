use std::fmt;

use anyhow::{Result, anyhow};
use chrono::DateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use uuid::Uuid;

/// The closed set of semantic column types understood by the engine.
///
/// Byte codes are stable and persisted in the schema metadata table;
/// 0 is reserved as the invalid marker and never round-trips.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Integer,
    Float,
    Timestamp,
    Uuid,
}

pub const ALL_DATA_TYPES: &[DataType] = &[
    DataType::Text,
    DataType::Integer,
    DataType::Float,
    DataType::Timestamp,
    DataType::Uuid,
];

impl DataType {
    pub fn code(&self) -> u8 {
        match self {
            DataType::Text => 1,
            DataType::Integer => 2,
            DataType::Float => 3,
            DataType::Timestamp => 4,
            DataType::Uuid => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(DataType::Text),
            2 => Some(DataType::Integer),
            3 => Some(DataType::Float),
            4 => Some(DataType::Timestamp),
            5 => Some(DataType::Uuid),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Text => "TEXT",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::Timestamp => "TIMESTAMP",
            DataType::Uuid => "UUID",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "TEXT" => Ok(DataType::Text),
            "INTEGER" => Ok(DataType::Integer),
            "FLOAT" => Ok(DataType::Float),
            "TIMESTAMP" => Ok(DataType::Timestamp),
            "UUID" => Ok(DataType::Uuid),
            other => Err(anyhow!("unknown data type '{other}'")),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Serialize for DataType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let token = String::deserialize(deserializer)?;
        DataType::from_name(&token).map_err(|err| de::Error::custom(err.to_string()))
    }
}

/// A raw cell value as the column-store driver sees it.
///
/// Timestamps travel as `Integer` Unix milliseconds; the array variants
/// exist only for the schema metadata table's parallel-array row.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Uuid(Uuid),
    TextArray(Vec<String>),
    IntegerArray(Vec<i64>),
}

impl Scalar {
    pub fn type_name(&self) -> &'static str {
        match self {
            Scalar::Null => "null",
            Scalar::Text(_) => "text",
            Scalar::Integer(_) => "integer",
            Scalar::Float(_) => "float",
            Scalar::Uuid(_) => "uuid",
            Scalar::TextArray(_) => "text array",
            Scalar::IntegerArray(_) => "integer array",
        }
    }
}

/// A runtime-typed scalar carried through result assembly.
///
/// Each variant pins the storage the corresponding [`DataType`] uses:
/// strings for Text and Uuid, `i64` for Integer and millisecond
/// Timestamps, `f64` for Float.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Timestamp(i64),
    Uuid(String),
}

impl TypedValue {
    /// The zero value of a data type, used to seed aggregation buckets.
    pub fn zero(data_type: DataType) -> Self {
        match data_type {
            DataType::Text => TypedValue::Text(String::new()),
            DataType::Integer => TypedValue::Integer(0),
            DataType::Float => TypedValue::Float(0.0),
            DataType::Timestamp => TypedValue::Timestamp(0),
            DataType::Uuid => TypedValue::Uuid(String::new()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            TypedValue::Text(_) => DataType::Text,
            TypedValue::Integer(_) => DataType::Integer,
            TypedValue::Float(_) => DataType::Float,
            TypedValue::Timestamp(_) => DataType::Timestamp,
            TypedValue::Uuid(_) => DataType::Uuid,
        }
    }

    /// Reads the value back out as a driver scalar.
    pub fn value(&self) -> Scalar {
        match self {
            TypedValue::Text(s) => Scalar::Text(s.clone()),
            TypedValue::Integer(i) => Scalar::Integer(*i),
            TypedValue::Float(f) => Scalar::Float(*f),
            TypedValue::Timestamp(ms) => Scalar::Integer(*ms),
            TypedValue::Uuid(s) => Scalar::Text(s.clone()),
        }
    }

    /// Overwrites the stored value. Returns false without mutating when the
    /// scalar's runtime type does not match this value's storage type.
    pub fn set(&mut self, value: &Scalar) -> bool {
        match (self, value) {
            (TypedValue::Text(slot), Scalar::Text(s)) => {
                *slot = s.clone();
                true
            }
            (TypedValue::Integer(slot), Scalar::Integer(i)) => {
                *slot = *i;
                true
            }
            (TypedValue::Float(slot), Scalar::Float(f)) => {
                *slot = *f;
                true
            }
            (TypedValue::Timestamp(slot), Scalar::Integer(ms)) => {
                *slot = *ms;
                true
            }
            (TypedValue::Uuid(slot), Scalar::Text(s)) => {
                *slot = s.clone();
                true
            }
            (TypedValue::Uuid(slot), Scalar::Uuid(u)) => {
                *slot = u.to_string();
                true
            }
            _ => false,
        }
    }

    /// Compares against a driver scalar; false on runtime-type mismatch.
    pub fn equals(&self, value: &Scalar) -> bool {
        match (self, value) {
            (TypedValue::Text(a), Scalar::Text(b)) => a == b,
            (TypedValue::Integer(a), Scalar::Integer(b)) => a == b,
            (TypedValue::Float(a), Scalar::Float(b)) => a == b,
            (TypedValue::Timestamp(a), Scalar::Integer(b)) => a == b,
            (TypedValue::Uuid(a), Scalar::Text(b)) => a == b,
            (TypedValue::Uuid(a), Scalar::Uuid(b)) => *a == b.to_string(),
            _ => false,
        }
    }

    /// Strict-ordering comparison between two values of the same data type.
    ///
    /// NaN floats are neither less than nor greater than anything, so both
    /// directions return false for them.
    pub fn less_than(&self, other: &TypedValue) -> Result<bool> {
        match (self, other) {
            (TypedValue::Text(a), TypedValue::Text(b)) => Ok(a < b),
            (TypedValue::Integer(a), TypedValue::Integer(b)) => Ok(a < b),
            (TypedValue::Float(a), TypedValue::Float(b)) => Ok(a < b),
            (TypedValue::Timestamp(a), TypedValue::Timestamp(b)) => Ok(a < b),
            (TypedValue::Uuid(a), TypedValue::Uuid(b)) => Ok(a < b),
            _ => Err(anyhow!(
                "cannot compare {} value with {} value",
                self.data_type(),
                other.data_type()
            )),
        }
    }

    /// Rebuilds a value of `data_type` from its bare JSON form.
    pub fn from_json(data_type: DataType, value: &serde_json::Value) -> Result<Self> {
        let mismatch =
            || anyhow!("JSON value {value} does not match storage type of {data_type}");
        match data_type {
            DataType::Text => value
                .as_str()
                .map(|s| TypedValue::Text(s.to_string()))
                .ok_or_else(mismatch),
            DataType::Integer => value
                .as_i64()
                .map(TypedValue::Integer)
                .ok_or_else(mismatch),
            DataType::Float => value.as_f64().map(TypedValue::Float).ok_or_else(mismatch),
            DataType::Timestamp => value
                .as_i64()
                .map(TypedValue::Timestamp)
                .ok_or_else(mismatch),
            DataType::Uuid => value
                .as_str()
                .map(|s| TypedValue::Uuid(s.to_string()))
                .ok_or_else(mismatch),
        }
    }
}

impl Serialize for TypedValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TypedValue::Text(s) => serializer.serialize_str(s),
            TypedValue::Integer(i) => serializer.serialize_i64(*i),
            TypedValue::Float(f) => serializer.serialize_f64(*f),
            TypedValue::Timestamp(ms) => serializer.serialize_i64(*ms),
            TypedValue::Uuid(s) => serializer.serialize_str(s),
        }
    }
}

/// A fixed-length list of values sharing one data type.
///
/// Insertions shift existing values right. An index past the end is
/// accepted as a silent no-op: the result builder leans on this when the
/// column store emits more distinct column values than the configured
/// limit.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValueList {
    data_type: DataType,
    values: Vec<TypedValue>,
}

impl TypedValueList {
    pub fn zeroed(data_type: DataType, len: usize) -> Self {
        Self {
            data_type,
            values: vec![TypedValue::zero(data_type); len],
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TypedValue> {
        self.values.get(index)
    }

    pub fn insert(&mut self, index: usize, value: &Scalar) -> bool {
        if index > self.values.len() {
            return true;
        }
        let mut slot = TypedValue::zero(self.data_type);
        if !slot.set(value) {
            return false;
        }
        self.values.insert(index, slot);
        true
    }

    pub fn truncate(&mut self, max_len: usize) {
        self.values.truncate(max_len);
    }

    pub fn add_zeroes_up_to(&mut self, len: usize) {
        while self.values.len() < len {
            self.values.push(TypedValue::zero(self.data_type));
        }
    }
}

impl Serialize for TypedValueList {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.values.serialize(serializer)
    }
}

/// Parses an RFC 3339 timestamp into Unix milliseconds.
pub fn parse_timestamp_millis(value: &str) -> Result<i64> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|err| anyhow!("failed to parse '{value}' as RFC 3339 timestamp: {err}"))?;
    Ok(parsed.timestamp_millis())
}

/// Parses a UUID, tolerating surrounding braces, into its canonical form.
pub fn parse_canonical_uuid(value: &str) -> Result<Uuid> {
    let trimmed = value.trim().trim_matches(|c| matches!(c, '{' | '}'));
    Uuid::parse_str(trimmed).map_err(|err| anyhow!("failed to parse '{value}' as UUID: {err}"))
}
