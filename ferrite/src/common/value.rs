use crate::errors::{ErrorKind, FerriteError, FerriteResult};
use crate::schema::ColumnKind;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt::{Display, Formatter};

/// Represents a single row cell value.
///
/// # Purpose
/// Provides a unified representation for every value a Ferrite column can hold.
/// One variant exists per [ColumnKind], plus `Null` for SQL NULL.
///
/// # Characteristics
/// - **Type-safe**: each variant explicitly represents its column kind
/// - **Convertible**: `coerce` adapts a value to a target column kind where a
///   lossless or checked conversion exists
/// - **Raw round-trip**: `to_raw_text`/`from_raw_text` convert through the plain
///   textual form used by migration holders
/// - **Default**: defaults to `Null`
///
/// # Usage
/// Create values using the `From` trait:
/// ```text
/// let v1: Value = 42.into();            // From i32
/// let v2 = Value::from("hello");        // From &str
/// let v3 = Value::from(true);           // From bool
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    /// Represents a null value.
    #[default]
    Null,
    /// Represents a signed 32-bit integer value.
    I32(i32),
    /// Represents a signed 64-bit integer value.
    I64(i64),
    /// Represents a 32-bit floating point value.
    F32(f32),
    /// Represents a 64-bit floating point value.
    F64(f64),
    /// Represents a text value.
    Text(String),
    /// Represents a boolean value.
    Bool(bool),
    /// Represents a timestamp as epoch milliseconds.
    Timestamp(i64),
    /// Represents a byte array value.
    Blob(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as `i64` if it is any integer variant.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<i64> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the value as a UTC datetime if it is a timestamp.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(ms) => Utc.timestamp_millis_opt(*ms).single(),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the column kind naturally corresponding to this value, or `None`
    /// for `Null`.
    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Value::Null => None,
            Value::I32(_) => Some(ColumnKind::Int32),
            Value::I64(_) => Some(ColumnKind::Int64),
            Value::F32(_) => Some(ColumnKind::Float32),
            Value::F64(_) => Some(ColumnKind::Float64),
            Value::Text(_) => Some(ColumnKind::Text),
            Value::Bool(_) => Some(ColumnKind::Bool),
            Value::Timestamp(_) => Some(ColumnKind::Timestamp),
            Value::Blob(_) => Some(ColumnKind::Blob),
        }
    }

    /// Adapts this value to the given column kind.
    ///
    /// Integer widths convert with an overflow check, text parses into numeric
    /// and boolean kinds, and `Null` passes through unchanged. Any conversion
    /// without a sensible meaning fails with [ErrorKind::InvalidDataType].
    pub fn coerce(self, kind: ColumnKind) -> FerriteResult<Value> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        match kind {
            ColumnKind::Int32 => match self {
                Value::I32(v) => Ok(Value::I32(v)),
                Value::I64(v) => i32::try_from(v).map(Value::I32).map_err(|_| {
                    FerriteError::new(
                        &format!("Value {} overflows a 32-bit integer column", v),
                        ErrorKind::InvalidDataType,
                    )
                }),
                Value::Text(s) => Ok(Value::I32(s.trim().parse()?)),
                other => Err(conversion_error(&other, kind)),
            },
            ColumnKind::Int64 => match self {
                Value::I32(v) => Ok(Value::I64(v as i64)),
                Value::I64(v) => Ok(Value::I64(v)),
                Value::Text(s) => Ok(Value::I64(s.trim().parse()?)),
                other => Err(conversion_error(&other, kind)),
            },
            ColumnKind::Float32 => match self {
                Value::F32(v) => Ok(Value::F32(v)),
                Value::Text(s) => Ok(Value::F32(s.trim().parse()?)),
                other => Err(conversion_error(&other, kind)),
            },
            ColumnKind::Float64 => match self {
                Value::F32(v) => Ok(Value::F64(v as f64)),
                Value::F64(v) => Ok(Value::F64(v)),
                Value::Text(s) => Ok(Value::F64(s.trim().parse()?)),
                other => Err(conversion_error(&other, kind)),
            },
            ColumnKind::Text => match self {
                Value::Text(s) => Ok(Value::Text(s)),
                other => Err(conversion_error(&other, kind)),
            },
            ColumnKind::Bool => match self {
                Value::Bool(v) => Ok(Value::Bool(v)),
                Value::I32(v) => Ok(Value::Bool(v != 0)),
                Value::I64(v) => Ok(Value::Bool(v != 0)),
                Value::Text(s) => parse_bool(&s).map(Value::Bool),
                other => Err(conversion_error(&other, kind)),
            },
            ColumnKind::Timestamp => match self {
                Value::Timestamp(ms) => Ok(Value::Timestamp(ms)),
                Value::I64(ms) => Ok(Value::Timestamp(ms)),
                Value::Text(s) => Ok(Value::Timestamp(s.trim().parse()?)),
                other => Err(conversion_error(&other, kind)),
            },
            ColumnKind::Blob => match self {
                Value::Blob(v) => Ok(Value::Blob(v)),
                Value::Text(s) => Ok(Value::Blob(hex::decode(s.trim())?)),
                other => Err(conversion_error(&other, kind)),
            },
        }
    }

    /// Renders this value in the plain textual form used by migration holders.
    ///
    /// Returns `None` for `Null`. Blobs render as lowercase hex.
    pub fn to_raw_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::I32(v) => Some(v.to_string()),
            Value::I64(v) => Some(v.to_string()),
            Value::F32(v) => Some(v.to_string()),
            Value::F64(v) => Some(v.to_string()),
            Value::Text(v) => Some(v.clone()),
            Value::Bool(v) => Some(v.to_string()),
            Value::Timestamp(v) => Some(v.to_string()),
            Value::Blob(v) => Some(hex::encode(v)),
        }
    }

    /// Parses a raw textual form back into a value of the given kind.
    pub fn from_raw_text(kind: ColumnKind, raw: &str) -> FerriteResult<Value> {
        match kind {
            ColumnKind::Int32 => Ok(Value::I32(raw.trim().parse()?)),
            ColumnKind::Int64 => Ok(Value::I64(raw.trim().parse()?)),
            ColumnKind::Float32 => Ok(Value::F32(raw.trim().parse()?)),
            ColumnKind::Float64 => Ok(Value::F64(raw.trim().parse()?)),
            ColumnKind::Text => Ok(Value::Text(raw.to_string())),
            ColumnKind::Bool => parse_bool(raw).map(Value::Bool),
            ColumnKind::Timestamp => Ok(Value::Timestamp(raw.trim().parse()?)),
            ColumnKind::Blob => Ok(Value::Blob(hex::decode(raw.trim())?)),
        }
    }
}

fn parse_bool(raw: &str) -> FerriteResult<bool> {
    match raw.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(FerriteError::new(
            &format!("Cannot parse '{}' as a boolean", other),
            ErrorKind::InvalidDataType,
        )),
    }
}

fn conversion_error(value: &Value, kind: ColumnKind) -> FerriteError {
    FerriteError::new(
        &format!("Cannot convert {:?} to column kind {:?}", value, kind),
        ErrorKind::InvalidDataType,
    )
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.to_raw_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "NULL"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v.timestamp_millis())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}
