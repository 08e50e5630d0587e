// src/value.rs - OPC-UA variant value system
use crate::types::{LocalizedText, NodeId};
use crate::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Core variant type for everything flowing through the address space.
///
/// This is the subset of the OPC-UA built-in types the Alarms & Conditions
/// engine reads, writes, and places into event payloads.
///
/// # Examples
///
/// ```rust
/// use sentra::Variant;
///
/// let v = Variant::Double(3.5);
/// assert_eq!(v.as_f64(), Some(3.5));
/// assert!(v.data_type().is_numeric_scalar());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Variant {
    /// Absent / not-yet-set value; the sentinel for uninstantiated fields
    Null,
    /// Boolean value
    Boolean(bool),
    /// Signed 8-bit integer
    SByte(i8),
    /// Unsigned 8-bit integer
    Byte(u8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Signed 64-bit integer (not accepted as an alarm input)
    Int64(i64),
    /// Unsigned 64-bit integer (not accepted as an alarm input)
    UInt64(u64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// UTF-8 string
    String(String),
    /// Timestamp value
    DateTime(DateTime<Utc>),
    /// Opaque byte sequence (event ids)
    ByteString(Vec<u8>),
    /// Node identifier
    NodeId(NodeId),
    /// Human-readable localized text
    LocalizedText(LocalizedText),
    /// A status code carried as a value
    StatusCode(StatusCode),
}

/// Data type discriminant for [`Variant`], used for input validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Null,
    Boolean,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
    String,
    DateTime,
    ByteString,
    NodeId,
    LocalizedText,
    StatusCode,
}

impl DataType {
    /// True for the numeric scalar types limit/deviation alarms may monitor.
    ///
    /// 64-bit integers are excluded: their full range does not survive the
    /// f64 comparison domain, so construction rejects them up front.
    pub fn is_numeric_scalar(self) -> bool {
        matches!(
            self,
            DataType::SByte
                | DataType::Byte
                | DataType::Int16
                | DataType::UInt16
                | DataType::Int32
                | DataType::UInt32
                | DataType::Float
                | DataType::Double
        )
    }
}

impl Variant {
    /// Data type discriminant of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Variant::Null => DataType::Null,
            Variant::Boolean(_) => DataType::Boolean,
            Variant::SByte(_) => DataType::SByte,
            Variant::Byte(_) => DataType::Byte,
            Variant::Int16(_) => DataType::Int16,
            Variant::UInt16(_) => DataType::UInt16,
            Variant::Int32(_) => DataType::Int32,
            Variant::UInt32(_) => DataType::UInt32,
            Variant::Int64(_) => DataType::Int64,
            Variant::UInt64(_) => DataType::UInt64,
            Variant::Float(_) => DataType::Float,
            Variant::Double(_) => DataType::Double,
            Variant::String(_) => DataType::String,
            Variant::DateTime(_) => DataType::DateTime,
            Variant::ByteString(_) => DataType::ByteString,
            Variant::NodeId(_) => DataType::NodeId,
            Variant::LocalizedText(_) => DataType::LocalizedText,
            Variant::StatusCode(_) => DataType::StatusCode,
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variant::SByte(v) => Some(*v as f64),
            Variant::Byte(v) => Some(*v as f64),
            Variant::Int16(v) => Some(*v as f64),
            Variant::UInt16(v) => Some(*v as f64),
            Variant::Int32(v) => Some(*v as f64),
            Variant::UInt32(v) => Some(*v as f64),
            Variant::Int64(v) => Some(*v as f64),
            Variant::UInt64(v) => Some(*v as f64),
            Variant::Float(v) => Some(*v as f64),
            Variant::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Boolean view of the value, if it has one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// String view of the value, if it has one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(s) => Some(s),
            Variant::LocalizedText(t) => Some(&t.text),
            _ => None,
        }
    }

    /// True when the value is the Null sentinel.
    pub fn is_null(&self) -> bool {
        matches!(self, Variant::Null)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Null => write!(f, "null"),
            Variant::Boolean(v) => write!(f, "{}", v),
            Variant::SByte(v) => write!(f, "{}", v),
            Variant::Byte(v) => write!(f, "{}", v),
            Variant::Int16(v) => write!(f, "{}", v),
            Variant::UInt16(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::Int64(v) => write!(f, "{}", v),
            Variant::UInt64(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(v) => write!(f, "{}", v),
            Variant::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Variant::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Variant::NodeId(v) => write!(f, "{}", v),
            Variant::LocalizedText(v) => write!(f, "{}", v.text),
            Variant::StatusCode(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Boolean(v)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Double(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int32(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<LocalizedText> for Variant {
    fn from(v: LocalizedText) -> Self {
        Variant::LocalizedText(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_scalar_gate() {
        assert!(Variant::Double(1.0).data_type().is_numeric_scalar());
        assert!(Variant::Byte(3).data_type().is_numeric_scalar());
        assert!(!Variant::Int64(1).data_type().is_numeric_scalar());
        assert!(!Variant::UInt64(1).data_type().is_numeric_scalar());
        assert!(!Variant::String("x".into()).data_type().is_numeric_scalar());
        assert!(!Variant::Boolean(true).data_type().is_numeric_scalar());
    }

    #[test]
    fn test_numeric_conversion() {
        assert_eq!(Variant::Int16(-4).as_f64(), Some(-4.0));
        assert_eq!(Variant::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Variant::String("1.5".into()).as_f64(), None);
    }
}
