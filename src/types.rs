// src/types.rs - Core OPC-UA identifier and wrapper types
use crate::value::Variant;
use crate::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Node identifier. The engine only needs three flavors: numeric ids for
/// well-known type nodes, string ids for instance nodes, and GUID ids for
/// condition branches. The null id doubles as the current-branch marker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// The null node id (also identifies a condition's current branch)
    Null,
    /// Numeric identifier (well-known type nodes)
    Numeric(u32),
    /// String identifier (instance nodes)
    String(String),
    /// GUID identifier (condition branches)
    Guid(Uuid),
}

impl NodeId {
    /// The null node id.
    pub fn null() -> Self {
        NodeId::Null
    }

    /// A fresh, globally unique GUID node id.
    pub fn new_guid() -> Self {
        NodeId::Guid(Uuid::new_v4())
    }

    /// String-identified instance node.
    pub fn from_name(name: impl Into<String>) -> Self {
        NodeId::String(name.into())
    }

    /// True iff this is the null id.
    pub fn is_null(&self) -> bool {
        matches!(self, NodeId::Null)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::Null
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Null => write!(f, "ns=0;i=0"),
            NodeId::Numeric(n) => write!(f, "ns=0;i={}", n),
            NodeId::String(s) => write!(f, "ns=1;s={}", s),
            NodeId::Guid(g) => write!(f, "ns=1;g={}", g),
        }
    }
}

/// Qualified browse name. Lookups are exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub namespace_index: u16,
    pub name: String,
}

impl QualifiedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self { namespace_index: 1, name: name.into() }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace_index, self.name)
    }
}

/// Localized human-readable text. Locale handling is out of scope; the
/// engine only carries the text and an optional locale tag through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct LocalizedText {
    #[serde(default)]
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { locale: String::new(), text: text.into() }
    }

    pub fn english(text: impl Into<String>) -> Self {
        Self { locale: "en".to_string(), text: text.into() }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl From<&str> for LocalizedText {
    fn from(text: &str) -> Self {
        LocalizedText::new(text)
    }
}

/// A value together with its status code and source timestamp.
///
/// This triple is the wire shape event filters consume: a read of a variable
/// on a disabled condition yields a Good-less status with no meaningful
/// value, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    pub value: Variant,
    pub status: StatusCode,
    pub source_timestamp: DateTime<Utc>,
}

impl DataValue {
    /// A Good-status value stamped now.
    pub fn new(value: Variant) -> Self {
        Self { value, status: StatusCode::Good, source_timestamp: Utc::now() }
    }

    /// A value carrying only a (typically Bad) status code.
    pub fn with_status(status: StatusCode) -> Self {
        Self { value: Variant::Null, status, source_timestamp: Utc::now() }
    }
}

/// Opaque event identifier, regenerated for every raised event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Vec<u8>);

impl EventId {
    /// A fresh, unique event id.
    pub fn generate() -> Self {
        EventId(Uuid::new_v4().as_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_null_marker() {
        assert!(NodeId::null().is_null());
        assert!(!NodeId::new_guid().is_null());
        assert_ne!(NodeId::new_guid(), NodeId::new_guid());
    }

    #[test]
    fn test_event_id_uniqueness() {
        assert_ne!(EventId::generate(), EventId::generate());
    }
}
