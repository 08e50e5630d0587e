// src/address_space.rs - Minimal typed variable store consumed by the alarm engine
use crate::error::{Result, SentraError};
use crate::types::{DataValue, NodeId, QualifiedName};
use crate::value::{DataType, Variant};
use log::trace;
use std::collections::HashMap;

/// A variable node: a named, typed slot holding the latest source value.
#[derive(Debug, Clone)]
pub struct VariableNode {
    pub node_id: NodeId,
    pub browse_name: QualifiedName,
    pub data_type: DataType,
    value: DataValue,
}

impl VariableNode {
    /// Latest value together with status and source timestamp.
    pub fn read_value(&self) -> &DataValue {
        &self.value
    }
}

/// Single-owner variable store for everything the alarm engine monitors or
/// exposes. All mutation funnels through the hosting engine; there is no
/// internal locking (the concurrency model is single-threaded cooperative).
///
/// # Examples
///
/// ```rust
/// use sentra::{AddressSpace, Variant};
///
/// let mut space = AddressSpace::new();
/// let id = space.add_variable("temperature", Variant::Double(21.5))?;
/// space.set_value_from_source(&id, Variant::Double(22.0))?;
/// assert_eq!(space.get_value(&id).and_then(|v| v.as_f64()), Some(22.0));
/// # Ok::<(), sentra::SentraError>(())
/// ```
#[derive(Debug, Default)]
pub struct AddressSpace {
    variables: HashMap<NodeId, VariableNode>,
    by_name: HashMap<String, NodeId>,
}

impl AddressSpace {
    /// Create an empty address space.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable node with an initial source value.
    ///
    /// The variable's data type is fixed by the initial value; later writes
    /// of a different data type are rejected.
    pub fn add_variable(&mut self, name: impl AsRef<str>, initial: Variant) -> Result<NodeId> {
        let name = name.as_ref();
        if self.by_name.contains_key(name) {
            return Err(SentraError::DuplicateNode(name.to_string()));
        }
        let node_id = NodeId::from_name(name);
        let node = VariableNode {
            node_id: node_id.clone(),
            browse_name: QualifiedName::new(name),
            data_type: initial.data_type(),
            value: DataValue::new(initial),
        };
        trace!("Adding variable '{}' as {:?}", name, node.data_type);
        self.by_name.insert(name.to_string(), node_id.clone());
        self.variables.insert(node_id.clone(), node);
        Ok(node_id)
    }

    /// Look up a variable node id by browse name (exact, case-sensitive).
    pub fn find_variable(&self, name: impl AsRef<str>) -> Option<NodeId> {
        self.by_name.get(name.as_ref()).cloned()
    }

    /// Write a new source value to a variable.
    ///
    /// Writing `Null` clears the value without changing the declared type.
    pub fn set_value_from_source(&mut self, node_id: &NodeId, value: Variant) -> Result<()> {
        let node = self
            .variables
            .get_mut(node_id)
            .ok_or_else(|| SentraError::NodeNotFound(node_id.to_string()))?;
        if !value.is_null() && value.data_type() != node.data_type {
            return Err(SentraError::TypeMismatch {
                expected: data_type_name(node.data_type),
                actual: data_type_name(value.data_type()),
            });
        }
        trace!("Setting {} = {}", node.browse_name, value);
        node.value = DataValue::new(value);
        Ok(())
    }

    /// Full read (value + status + timestamp).
    pub fn read_value(&self, node_id: &NodeId) -> Option<&DataValue> {
        self.variables.get(node_id).map(|n| n.read_value())
    }

    /// Bare value read.
    pub fn get_value(&self, node_id: &NodeId) -> Option<&Variant> {
        self.variables.get(node_id).map(|n| &n.value.value)
    }

    /// Declared data type of a variable.
    pub fn data_type_of(&self, node_id: &NodeId) -> Option<DataType> {
        self.variables.get(node_id).map(|n| n.data_type)
    }

    /// Number of variables in the space.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// True when the space holds no variables.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

fn data_type_name(dt: DataType) -> &'static str {
    match dt {
        DataType::Null => "Null",
        DataType::Boolean => "Boolean",
        DataType::SByte => "SByte",
        DataType::Byte => "Byte",
        DataType::Int16 => "Int16",
        DataType::UInt16 => "UInt16",
        DataType::Int32 => "Int32",
        DataType::UInt32 => "UInt32",
        DataType::Int64 => "Int64",
        DataType::UInt64 => "UInt64",
        DataType::Float => "Float",
        DataType::Double => "Double",
        DataType::String => "String",
        DataType::DateTime => "DateTime",
        DataType::ByteString => "ByteString",
        DataType::NodeId => "NodeId",
        DataType::LocalizedText => "LocalizedText",
        DataType::StatusCode => "StatusCode",
    }
}
