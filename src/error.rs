use crate::value::DataType;
use thiserror::Error;

/// Application level error type used throughout the crate.
///
/// Only construction-time misuse surfaces as an error: invalid input-node
/// data types, unknown nodes, bad configuration. Recoverable alarm-protocol
/// outcomes (already-disabled, already-shelved, ...) are returned as
/// [`StatusCode`](crate::StatusCode) values from the corresponding method
/// calls instead.
#[derive(Error, Debug)]
pub enum SentraError {
    /// I/O related failure
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error while parsing YAML configuration files
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Requested node was not found in the address space
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// A node with the same browse name already exists
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// The monitored input node has a data type alarms cannot evaluate
    #[error("Input node '{node}' has non-numeric-scalar data type {data_type:?}")]
    InvalidInputDataType { node: String, data_type: DataType },

    /// Attempt to instantiate an abstract condition type directly
    #[error("Condition type '{0}' is abstract and cannot be instantiated")]
    AbstractConditionType(String),

    /// Returned value type does not match the expected type
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: &'static str, actual: &'static str },
}

/// Convenient alias over [`Result`] using [`SentraError`]
pub type Result<T> = std::result::Result<T, SentraError>;
