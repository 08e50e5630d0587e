//! # Sentra
//!
//! An OPC-UA alarms & conditions engine for industrial monitoring.
//!
//! Sentra models the Alarms and Conditions information model (IEC 62541-9)
//! as plain Rust state machines: conditions, acknowledgeable conditions,
//! alarm conditions with shelving, and the limit/deviation/off-normal alarm
//! family. Process values live in a small [`AddressSpace`]; writing one
//! re-evaluates every alarm monitoring it and raised events fan out through
//! the engine's [`EventBus`].
//!
//! ## Quick example
//!
//! ```rust
//! use sentra::{AlarmEngine, InstantiateOptions, LimitSet, Variant};
//!
//! let mut engine = AlarmEngine::new();
//! let level = engine.address_space_mut().add_variable("level", Variant::Double(10.0))?;
//! let alarm = engine.instantiate_exclusive_limit_alarm(InstantiateOptions {
//!     browse_name: "TankLevel".to_string(),
//!     condition_source: sentra::NodeId::from_name("Tank1"),
//!     input_node: Some(level.clone()),
//!     limits: LimitSet { high: Some(80.0), ..Default::default() },
//!     ..Default::default()
//! })?;
//! engine.enable(&alarm);
//! engine.write_value(&level, Variant::Double(85.0))?;
//! assert!(engine.condition(&alarm).unwrap().base().current().active());
//! # Ok::<(), sentra::SentraError>(())
//! ```

pub mod acknowledgeable;
pub mod address_space;
pub mod alarm;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod limit_alarm;
pub mod off_normal;
pub mod shelving;
pub mod snapshot;
pub mod state_machine;
pub mod status;
pub mod two_state;
pub mod types;
pub mod value;

pub use acknowledgeable::AcknowledgeableCondition;
pub use address_space::{AddressSpace, VariableNode};
pub use alarm::{AlarmCondition, AlarmOptions};
pub use condition::{ConditionBase, ConditionInfo};
pub use config::{AlarmDefinition, AlarmKind, Config, SignalConfig};
pub use engine::{
    AlarmEngine, ConditionNode, ConditionSummary, EngineStats, InstantiateOptions,
    ValueSubscription,
};
pub use error::{Result, SentraError};
pub use events::{
    event_type_ids, ConditionEvent, EventBus, EventPayload, EventSink, RecordingSink,
    SubscriptionHandle,
};
pub use limit_alarm::{
    ExclusiveLimitAlarm, LimitFlags, LimitSet, LimitStateName, NonExclusiveLimitAlarm,
};
pub use off_normal::OffNormalAlarm;
pub use shelving::{ShelvingState, ShelvingStateMachine};
pub use snapshot::{ConditionIdentity, ConditionSnapshot};
pub use state_machine::{FiniteStateMachine, State, Transition};
pub use status::StatusCode;
pub use two_state::TwoStateVariable;
pub use types::{DataValue, EventId, LocalizedText, NodeId, QualifiedName};
pub use value::{DataType, Variant};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
