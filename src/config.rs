// src/config.rs - YAML provisioning of signals and alarm conditions
use crate::engine::{AlarmEngine, InstantiateOptions};
use crate::error::{Result, SentraError};
use crate::limit_alarm::LimitSet;
use crate::types::NodeId;
use crate::value::Variant;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration: the monitored signals and the alarm conditions
/// provisioned over them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub signals: Vec<SignalConfig>,
    #[serde(default)]
    pub alarms: Vec<AlarmDefinition>,
}

impl Config {
    /// Load and parse a YAML configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for alarm in &self.alarms {
            if alarm.name.is_empty() {
                return Err(SentraError::Config("alarm with empty name".into()));
            }
        }
        debug!(
            "Validated config: {} signals, {} alarms",
            self.signals.len(),
            self.alarms.len()
        );
        Ok(())
    }
}

/// One monitored variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalConfig {
    pub name: String,
    /// "bool", "int", "float", or "string"
    #[serde(rename = "type")]
    pub signal_type: String,
    /// Initial value; defaults to the type's zero value
    #[serde(default)]
    pub initial: Option<serde_yaml::Value>,
}

impl SignalConfig {
    /// Resolve the declared type and initial value to a concrete variant.
    pub fn initial_variant(&self) -> Result<Variant> {
        let initial = self.initial.as_ref();
        let mismatch = || {
            SentraError::Config(format!(
                "signal '{}': initial value does not match type '{}'",
                self.name, self.signal_type
            ))
        };
        match self.signal_type.as_str() {
            "bool" => match initial {
                None => Ok(Variant::Boolean(false)),
                Some(serde_yaml::Value::Bool(b)) => Ok(Variant::Boolean(*b)),
                Some(_) => Err(mismatch()),
            },
            "int" => match initial {
                None => Ok(Variant::Int32(0)),
                Some(serde_yaml::Value::Number(n)) => {
                    n.as_i64().map(|v| Variant::Int32(v as i32)).ok_or_else(mismatch)
                }
                Some(_) => Err(mismatch()),
            },
            "float" => match initial {
                None => Ok(Variant::Double(0.0)),
                Some(serde_yaml::Value::Number(n)) => {
                    n.as_f64().map(Variant::Double).ok_or_else(mismatch)
                }
                Some(_) => Err(mismatch()),
            },
            "string" => match initial {
                None => Ok(Variant::String(String::new())),
                Some(serde_yaml::Value::String(s)) => Ok(Variant::String(s.clone())),
                Some(_) => Err(mismatch()),
            },
            other => Err(SentraError::Config(format!(
                "signal '{}': unknown type '{}'",
                self.name, other
            ))),
        }
    }
}

/// The alarm kinds the configuration can provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmKind {
    Acknowledgeable,
    Alarm,
    ExclusiveLimit,
    NonExclusiveLimit,
    ExclusiveDeviation,
    NonExclusiveDeviation,
    OffNormal,
}

/// One alarm condition declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmDefinition {
    pub name: String,
    pub kind: AlarmKind,
    /// Browse name of the source the condition reports about
    pub source: String,
    /// Monitored signal name (alarm kinds)
    #[serde(default)]
    pub input: Option<String>,
    /// Setpoint signal name (deviation kinds)
    #[serde(default)]
    pub setpoint: Option<String>,
    /// Normal-state signal name (off-normal kind)
    #[serde(default)]
    pub normal_state: Option<String>,
    #[serde(default)]
    pub limits: LimitSet,
    #[serde(default)]
    pub severity: Option<u16>,
    /// Instantiate ConfirmedState/Confirm
    #[serde(default)]
    pub confirm: bool,
    /// Upper bound for TimedShelve durations, milliseconds
    #[serde(default)]
    pub max_time_shelved: Option<f64>,
}

impl AlarmDefinition {
    /// Instantiate this definition on the engine, resolving signal names to
    /// node ids first.
    pub fn instantiate(&self, engine: &mut AlarmEngine) -> Result<NodeId> {
        let resolve = |name: &Option<String>| -> Result<Option<NodeId>> {
            match name {
                None => Ok(None),
                Some(n) => engine
                    .address_space()
                    .find_variable(n)
                    .map(Some)
                    .ok_or_else(|| SentraError::NodeNotFound(n.clone())),
            }
        };
        let options = InstantiateOptions {
            browse_name: self.name.clone(),
            condition_source: NodeId::from_name(&self.source),
            source_name: Some(self.source.clone()),
            input_node: resolve(&self.input)?,
            setpoint_node: resolve(&self.setpoint)?,
            normal_state_node: resolve(&self.normal_state)?,
            optionals: if self.confirm {
                vec!["ConfirmedState".to_string(), "Confirm".to_string()]
            } else {
                Vec::new()
            },
            max_time_shelved: self.max_time_shelved,
            limits: self.limits,
            severity: self.severity,
            ..Default::default()
        };
        match self.kind {
            AlarmKind::Acknowledgeable => {
                engine.instantiate_condition("AcknowledgeableConditionType", options)
            }
            AlarmKind::Alarm => engine.instantiate_alarm_condition(options),
            AlarmKind::ExclusiveLimit => engine.instantiate_exclusive_limit_alarm(options),
            AlarmKind::NonExclusiveLimit => engine.instantiate_non_exclusive_limit_alarm(options),
            AlarmKind::ExclusiveDeviation => engine.instantiate_exclusive_deviation_alarm(options),
            AlarmKind::NonExclusiveDeviation => {
                engine.instantiate_non_exclusive_deviation_alarm(options)
            }
            AlarmKind::OffNormal => engine.instantiate_off_normal_alarm(options),
        }
    }
}
