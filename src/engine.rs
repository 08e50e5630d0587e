// src/engine.rs - Alarm engine: registry, factories, input fan-out, refresh, run loop
use crate::acknowledgeable::AcknowledgeableCondition;
use crate::address_space::AddressSpace;
use crate::alarm::{AlarmCondition, AlarmOptions};
use crate::condition::ConditionBase;
use crate::config::Config;
use crate::error::{Result, SentraError};
use crate::events::{
    event_type_ids, ConditionEvent, EventBus, EventPayload, EventSink, SubscriptionHandle,
};
use crate::limit_alarm::{ExclusiveLimitAlarm, LimitSet, LimitStateName, NonExclusiveLimitAlarm};
use crate::off_normal::OffNormalAlarm;
use crate::snapshot::ConditionIdentity;
use crate::types::{DataValue, EventId, LocalizedText, NodeId};
use crate::value::Variant;
use crate::StatusCode;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;

/// One provisioned condition, tagged by kind. Every kind exposes the shared
/// acknowledgeable and alarm layers through the accessors below; the
/// kind-specific evaluation lives behind [`AlarmEngine::reevaluate`].
#[derive(Debug)]
pub enum ConditionNode {
    Acknowledgeable(AcknowledgeableCondition),
    Alarm(AlarmCondition),
    ExclusiveLimit(ExclusiveLimitAlarm),
    NonExclusiveLimit(NonExclusiveLimitAlarm),
    OffNormal(OffNormalAlarm),
}

impl ConditionNode {
    pub fn base(&self) -> &ConditionBase {
        match self {
            ConditionNode::Acknowledgeable(c) => c.base(),
            ConditionNode::Alarm(a) => a.base(),
            ConditionNode::ExclusiveLimit(a) => a.alarm().base(),
            ConditionNode::NonExclusiveLimit(a) => a.alarm().base(),
            ConditionNode::OffNormal(a) => a.alarm().base(),
        }
    }

    pub fn base_mut(&mut self) -> &mut ConditionBase {
        match self {
            ConditionNode::Acknowledgeable(c) => c.base_mut(),
            ConditionNode::Alarm(a) => a.base_mut(),
            ConditionNode::ExclusiveLimit(a) => a.alarm_mut().base_mut(),
            ConditionNode::NonExclusiveLimit(a) => a.alarm_mut().base_mut(),
            ConditionNode::OffNormal(a) => a.alarm_mut().base_mut(),
        }
    }

    pub fn acknowledgeable_mut(&mut self) -> &mut AcknowledgeableCondition {
        match self {
            ConditionNode::Acknowledgeable(c) => c,
            ConditionNode::Alarm(a) => a.acknowledgeable_mut(),
            ConditionNode::ExclusiveLimit(a) => a.alarm_mut().acknowledgeable_mut(),
            ConditionNode::NonExclusiveLimit(a) => a.alarm_mut().acknowledgeable_mut(),
            ConditionNode::OffNormal(a) => a.alarm_mut().acknowledgeable_mut(),
        }
    }

    pub fn as_alarm(&self) -> Option<&AlarmCondition> {
        match self {
            ConditionNode::Acknowledgeable(_) => None,
            ConditionNode::Alarm(a) => Some(a),
            ConditionNode::ExclusiveLimit(a) => Some(a.alarm()),
            ConditionNode::NonExclusiveLimit(a) => Some(a.alarm()),
            ConditionNode::OffNormal(a) => Some(a.alarm()),
        }
    }

    pub fn as_alarm_mut(&mut self) -> Option<&mut AlarmCondition> {
        match self {
            ConditionNode::Acknowledgeable(_) => None,
            ConditionNode::Alarm(a) => Some(a),
            ConditionNode::ExclusiveLimit(a) => Some(a.alarm_mut()),
            ConditionNode::NonExclusiveLimit(a) => Some(a.alarm_mut()),
            ConditionNode::OffNormal(a) => Some(a.alarm_mut()),
        }
    }

    pub fn as_exclusive_limit(&self) -> Option<&ExclusiveLimitAlarm> {
        match self {
            ConditionNode::ExclusiveLimit(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_non_exclusive_limit(&self) -> Option<&NonExclusiveLimitAlarm> {
        match self {
            ConditionNode::NonExclusiveLimit(a) => Some(a),
            _ => None,
        }
    }
}

/// Options shared by the condition and alarm factories. Unused fields are
/// simply ignored by factories that do not need them.
#[derive(Debug, Clone, Default)]
pub struct InstantiateOptions {
    /// Browse name of the new condition node (unique per engine)
    pub browse_name: String,
    /// Node the condition reports about
    pub condition_source: NodeId,
    /// Source display name; defaults to the source node's string form
    pub source_name: Option<String>,
    /// Monitored input variable (alarm kinds)
    pub input_node: Option<NodeId>,
    /// Setpoint variable (deviation alarms)
    pub setpoint_node: Option<NodeId>,
    /// Normal-state variable (off-normal alarms)
    pub normal_state_node: Option<NodeId>,
    /// Optional components to instantiate, e.g. "ConfirmedState"
    pub optionals: Vec<String>,
    /// Upper bound for TimedShelve durations, milliseconds
    pub max_time_shelved: Option<f64>,
    /// Limit thresholds (limit and deviation alarms)
    pub limits: LimitSet,
    pub condition_class: Option<NodeId>,
    pub condition_name: Option<String>,
    /// Initial severity, set silently before the first event
    pub severity: Option<u16>,
}

impl InstantiateOptions {
    fn with_confirm(&self) -> bool {
        self.optionals.iter().any(|o| o == "ConfirmedState" || o == "Confirm")
    }
}

/// Engine counters, serializable for health reporting.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub condition_count: usize,
    pub retained_count: usize,
    pub events_emitted: u64,
    pub refresh_cycles: u64,
    pub shelving_expiries: u64,
}

/// Per-condition summary for HMI alarm lists.
#[derive(Debug, Clone, Serialize)]
pub struct ConditionSummary {
    pub condition_name: String,
    pub source_name: String,
    pub message: String,
    pub severity: u16,
    pub active: bool,
    pub acked: bool,
    pub confirmed: bool,
    pub retain: bool,
    pub branch_count: usize,
}

/// Handle for a value-change listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueSubscription(u64);

type ValueListener = Box<dyn FnMut(&NodeId, &DataValue)>;

/// Counts emissions on their way to the bus.
struct CountingSink<'a> {
    bus: &'a mut EventBus,
    counter: &'a mut u64,
}

impl EventSink for CountingSink<'_> {
    fn emit(&mut self, event: ConditionEvent) {
        *self.counter += 1;
        self.bus.emit(event);
    }
}

/// The alarm engine: owns the address space, the condition registry, and the
/// event bus. Every mutation funnels through `&mut self`, which is the whole
/// concurrency story; callers on other threads are serialized by whatever
/// hosts the engine, never inside it.
pub struct AlarmEngine {
    space: AddressSpace,
    conditions: HashMap<NodeId, ConditionNode>,
    /// Instantiation order, which fixes the refresh dump order
    order: Vec<NodeId>,
    bus: EventBus,
    /// input/setpoint/normal variable -> conditions monitoring it
    watchers: HashMap<NodeId, Vec<NodeId>>,
    value_listeners: Vec<(ValueSubscription, ValueListener)>,
    next_value_handle: u64,
    events_emitted: u64,
    refresh_cycles: u64,
    shelving_expiries: u64,
    server_node: NodeId,
}

impl std::fmt::Debug for AlarmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmEngine")
            .field("conditions", &self.conditions.len())
            .field("variables", &self.space.len())
            .field("events_emitted", &self.events_emitted)
            .finish()
    }
}

impl AlarmEngine {
    pub fn new() -> Self {
        Self {
            space: AddressSpace::new(),
            conditions: HashMap::new(),
            order: Vec::new(),
            bus: EventBus::new(),
            watchers: HashMap::new(),
            value_listeners: Vec::new(),
            next_value_handle: 0,
            events_emitted: 0,
            refresh_cycles: 0,
            shelving_expiries: 0,
            server_node: NodeId::Numeric(2253), // Server object
        }
    }

    /// Build an engine from configuration: declares every signal, then
    /// instantiates and enables every alarm definition.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut engine = Self::new();
        for signal in &config.signals {
            engine.space.add_variable(&signal.name, signal.initial_variant()?)?;
        }
        for def in &config.alarms {
            let id = def.instantiate(&mut engine)?;
            engine.enable(&id);
        }
        info!(
            "Engine configured with {} signals and {} alarms",
            config.signals.len(),
            config.alarms.len()
        );
        Ok(engine)
    }

    pub fn address_space(&self) -> &AddressSpace {
        &self.space
    }

    pub fn address_space_mut(&mut self) -> &mut AddressSpace {
        &mut self.space
    }

    pub fn condition(&self, id: &NodeId) -> Option<&ConditionNode> {
        self.conditions.get(id)
    }

    pub fn condition_mut(&mut self, id: &NodeId) -> Option<&mut ConditionNode> {
        self.conditions.get_mut(id)
    }

    /// Condition node id by browse name.
    pub fn find_condition(&self, browse_name: &str) -> Option<NodeId> {
        let id = NodeId::from_name(browse_name);
        self.conditions.contains_key(&id).then_some(id)
    }

    // --- factories -----------------------------------------------------

    /// Instantiate a condition by type name. Abstract types are a
    /// construction-time error and leave nothing behind.
    pub fn instantiate_condition(
        &mut self,
        type_name: &str,
        options: InstantiateOptions,
    ) -> Result<NodeId> {
        match type_name {
            "ConditionType" | "LimitAlarmType" => {
                Err(SentraError::AbstractConditionType(type_name.to_string()))
            }
            "AcknowledgeableConditionType" => {
                let identity =
                    self.make_identity(&options, event_type_ids::ACKNOWLEDGEABLE_CONDITION)?;
                let condition =
                    AcknowledgeableCondition::new(identity, Utc::now(), options.with_confirm());
                self.register(ConditionNode::Acknowledgeable(condition), &options)
            }
            "AlarmConditionType" => self.instantiate_alarm_condition(options),
            "ExclusiveLimitAlarmType" => self.instantiate_exclusive_limit_alarm(options),
            "NonExclusiveLimitAlarmType" => self.instantiate_non_exclusive_limit_alarm(options),
            "ExclusiveDeviationAlarmType" => self.instantiate_exclusive_deviation_alarm(options),
            "NonExclusiveDeviationAlarmType" => {
                self.instantiate_non_exclusive_deviation_alarm(options)
            }
            "OffNormalAlarmType" => self.instantiate_off_normal_alarm(options),
            other => {
                Err(SentraError::Config(format!("unknown condition type '{}'", other)))
            }
        }
    }

    /// Plain alarm condition whose active state is driven manually.
    pub fn instantiate_alarm_condition(&mut self, options: InstantiateOptions) -> Result<NodeId> {
        let identity = self.make_identity(&options, event_type_ids::ALARM_CONDITION)?;
        let alarm = AlarmCondition::new(identity, Utc::now(), Self::alarm_options(&options));
        self.register(ConditionNode::Alarm(alarm), &options)
    }

    pub fn instantiate_exclusive_limit_alarm(
        &mut self,
        options: InstantiateOptions,
    ) -> Result<NodeId> {
        self.instantiate_limit(options, event_type_ids::EXCLUSIVE_LIMIT_ALARM, true, false)
    }

    pub fn instantiate_non_exclusive_limit_alarm(
        &mut self,
        options: InstantiateOptions,
    ) -> Result<NodeId> {
        self.instantiate_limit(options, event_type_ids::NON_EXCLUSIVE_LIMIT_ALARM, false, false)
    }

    pub fn instantiate_exclusive_deviation_alarm(
        &mut self,
        options: InstantiateOptions,
    ) -> Result<NodeId> {
        self.instantiate_limit(options, event_type_ids::EXCLUSIVE_DEVIATION_ALARM, true, true)
    }

    pub fn instantiate_non_exclusive_deviation_alarm(
        &mut self,
        options: InstantiateOptions,
    ) -> Result<NodeId> {
        self.instantiate_limit(options, event_type_ids::NON_EXCLUSIVE_DEVIATION_ALARM, false, true)
    }

    pub fn instantiate_off_normal_alarm(&mut self, options: InstantiateOptions) -> Result<NodeId> {
        let normal = options.normal_state_node.clone().ok_or_else(|| {
            SentraError::Config(format!(
                "off-normal alarm '{}' requires a normalState node",
                options.browse_name
            ))
        })?;
        if self.space.read_value(&normal).is_none() {
            return Err(SentraError::NodeNotFound(normal.to_string()));
        }
        // The input must exist but may be any type; equality, not
        // thresholds, drives this alarm
        let input = Self::require_input(&options)?;
        if self.space.read_value(&input).is_none() {
            return Err(SentraError::NodeNotFound(input.to_string()));
        }
        let identity = self.make_identity(&options, event_type_ids::OFF_NORMAL_ALARM)?;
        let alarm =
            OffNormalAlarm::new(identity, Utc::now(), Self::alarm_options(&options), normal);
        self.register(ConditionNode::OffNormal(alarm), &options)
    }

    fn instantiate_limit(
        &mut self,
        options: InstantiateOptions,
        event_type: NodeId,
        exclusive: bool,
        deviation: bool,
    ) -> Result<NodeId> {
        let input = Self::require_input(&options)?;
        self.check_numeric(&input)?;
        if deviation {
            let setpoint = options.setpoint_node.clone().ok_or_else(|| {
                SentraError::Config(format!(
                    "deviation alarm '{}' requires a setpoint node",
                    options.browse_name
                ))
            })?;
            self.check_numeric(&setpoint)?;
        }
        let identity = self.make_identity(&options, event_type)?;
        let alarm_options = Self::alarm_options(&options);
        let node = if exclusive {
            ConditionNode::ExclusiveLimit(ExclusiveLimitAlarm::new(
                identity,
                Utc::now(),
                alarm_options,
                options.limits,
            ))
        } else {
            ConditionNode::NonExclusiveLimit(NonExclusiveLimitAlarm::new(
                identity,
                Utc::now(),
                alarm_options,
                options.limits,
            ))
        };
        self.register(node, &options)
    }

    fn require_input(options: &InstantiateOptions) -> Result<NodeId> {
        options.input_node.clone().ok_or_else(|| {
            SentraError::Config(format!("alarm '{}' requires an input node", options.browse_name))
        })
    }

    fn check_numeric(&self, node: &NodeId) -> Result<()> {
        let data_type = self
            .space
            .data_type_of(node)
            .ok_or_else(|| SentraError::NodeNotFound(node.to_string()))?;
        if !data_type.is_numeric_scalar() {
            return Err(SentraError::InvalidInputDataType {
                node: node.to_string(),
                data_type,
            });
        }
        Ok(())
    }

    fn make_identity(
        &self,
        options: &InstantiateOptions,
        event_type: NodeId,
    ) -> Result<ConditionIdentity> {
        if options.browse_name.is_empty() {
            return Err(SentraError::Config("condition browse name is empty".into()));
        }
        let node_id = NodeId::from_name(&options.browse_name);
        if self.conditions.contains_key(&node_id) {
            return Err(SentraError::DuplicateNode(options.browse_name.clone()));
        }
        Ok(ConditionIdentity {
            node_id,
            event_type,
            source_node: options.condition_source.clone(),
            source_name: options
                .source_name
                .clone()
                .unwrap_or_else(|| options.condition_source.to_string()),
            condition_class_id: options
                .condition_class
                .clone()
                .unwrap_or(NodeId::Numeric(11163)), // ProcessConditionClassType
            condition_class_name: LocalizedText::new("ProcessConditionClass"),
            condition_name: options
                .condition_name
                .clone()
                .unwrap_or_else(|| options.browse_name.clone()),
        })
    }

    fn alarm_options(options: &InstantiateOptions) -> AlarmOptions {
        AlarmOptions {
            input_node: options.input_node.clone().unwrap_or_default(),
            setpoint_node: options.setpoint_node.clone(),
            with_confirm: options.with_confirm(),
            max_time_shelved: options.max_time_shelved,
        }
    }

    fn register(&mut self, mut node: ConditionNode, options: &InstantiateOptions) -> Result<NodeId> {
        let id = node.base().node_id().clone();
        if let Some(severity) = options.severity {
            node.base_mut().current_mut().set_severity(severity);
        }
        for watched in [
            options.input_node.as_ref(),
            options.setpoint_node.as_ref(),
            options.normal_state_node.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            self.watchers.entry(watched.clone()).or_default().push(id.clone());
        }
        if node.as_alarm().is_some() {
            // Expose the shelving state and the derived flag so clients can
            // monitor them like any other variable
            self.space.add_variable(
                shelving_variable_name(&options.browse_name),
                Variant::LocalizedText(LocalizedText::new("Unshelved")),
            )?;
            self.space.add_variable(
                suppressed_or_shelved_variable_name(&options.browse_name),
                Variant::Boolean(false),
            )?;
        }
        info!("Instantiated condition '{}'", options.browse_name);
        self.order.push(id.clone());
        self.conditions.insert(id.clone(), node);
        Ok(id)
    }

    /// Remove a condition and all of its monitoring links.
    pub fn remove_condition(&mut self, id: &NodeId) -> bool {
        let existed = self.conditions.remove(id).is_some();
        if existed {
            self.order.retain(|o| o != id);
            for list in self.watchers.values_mut() {
                list.retain(|c| c != id);
            }
        }
        existed
    }

    // --- value propagation ---------------------------------------------

    /// Write a variable and synchronously re-evaluate every condition
    /// watching it.
    pub fn write_value(&mut self, node: &NodeId, value: Variant) -> Result<()> {
        self.space.set_value_from_source(node, value)?;
        self.notify_value_listeners(node);
        let watching: Vec<NodeId> = self.watchers.get(node).cloned().unwrap_or_default();
        for cond_id in watching {
            self.reevaluate(&cond_id);
        }
        Ok(())
    }

    /// Convenience write by browse name.
    pub fn write_signal(&mut self, name: &str, value: Variant) -> Result<()> {
        let node = self
            .space
            .find_variable(name)
            .ok_or_else(|| SentraError::NodeNotFound(name.to_string()))?;
        self.write_value(&node, value)
    }

    /// Re-derive one condition's state from its monitored values. Alarm
    /// subtypes re-run their comparison; non-monitoring kinds are a no-op.
    pub fn reevaluate(&mut self, cond_id: &NodeId) {
        let now = Utc::now();
        let (input, reference, normal) = match self.conditions.get(cond_id) {
            Some(ConditionNode::ExclusiveLimit(a)) => (
                self.space.get_value(a.alarm().input_node()).cloned(),
                self.setpoint_value(a.alarm().setpoint_node()),
                None,
            ),
            Some(ConditionNode::NonExclusiveLimit(a)) => (
                self.space.get_value(a.alarm().input_node()).cloned(),
                self.setpoint_value(a.alarm().setpoint_node()),
                None,
            ),
            Some(ConditionNode::OffNormal(a)) => (
                self.space.get_value(a.alarm().input_node()).cloned(),
                0.0,
                self.space.get_value(a.normal_state_node()).cloned(),
            ),
            _ => return,
        };
        let Some(input) = input else {
            warn!("Condition {} has no readable input value", cond_id);
            return;
        };
        let mut sink = CountingSink { bus: &mut self.bus, counter: &mut self.events_emitted };
        match self.conditions.get_mut(cond_id) {
            Some(ConditionNode::ExclusiveLimit(a)) => {
                a.evaluate(&input, reference, now, &mut sink);
            }
            Some(ConditionNode::NonExclusiveLimit(a)) => {
                a.evaluate(&input, reference, now, &mut sink);
            }
            Some(ConditionNode::OffNormal(a)) => {
                if let Some(normal) = normal {
                    a.evaluate(&input, &normal, now, &mut sink);
                }
            }
            _ => {}
        }
    }

    fn setpoint_value(&self, setpoint: Option<&NodeId>) -> f64 {
        setpoint
            .and_then(|n| self.space.get_value(n))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    // --- method dispatch ------------------------------------------------

    /// Enable a condition, then immediately re-evaluate its input so a state
    /// that drifted while disabled raises its catch-up event.
    pub fn enable(&mut self, cond_id: &NodeId) -> StatusCode {
        let now = Utc::now();
        let status = {
            let Some(node) = self.conditions.get_mut(cond_id) else {
                return StatusCode::BadNodeIdUnknown;
            };
            let mut sink =
                CountingSink { bus: &mut self.bus, counter: &mut self.events_emitted };
            node.base_mut().enable(now, &mut sink)
        };
        if status.is_good() {
            self.reevaluate(cond_id);
        }
        status
    }

    pub fn disable(&mut self, cond_id: &NodeId) -> StatusCode {
        let now = Utc::now();
        let Some(node) = self.conditions.get_mut(cond_id) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let mut sink = CountingSink { bus: &mut self.bus, counter: &mut self.events_emitted };
        node.base_mut().disable(now, &mut sink)
    }

    pub fn acknowledge(
        &mut self,
        cond_id: &NodeId,
        event_id: Option<&EventId>,
        comment: Option<LocalizedText>,
    ) -> StatusCode {
        let now = Utc::now();
        let Some(node) = self.conditions.get_mut(cond_id) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let mut sink = CountingSink { bus: &mut self.bus, counter: &mut self.events_emitted };
        node.acknowledgeable_mut().acknowledge(event_id, comment, now, &mut sink)
    }

    pub fn confirm(
        &mut self,
        cond_id: &NodeId,
        event_id: Option<&EventId>,
        comment: Option<LocalizedText>,
    ) -> StatusCode {
        let now = Utc::now();
        let Some(node) = self.conditions.get_mut(cond_id) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let mut sink = CountingSink { bus: &mut self.bus, counter: &mut self.events_emitted };
        node.acknowledgeable_mut().confirm(event_id, comment, now, &mut sink)
    }

    pub fn add_comment(
        &mut self,
        cond_id: &NodeId,
        event_id: Option<&EventId>,
        comment: LocalizedText,
    ) -> StatusCode {
        let now = Utc::now();
        let Some(node) = self.conditions.get_mut(cond_id) else {
            return StatusCode::BadNodeIdUnknown;
        };
        let mut sink = CountingSink { bus: &mut self.bus, counter: &mut self.events_emitted };
        node.base_mut().add_comment(event_id, comment, now, &mut sink)
    }

    pub fn timed_shelve(&mut self, cond_id: &NodeId, duration_ms: f64) -> StatusCode {
        let now = Utc::now();
        let status = match self.conditions.get_mut(cond_id).and_then(|n| n.as_alarm_mut()) {
            Some(alarm) => alarm.timed_shelve(duration_ms, now),
            None => return StatusCode::BadNodeIdUnknown,
        };
        if status.is_good() {
            self.sync_alarm_variables(cond_id);
        }
        status
    }

    pub fn one_shot_shelve(&mut self, cond_id: &NodeId) -> StatusCode {
        let now = Utc::now();
        let status = match self.conditions.get_mut(cond_id).and_then(|n| n.as_alarm_mut()) {
            Some(alarm) => alarm.one_shot_shelve(now),
            None => return StatusCode::BadNodeIdUnknown,
        };
        if status.is_good() {
            self.sync_alarm_variables(cond_id);
        }
        status
    }

    pub fn unshelve(&mut self, cond_id: &NodeId) -> StatusCode {
        let now = Utc::now();
        let status = match self.conditions.get_mut(cond_id).and_then(|n| n.as_alarm_mut()) {
            Some(alarm) => alarm.unshelve(now),
            None => return StatusCode::BadNodeIdUnknown,
        };
        if status.is_good() {
            self.sync_alarm_variables(cond_id);
        }
        status
    }

    /// Remaining timed-shelve countdown for an alarm, milliseconds.
    pub fn unshelve_time(&self, cond_id: &NodeId) -> Option<f64> {
        self.conditions
            .get(cond_id)
            .and_then(|n| n.as_alarm())
            .map(|a| a.shelving().unshelve_time(Utc::now()))
    }

    /// Advance every alarm's shelving deadline to `now`. Expired timed
    /// shelves revert to Unshelved; the state variable change is pushed to
    /// value listeners like any other write.
    pub fn tick_shelving(&mut self, now: DateTime<Utc>) {
        let ids: Vec<NodeId> = self.order.clone();
        for id in ids {
            let expired = self
                .conditions
                .get_mut(&id)
                .and_then(|n| n.as_alarm_mut())
                .map(|a| a.tick_shelving(now))
                .unwrap_or(false);
            if expired {
                debug!("Timed shelve of {} expired", id);
                self.shelving_expiries += 1;
                self.sync_alarm_variables(&id);
            }
        }
    }

    /// Set SuppressedState on an alarm and refresh the derived
    /// suppressedOrShelved variable.
    pub fn set_suppressed(&mut self, cond_id: &NodeId, suppressed: bool) -> StatusCode {
        let now = Utc::now();
        match self.conditions.get_mut(cond_id).and_then(|n| n.as_alarm_mut()) {
            Some(alarm) => alarm.set_suppressed(suppressed, now),
            None => return StatusCode::BadNodeIdUnknown,
        }
        self.sync_alarm_variables(cond_id);
        StatusCode::Good
    }

    fn sync_alarm_variables(&mut self, cond_id: &NodeId) {
        let Some((state, derived)) = self
            .conditions
            .get(cond_id)
            .and_then(|n| n.as_alarm())
            .map(|a| (a.shelving_state(), a.suppressed_or_shelved()))
        else {
            return;
        };
        // Condition instance ids are string node ids over the browse name
        let NodeId::String(browse_name) = cond_id else {
            return;
        };
        if let Some(node) = self.space.find_variable(shelving_variable_name(browse_name)) {
            let _ = self.space.set_value_from_source(
                &node,
                Variant::LocalizedText(LocalizedText::new(state.name())),
            );
            self.notify_value_listeners(&node);
        }
        if let Some(node) =
            self.space.find_variable(suppressed_or_shelved_variable_name(browse_name))
        {
            let _ = self.space.set_value_from_source(&node, Variant::Boolean(derived));
            self.notify_value_listeners(&node);
        }
    }

    // --- condition refresh ----------------------------------------------

    /// Re-send the retained condition set, bracketed by RefreshStart and
    /// RefreshEnd marker events. Order is a hard guarantee: start marker,
    /// each retained condition's events in instantiation order (current
    /// branch before detached branches), end marker.
    pub fn condition_refresh(&mut self, subscription_id: u32) -> StatusCode {
        let now = Utc::now();
        info!("ConditionRefresh for subscription {}", subscription_id);
        self.emit_marker(event_type_ids::REFRESH_START, now);
        let ids = self.order.clone();
        for id in ids {
            let (event_type, events) = match self.conditions.get(&id) {
                Some(node) if node.base().retained() => {
                    (node.base().identity().event_type.clone(), node.base().refresh_events())
                }
                _ => continue,
            };
            for payload in events {
                self.events_emitted += 1;
                self.bus.emit(ConditionEvent { event_type: event_type.clone(), payload });
            }
        }
        self.emit_marker(event_type_ids::REFRESH_END, now);
        self.refresh_cycles += 1;
        StatusCode::Good
    }

    fn emit_marker(&mut self, event_type: NodeId, now: DateTime<Utc>) {
        let mut payload = EventPayload::new();
        payload.set(
            "eventId",
            DataValue::new(Variant::ByteString(EventId::generate().as_bytes().to_vec())),
        );
        payload.set("eventType", DataValue::new(Variant::NodeId(event_type.clone())));
        payload.set("sourceNode", DataValue::new(Variant::NodeId(self.server_node.clone())));
        payload.set("sourceName", DataValue::new(Variant::String("Server".to_string())));
        payload.set("time", DataValue::new(Variant::DateTime(now)));
        payload.set("severity", DataValue::new(Variant::UInt16(0)));
        self.events_emitted += 1;
        self.bus.emit(ConditionEvent { event_type, payload });
    }

    // --- limit maintenance ----------------------------------------------

    /// Change one limit band of a limit or deviation alarm, then re-evaluate
    /// the current input against the new thresholds.
    pub fn set_limit(
        &mut self,
        cond_id: &NodeId,
        band: LimitStateName,
        value: f64,
    ) -> Result<()> {
        match self.conditions.get_mut(cond_id) {
            Some(ConditionNode::ExclusiveLimit(a)) => match band {
                LimitStateName::LowLow => a.set_low_low_limit(value),
                LimitStateName::Low => a.set_low_limit(value),
                LimitStateName::High => a.set_high_limit(value),
                LimitStateName::HighHigh => a.set_high_high_limit(value),
            },
            Some(ConditionNode::NonExclusiveLimit(a)) => match band {
                LimitStateName::LowLow => a.set_low_low_limit(value),
                LimitStateName::Low => a.set_low_limit(value),
                LimitStateName::High => a.set_high_limit(value),
                LimitStateName::HighHigh => a.set_high_high_limit(value),
            },
            Some(_) => {
                return Err(SentraError::Config(format!(
                    "condition {} is not a limit alarm",
                    cond_id
                )))
            }
            None => return Err(SentraError::NodeNotFound(cond_id.to_string())),
        }
        debug!("Limit {} of {} set to {}", band, cond_id, value);
        self.reevaluate(cond_id);
        Ok(())
    }

    // --- observers --------------------------------------------------------

    /// Register a condition-event listener on the server-wide bus.
    pub fn subscribe_events<F>(&mut self, handler: F) -> SubscriptionHandle
    where
        F: FnMut(&ConditionEvent) + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe_events(&mut self, handle: SubscriptionHandle) {
        self.bus.unsubscribe(handle);
    }

    /// Register a value-change listener covering monitored variables and
    /// exposed state variables (such as `<alarm>.ShelvingState.CurrentState`).
    /// Delivery is synchronous, in registration order.
    pub fn subscribe_value_changes<F>(&mut self, handler: F) -> ValueSubscription
    where
        F: FnMut(&NodeId, &DataValue) + 'static,
    {
        let handle = ValueSubscription(self.next_value_handle);
        self.next_value_handle += 1;
        self.value_listeners.push((handle, Box::new(handler)));
        handle
    }

    /// Remove a value-change listener. Idempotent.
    pub fn unsubscribe_value_changes(&mut self, handle: ValueSubscription) {
        self.value_listeners.retain(|(h, _)| *h != handle);
    }

    fn notify_value_listeners(&mut self, node: &NodeId) {
        if self.value_listeners.is_empty() {
            return;
        }
        let Some(value) = self.space.read_value(node).cloned() else {
            return;
        };
        for (_, listener) in self.value_listeners.iter_mut() {
            listener(node, &value);
        }
    }

    // --- reporting --------------------------------------------------------

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            condition_count: self.conditions.len(),
            retained_count: self
                .conditions
                .values()
                .filter(|n| n.base().retained())
                .count(),
            events_emitted: self.events_emitted,
            refresh_cycles: self.refresh_cycles,
            shelving_expiries: self.shelving_expiries,
        }
    }

    /// Summaries of every currently retained condition, in instantiation
    /// order.
    pub fn retained_summaries(&self) -> Vec<ConditionSummary> {
        self.order
            .iter()
            .filter_map(|id| self.conditions.get(id))
            .filter(|n| n.base().retained())
            .map(|n| {
                let c = n.base().current();
                ConditionSummary {
                    condition_name: n.base().condition_name().to_string(),
                    source_name: n.base().identity().source_name.clone(),
                    message: c.message().text.clone(),
                    severity: c.severity(),
                    active: c.active(),
                    acked: c.acked(),
                    confirmed: c.confirmed(),
                    retain: c.retain(),
                    branch_count: n.base().branch_count(),
                }
            })
            .collect()
    }

    /// Drive the engine until shutdown: shelving deadlines are checked from
    /// a tokio interval, so timed shelves expire between (never during)
    /// other mutations.
    pub async fn run(&mut self, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        info!("Engine running (tick {:?})", tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick_shelving(Utc::now());
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown requested");
                    break;
                }
            }
        }
    }
}

impl Default for AlarmEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn shelving_variable_name(browse_name: &str) -> String {
    format!("{}.ShelvingState.CurrentState", browse_name)
}

fn suppressed_or_shelved_variable_name(browse_name: &str) -> String {
    format!("{}.SuppressedOrShelved", browse_name)
}
