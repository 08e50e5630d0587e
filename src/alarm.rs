// src/alarm.rs - AlarmCondition: active/suppressed/shelving composition
use crate::acknowledgeable::AcknowledgeableCondition;
use crate::condition::{ConditionBase, ConditionInfo};
use crate::events::EventSink;
use crate::shelving::{ShelvingState, ShelvingStateMachine};
use crate::snapshot::{ConditionIdentity, ConditionSnapshot};
use crate::types::{LocalizedText, NodeId};
use crate::TwoStateVariable;
use crate::StatusCode;
use chrono::{DateTime, Utc};
use log::debug;

/// Construction options common to all alarm kinds.
#[derive(Debug, Clone, Default)]
pub struct AlarmOptions {
    /// Monitored input variable
    pub input_node: NodeId,
    /// Setpoint variable for deviation alarms
    pub setpoint_node: Option<NodeId>,
    /// Instantiate the optional ConfirmedState/Confirm pair
    pub with_confirm: bool,
    /// Upper bound for TimedShelve durations, milliseconds
    pub max_time_shelved: Option<f64>,
}

/// A condition driven by monitoring an input value: adds ActiveState,
/// SuppressedState, a shelving state machine, and the derived
/// `suppressedOrShelved` boolean.
#[derive(Debug)]
pub struct AlarmCondition {
    ack: AcknowledgeableCondition,
    shelving: ShelvingStateMachine,
    input_node: NodeId,
    setpoint_node: Option<NodeId>,
    suppressed_or_shelved: bool,
    /// Derived-state key of the last evaluation, for event de-duplication
    last_state_key: Option<String>,
}

/// Dedup key for the in-range (non-alarmed) state.
const NORMAL_KEY: &str = "__normal";

impl AlarmCondition {
    pub fn new(identity: ConditionIdentity, now: DateTime<Utc>, options: AlarmOptions) -> Self {
        let mut snapshot = ConditionSnapshot::current(now);
        snapshot.acked_state = Some(
            TwoStateVariable::new("Acknowledged", "Unacknowledged")
                .true_substate_of("EnabledState")
                .initially(true),
        );
        if options.with_confirm {
            snapshot.confirmed_state = Some(
                TwoStateVariable::new("Confirmed", "Unconfirmed")
                    .true_substate_of("EnabledState")
                    .initially(true),
            );
        }
        snapshot.active_state = Some(
            TwoStateVariable::new("Active", "Inactive").true_substate_of("EnabledState"),
        );
        snapshot.suppressed_state = Some(
            TwoStateVariable::new("Suppressed", "Unsuppressed").true_substate_of("EnabledState"),
        );
        let base = ConditionBase::new(identity, snapshot);
        Self {
            ack: AcknowledgeableCondition::from_base(base),
            shelving: ShelvingStateMachine::new(options.max_time_shelved, now),
            input_node: options.input_node,
            setpoint_node: options.setpoint_node,
            suppressed_or_shelved: false,
            last_state_key: Some(NORMAL_KEY.to_string()),
        }
    }

    pub fn base(&self) -> &ConditionBase {
        self.ack.base()
    }

    pub fn base_mut(&mut self) -> &mut ConditionBase {
        self.ack.base_mut()
    }

    pub fn acknowledgeable(&self) -> &AcknowledgeableCondition {
        &self.ack
    }

    pub fn acknowledgeable_mut(&mut self) -> &mut AcknowledgeableCondition {
        &mut self.ack
    }

    pub fn input_node(&self) -> &NodeId {
        &self.input_node
    }

    pub fn setpoint_node(&self) -> Option<&NodeId> {
        self.setpoint_node.as_ref()
    }

    pub fn shelving(&self) -> &ShelvingStateMachine {
        &self.shelving
    }

    pub fn active(&self) -> bool {
        self.base().current().active()
    }

    /// `suppressedState.id OR shelvingState != Unshelved`, recomputed
    /// synchronously on every change of either input. Plain boolean, not a
    /// TwoStateVariable.
    pub fn suppressed_or_shelved(&self) -> bool {
        self.suppressed_or_shelved
    }

    /// Set SuppressedState and recompute the derived flag.
    pub fn set_suppressed(&mut self, suppressed: bool, now: DateTime<Utc>) {
        self.base_mut().current_mut().set_suppressed(suppressed, now);
        self.update_suppressed_or_shelved();
    }

    fn update_suppressed_or_shelved(&mut self) {
        let suppressed = self
            .base()
            .current()
            .suppressed_state
            .as_ref()
            .map(|s| s.id())
            .unwrap_or(false);
        self.suppressed_or_shelved = suppressed || self.shelving.is_shelved();
    }

    // --- shelving method contracts -------------------------------------

    pub fn timed_shelve(&mut self, duration_ms: f64, now: DateTime<Utc>) -> StatusCode {
        let status = self.shelving.timed_shelve(duration_ms, now);
        self.update_suppressed_or_shelved();
        status
    }

    pub fn one_shot_shelve(&mut self, now: DateTime<Utc>) -> StatusCode {
        let status = self.shelving.one_shot_shelve(now);
        self.update_suppressed_or_shelved();
        status
    }

    pub fn unshelve(&mut self, now: DateTime<Utc>) -> StatusCode {
        let status = self.shelving.unshelve(now);
        self.update_suppressed_or_shelved();
        status
    }

    /// Advance the timed-shelve deadline; true when it expired on this call.
    pub fn tick_shelving(&mut self, now: DateTime<Utc>) -> bool {
        let expired = self.shelving.tick(now);
        if expired {
            self.update_suppressed_or_shelved();
        }
        expired
    }

    pub fn shelving_state(&self) -> ShelvingState {
        self.shelving.state()
    }

    // --- active-state transitions --------------------------------------

    /// Manually drive the alarm active (tests and non-monitored alarms).
    pub fn activate(&mut self, now: DateTime<Utc>, sink: &mut dyn EventSink) -> bool {
        self.update_active_state(
            true,
            None,
            LocalizedText::new("Condition active"),
            None,
            now,
            sink,
        )
    }

    /// Manually drive the alarm back to normal.
    pub fn deactivate(&mut self, now: DateTime<Utc>, sink: &mut dyn EventSink) -> bool {
        self.update_active_state(
            false,
            None,
            LocalizedText::new("Back to normal"),
            None,
            now,
            sink,
        )
    }

    /// Apply a freshly derived (active, state-label) pair.
    ///
    /// Returns false without emitting anything when the condition is
    /// disabled, or when the derived state equals the previous one (the
    /// de-duplication invariant). Otherwise:
    ///
    /// - leaving the active state with an unacknowledged occurrence first
    ///   detaches a branch preserving that state (and raises its event),
    /// - the current branch is updated, retain recomputed from the
    ///   (Active, Acked, Confirmed) truth table, and one event raised with
    ///   the supplied message.
    pub fn update_active_state(
        &mut self,
        active: bool,
        state_label: Option<&str>,
        message: LocalizedText,
        severity: Option<u16>,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) -> bool {
        if !self.base().enabled() {
            return false;
        }
        let key = match (active, state_label) {
            (true, Some(label)) => label.to_string(),
            (true, None) => "Active".to_string(),
            (false, _) => NORMAL_KEY.to_string(),
        };
        if self.last_state_key.as_deref() == Some(key.as_str()) {
            return false;
        }
        debug!(
            "Alarm '{}' state change {:?} -> {}",
            self.base().condition_name(),
            self.last_state_key,
            key
        );
        self.last_state_key = Some(key);

        let was_active = self.base().current().active();
        if was_active && !active && !self.base().current().acked() {
            // Out-of-band history: keep the unacknowledged occurrence alive
            // on its own branch until someone acknowledges it.
            let branch_id = {
                let base = self.base_mut();
                let id = base.create_branch();
                if let Some(branch) = base.branch_mut(&id) {
                    branch.set_retain(true);
                }
                id
            };
            let idx = self.base().branch_count() - 1;
            self.base_mut().raise_branch_event(idx, now, sink);
            debug!(
                "Alarm '{}' parked unacked state on branch {}",
                self.base().condition_name(),
                branch_id
            );
            self.base_mut().current_mut().set_acked(true, now);
        }

        {
            let current = self.base_mut().current_mut();
            current.set_active(active, now);
            if active {
                // A new occurrence (or a new limit band) needs a fresh ack
                current.set_acked(false, now);
            }
            let retain = current.computed_retain();
            current.set_retain(retain);
        }
        self.base_mut().raise_new_condition(
            ConditionInfo { message: Some(message), severity, ..Default::default() },
            now,
            sink,
        );
        true
    }

}
