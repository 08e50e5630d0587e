// src/limit_alarm.rs - Exclusive/non-exclusive limit and deviation alarms
use crate::alarm::{AlarmCondition, AlarmOptions};
use crate::events::EventSink;
use crate::snapshot::ConditionIdentity;
use crate::state_machine::FiniteStateMachine;
use crate::types::{DataValue, LocalizedText};
use crate::value::Variant;
use crate::TwoStateVariable;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The four limit bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitStateName {
    LowLow,
    Low,
    High,
    HighHigh,
}

impl LimitStateName {
    pub fn name(self) -> &'static str {
        match self {
            LimitStateName::LowLow => "LowLow",
            LimitStateName::Low => "Low",
            LimitStateName::High => "High",
            LimitStateName::HighHigh => "HighHigh",
        }
    }
}

impl fmt::Display for LimitStateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configured limit thresholds; each band is optional per subtype.
///
/// Ordering (`lowLow <= low <= high <= highHigh`) is not enforced; a
/// misordered configuration logs a warning and behavior follows the
/// evaluation order (outermost bands win). Boundary comparisons are
/// inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LimitSet {
    pub low_low: Option<f64>,
    pub low: Option<f64>,
    pub high: Option<f64>,
    pub high_high: Option<f64>,
}

/// Per-band booleans of a non-exclusive evaluation; several can hold at
/// once (a value below lowLow is also low).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitFlags {
    pub low_low: bool,
    pub low: bool,
    pub high: bool,
    pub high_high: bool,
}

impl LimitFlags {
    pub fn any(self) -> bool {
        self.low_low || self.low || self.high || self.high_high
    }
}

impl LimitSet {
    /// Exclusive evaluation: outermost band wins (HighHigh over High,
    /// LowLow over Low), `None` means inside normal range.
    pub fn exclusive_state(&self, value: f64) -> Option<LimitStateName> {
        if let Some(hh) = self.high_high {
            if value >= hh {
                return Some(LimitStateName::HighHigh);
            }
        }
        if let Some(ll) = self.low_low {
            if value <= ll {
                return Some(LimitStateName::LowLow);
            }
        }
        if let Some(h) = self.high {
            if value >= h {
                return Some(LimitStateName::High);
            }
        }
        if let Some(l) = self.low {
            if value <= l {
                return Some(LimitStateName::Low);
            }
        }
        None
    }

    /// Non-exclusive evaluation: every configured band is tested
    /// independently.
    pub fn flags(&self, value: f64) -> LimitFlags {
        LimitFlags {
            low_low: self.low_low.map(|ll| value <= ll).unwrap_or(false),
            low: self.low.map(|l| value <= l).unwrap_or(false),
            high: self.high.map(|h| value >= h).unwrap_or(false),
            high_high: self.high_high.map(|hh| value >= hh).unwrap_or(false),
        }
    }

    /// Warn (once per call site) when the configured bands are misordered.
    pub fn check_ordering(&self, context: &str) {
        let ordered: Vec<f64> = [self.low_low, self.low, self.high, self.high_high]
            .iter()
            .flatten()
            .copied()
            .collect();
        if ordered.windows(2).any(|w| w[0] > w[1]) {
            warn!("Limits of '{}' are misordered: {:?}", context, self);
        }
    }
}

fn active_message(value: &Variant, state: &str) -> LocalizedText {
    LocalizedText::new(format!("Condition value is {} and state is {}", value, state))
}

fn normal_message() -> LocalizedText {
    LocalizedText::new("Back to normal")
}

/// Exclusive limit alarm: a 4-state machine over the configured bands, at
/// most one band current, plus the null "inside range" state.
///
/// Deviation variants are the same machinery with a setpoint node; the
/// compared value is then `input - setpoint`.
#[derive(Debug)]
pub struct ExclusiveLimitAlarm {
    alarm: AlarmCondition,
    limits: LimitSet,
    limit_state: FiniteStateMachine,
}

impl ExclusiveLimitAlarm {
    pub fn new(
        identity: ConditionIdentity,
        now: DateTime<Utc>,
        options: AlarmOptions,
        limits: LimitSet,
    ) -> Self {
        limits.check_ordering(&identity.condition_name);
        // ExclusiveLimitStateMachineType well-known ids; only configured
        // bands become states
        let mut machine = FiniteStateMachine::new();
        if limits.high_high.is_some() {
            let _ = machine.add_state("HighHigh", 9329);
        }
        if limits.high.is_some() {
            let _ = machine.add_state("High", 9331);
        }
        if limits.low.is_some() {
            let _ = machine.add_state("Low", 9333);
        }
        if limits.low_low.is_some() {
            let _ = machine.add_state("LowLow", 9335);
        }
        if limits.high.is_some() && limits.high_high.is_some() {
            let _ = machine.add_transition("HighHigh", "High", 9339);
            let _ = machine.add_transition("High", "HighHigh", 9340);
        }
        if limits.low.is_some() && limits.low_low.is_some() {
            let _ = machine.add_transition("LowLow", "Low", 9337);
            let _ = machine.add_transition("Low", "LowLow", 9338);
        }
        Self { alarm: AlarmCondition::new(identity, now, options), limits, limit_state: machine }
    }

    pub fn alarm(&self) -> &AlarmCondition {
        &self.alarm
    }

    pub fn alarm_mut(&mut self) -> &mut AlarmCondition {
        &mut self.alarm
    }

    pub fn limits(&self) -> &LimitSet {
        &self.limits
    }

    /// Current band name, `None` while inside normal range.
    pub fn limit_state_name(&self) -> Option<&str> {
        self.limit_state.current_state_name()
    }

    /// Current band as a readable value (`BadStateNotActive` when normal).
    pub fn limit_state_value(&self) -> DataValue {
        self.limit_state.current_state_value()
    }

    pub fn set_low_low_limit(&mut self, value: f64) {
        self.limits.low_low = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    pub fn set_low_limit(&mut self, value: f64) {
        self.limits.low = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    pub fn set_high_limit(&mut self, value: f64) {
        self.limits.high = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    pub fn set_high_high_limit(&mut self, value: f64) {
        self.limits.high_high = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    /// Evaluate against a new input (and reference for deviation alarms).
    /// Emits at most one state-change event pair; nothing when the derived
    /// band is unchanged or the condition is disabled.
    pub fn evaluate(
        &mut self,
        input: &Variant,
        reference: f64,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) -> bool {
        let Some(raw) = input.as_f64() else {
            return false;
        };
        let state = self.limits.exclusive_state(raw - reference);
        let (active, label, message) = match state {
            Some(band) => (true, Some(band.name()), active_message(input, band.name())),
            None => (false, None, normal_message()),
        };
        let changed = self
            .alarm
            .update_active_state(active, label, message, None, now, sink);
        if changed {
            match state {
                Some(band) => self.limit_state.set_state(band.name(), now),
                None => self.limit_state.clear_state(now),
            }
        }
        changed
    }
}

/// Non-exclusive limit alarm: four independent TwoStateVariables, several
/// of which may be true at once; ActiveState is their OR.
#[derive(Debug)]
pub struct NonExclusiveLimitAlarm {
    alarm: AlarmCondition,
    limits: LimitSet,
    low_low_state: Option<TwoStateVariable>,
    low_state: Option<TwoStateVariable>,
    high_state: Option<TwoStateVariable>,
    high_high_state: Option<TwoStateVariable>,
}

impl NonExclusiveLimitAlarm {
    pub fn new(
        identity: ConditionIdentity,
        now: DateTime<Utc>,
        options: AlarmOptions,
        limits: LimitSet,
    ) -> Self {
        limits.check_ordering(&identity.condition_name);
        let band = |configured: bool| {
            configured.then(|| {
                TwoStateVariable::new("Active", "Inactive").true_substate_of("ActiveState")
            })
        };
        Self {
            low_low_state: band(limits.low_low.is_some()),
            low_state: band(limits.low.is_some()),
            high_state: band(limits.high.is_some()),
            high_high_state: band(limits.high_high.is_some()),
            alarm: AlarmCondition::new(identity, now, options),
            limits,
        }
    }

    pub fn alarm(&self) -> &AlarmCondition {
        &self.alarm
    }

    pub fn alarm_mut(&mut self) -> &mut AlarmCondition {
        &mut self.alarm
    }

    pub fn limits(&self) -> &LimitSet {
        &self.limits
    }

    /// Current per-band booleans.
    pub fn flags(&self) -> LimitFlags {
        let id = |s: &Option<TwoStateVariable>| s.as_ref().map(|v| v.id()).unwrap_or(false);
        LimitFlags {
            low_low: id(&self.low_low_state),
            low: id(&self.low_state),
            high: id(&self.high_state),
            high_high: id(&self.high_high_state),
        }
    }

    pub fn set_low_low_limit(&mut self, value: f64) {
        self.limits.low_low = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    pub fn set_low_limit(&mut self, value: f64) {
        self.limits.low = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    pub fn set_high_limit(&mut self, value: f64) {
        self.limits.high = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    pub fn set_high_high_limit(&mut self, value: f64) {
        self.limits.high_high = Some(value);
        self.limits.check_ordering(self.alarm.base().condition_name());
    }

    /// Evaluate against a new input (and reference for deviation alarms).
    pub fn evaluate(
        &mut self,
        input: &Variant,
        reference: f64,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) -> bool {
        let Some(raw) = input.as_f64() else {
            return false;
        };
        let flags = self.limits.flags(raw - reference);
        let label = Self::label_of(flags);
        let (active, message) = if flags.any() {
            (true, active_message(input, &label))
        } else {
            (false, normal_message())
        };
        let changed = self.alarm.update_active_state(
            active,
            if active { Some(label.as_str()) } else { None },
            message,
            None,
            now,
            sink,
        );
        if changed {
            if let Some(s) = self.low_low_state.as_mut() {
                s.set(flags.low_low, now);
            }
            if let Some(s) = self.low_state.as_mut() {
                s.set(flags.low, now);
            }
            if let Some(s) = self.high_state.as_mut() {
                s.set(flags.high, now);
            }
            if let Some(s) = self.high_high_state.as_mut() {
                s.set(flags.high_high, now);
            }
        }
        changed
    }

    fn label_of(flags: LimitFlags) -> String {
        let mut parts = Vec::new();
        if flags.low_low {
            parts.push("LowLow");
        }
        if flags.low {
            parts.push("Low");
        }
        if flags.high {
            parts.push("High");
        }
        if flags.high_high {
            parts.push("HighHigh");
        }
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exclusive_outside_in_priority() {
        let limits = LimitSet {
            low_low: Some(-10.0),
            low: Some(1.0),
            high: Some(10.0),
            high_high: Some(100.0),
        };
        assert_eq!(limits.exclusive_state(-100.0), Some(LimitStateName::LowLow));
        assert_eq!(limits.exclusive_state(-10.0), Some(LimitStateName::LowLow));
        assert_eq!(limits.exclusive_state(0.0), Some(LimitStateName::Low));
        assert_eq!(limits.exclusive_state(4.0), None);
        assert_eq!(limits.exclusive_state(10.0), Some(LimitStateName::High));
        assert_eq!(limits.exclusive_state(99.0), Some(LimitStateName::High));
        assert_eq!(limits.exclusive_state(100.0), Some(LimitStateName::HighHigh));
    }

    #[test]
    fn test_exclusive_with_partial_bands() {
        let limits = LimitSet { high: Some(10.0), ..Default::default() };
        assert_eq!(limits.exclusive_state(11.0), Some(LimitStateName::High));
        assert_eq!(limits.exclusive_state(-1000.0), None);
    }

    #[test]
    fn test_non_exclusive_flags_overlap() {
        let limits = LimitSet {
            low_low: Some(-10.0),
            low: Some(-1.0),
            high: Some(10.0),
            high_high: Some(100.0),
        };
        let f = limits.flags(-100.0);
        assert!(f.low_low && f.low && !f.high && !f.high_high);
        let f = limits.flags(200.0);
        assert!(!f.low_low && !f.low && f.high && f.high_high);
        let f = limits.flags(0.0);
        assert!(!f.any());
    }

    #[test]
    fn test_inclusive_boundaries() {
        let limits = LimitSet { low: Some(-1.0), high: Some(10.0), ..Default::default() };
        let f = limits.flags(10.0);
        assert!(f.high);
        let f = limits.flags(-1.0);
        assert!(f.low);
    }
}
