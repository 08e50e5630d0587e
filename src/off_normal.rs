// src/off_normal.rs - Discrete alarm driven by inequality against a normal state
use crate::alarm::{AlarmCondition, AlarmOptions};
use crate::events::EventSink;
use crate::snapshot::ConditionIdentity;
use crate::types::{LocalizedText, NodeId};
use crate::value::Variant;
use chrono::{DateTime, Utc};

/// Off-normal alarm: ActiveState is driven by inequality between the input
/// node's value and the normal-state node's value, not by a numeric
/// threshold. Both nodes are independently monitored; a change to either
/// re-evaluates and can toggle the alarm.
#[derive(Debug)]
pub struct OffNormalAlarm {
    alarm: AlarmCondition,
    normal_state_node: NodeId,
}

impl OffNormalAlarm {
    pub fn new(
        identity: ConditionIdentity,
        now: DateTime<Utc>,
        options: AlarmOptions,
        normal_state_node: NodeId,
    ) -> Self {
        Self { alarm: AlarmCondition::new(identity, now, options), normal_state_node }
    }

    pub fn alarm(&self) -> &AlarmCondition {
        &self.alarm
    }

    pub fn alarm_mut(&mut self) -> &mut AlarmCondition {
        &mut self.alarm
    }

    pub fn normal_state_node(&self) -> &NodeId {
        &self.normal_state_node
    }

    /// Compare input against the current normal value and apply the derived
    /// state.
    pub fn evaluate(
        &mut self,
        input: &Variant,
        normal: &Variant,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) -> bool {
        let active = input != normal;
        let (label, message) = if active {
            (
                Some("OffNormal"),
                LocalizedText::new(format!(
                    "Condition value is {} and state is OffNormal",
                    input
                )),
            )
        } else {
            (None, LocalizedText::new("Back to normal"))
        };
        self.alarm
            .update_active_state(active, label, message, None, now, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{event_type_ids, RecordingSink};

    fn make() -> OffNormalAlarm {
        let identity = ConditionIdentity {
            node_id: NodeId::from_name("BreakerTrip"),
            event_type: event_type_ids::OFF_NORMAL_ALARM,
            source_node: NodeId::from_name("Breaker1"),
            source_name: "Breaker1".to_string(),
            condition_class_id: NodeId::Numeric(11163),
            condition_class_name: LocalizedText::new("ProcessConditionClass"),
            condition_name: "BreakerTrip".to_string(),
        };
        OffNormalAlarm::new(
            identity,
            Utc::now(),
            AlarmOptions { input_node: NodeId::from_name("breaker_state"), ..Default::default() },
            NodeId::from_name("breaker_normal"),
        )
    }

    #[test]
    fn test_inequality_drives_active_state() {
        let mut alarm = make();
        let mut sink = RecordingSink::new();
        let now = Utc::now();
        alarm.alarm_mut().base_mut().enable(now, &mut sink);

        let closed = Variant::Boolean(true);
        let open = Variant::Boolean(false);

        assert!(!alarm.evaluate(&closed, &closed, now, &mut sink));
        assert!(!alarm.alarm().active());

        assert!(alarm.evaluate(&open, &closed, now, &mut sink));
        assert!(alarm.alarm().active());

        // Changing the normal side re-evaluates too: open is now normal
        assert!(alarm.evaluate(&open, &open, now, &mut sink));
        assert!(!alarm.alarm().active());
    }
}
