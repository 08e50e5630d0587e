// src/snapshot.rs - Condition snapshots ("branches") and event payload construction
use crate::events::EventPayload;
use crate::types::{DataValue, EventId, LocalizedText, NodeId};
use crate::value::Variant;
use crate::TwoStateVariable;
use crate::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity fields shared by every event a condition raises; owned by the
/// condition, passed into payload construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionIdentity {
    pub node_id: NodeId,
    pub event_type: NodeId,
    pub source_node: NodeId,
    pub source_name: String,
    pub condition_class_id: NodeId,
    pub condition_class_name: LocalizedText,
    pub condition_name: String,
}

/// A named bag of condition variable values: either the live view of the
/// condition (the current branch, `branch_id == Null`) or a detached copy
/// created by [`create_branch`](Self::create_branch) to preserve a
/// historical alarm state pending acknowledgment.
///
/// Writes to the current branch are the condition's live variables; writes
/// to a detached branch touch only that branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionSnapshot {
    branch_id: NodeId,
    event_id: EventId,
    pub time: DateTime<Utc>,
    pub enabled_state: TwoStateVariable,
    pub acked_state: Option<TwoStateVariable>,
    pub confirmed_state: Option<TwoStateVariable>,
    pub active_state: Option<TwoStateVariable>,
    pub suppressed_state: Option<TwoStateVariable>,
    retain: bool,
    severity: u16,
    last_severity: u16,
    quality: StatusCode,
    comment: LocalizedText,
    message: LocalizedText,
}

impl ConditionSnapshot {
    /// The live (current-branch) snapshot of a freshly built condition.
    pub fn current(now: DateTime<Utc>) -> Self {
        Self {
            branch_id: NodeId::null(),
            event_id: EventId::generate(),
            time: now,
            enabled_state: TwoStateVariable::new("Enabled", "Disabled"),
            acked_state: None,
            confirmed_state: None,
            active_state: None,
            suppressed_state: None,
            retain: false,
            severity: 0,
            last_severity: 0,
            quality: StatusCode::Good,
            comment: LocalizedText::default(),
            message: LocalizedText::default(),
        }
    }

    /// Detach a copy of this snapshot under a fresh, non-null branch id.
    /// Mutations on the copy and the original are fully independent.
    pub fn create_branch(&self) -> Self {
        let mut branch = self.clone();
        branch.branch_id = NodeId::new_guid();
        branch.event_id = EventId::generate();
        branch
    }

    /// Branch id; null for the current branch.
    pub fn branch_id(&self) -> &NodeId {
        &self.branch_id
    }

    /// True iff this is the live (null-id) branch.
    pub fn is_current_branch(&self) -> bool {
        self.branch_id.is_null()
    }

    /// Event id of the last event raised on this branch.
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    /// Assign a fresh event id; every raised event gets its own.
    pub fn renew_event_id(&mut self) -> &EventId {
        self.event_id = EventId::generate();
        &self.event_id
    }

    pub fn retain(&self) -> bool {
        self.retain
    }

    pub fn set_retain(&mut self, retain: bool) {
        self.retain = retain;
    }

    pub fn severity(&self) -> u16 {
        self.severity
    }

    pub fn last_severity(&self) -> u16 {
        self.last_severity
    }

    /// Set the severity, archiving the prior value into `lastSeverity` first.
    pub fn set_severity(&mut self, severity: u16) {
        self.last_severity = self.severity;
        self.severity = severity;
    }

    pub fn quality(&self) -> StatusCode {
        self.quality
    }

    pub fn set_quality(&mut self, quality: StatusCode) {
        self.quality = quality;
    }

    pub fn comment(&self) -> &LocalizedText {
        &self.comment
    }

    pub fn set_comment(&mut self, comment: LocalizedText) {
        self.comment = comment;
    }

    pub fn message(&self) -> &LocalizedText {
        &self.message
    }

    pub fn set_message(&mut self, message: LocalizedText) {
        self.message = message;
    }

    /// Boolean of EnabledState.
    pub fn enabled(&self) -> bool {
        self.enabled_state.id()
    }

    /// Boolean of AckedState; true when the state is not instantiated
    /// (nothing to acknowledge).
    pub fn acked(&self) -> bool {
        self.acked_state.as_ref().map(|s| s.id()).unwrap_or(true)
    }

    /// Boolean of ConfirmedState; true when not instantiated.
    pub fn confirmed(&self) -> bool {
        self.confirmed_state.as_ref().map(|s| s.id()).unwrap_or(true)
    }

    /// Boolean of ActiveState; false when not instantiated.
    pub fn active(&self) -> bool {
        self.active_state.as_ref().map(|s| s.id()).unwrap_or(false)
    }

    pub fn set_acked(&mut self, acked: bool, now: DateTime<Utc>) {
        if let Some(state) = self.acked_state.as_mut() {
            state.set(acked, now);
        }
    }

    pub fn set_confirmed(&mut self, confirmed: bool, now: DateTime<Utc>) {
        if let Some(state) = self.confirmed_state.as_mut() {
            state.set(confirmed, now);
        }
    }

    pub fn set_active(&mut self, active: bool, now: DateTime<Utc>) {
        if let Some(state) = self.active_state.as_mut() {
            state.set(active, now);
        }
    }

    pub fn set_suppressed(&mut self, suppressed: bool, now: DateTime<Utc>) {
        if let Some(state) = self.suppressed_state.as_mut() {
            state.set(suppressed, now);
        }
    }

    /// The retain value the OPC-UA truth table dictates for this snapshot:
    /// retained while active, unacknowledged, or awaiting confirmation.
    pub fn computed_retain(&self) -> bool {
        self.active() || !self.acked() || (self.confirmed_state.is_some() && !self.confirmed())
    }

    /// Flat field map for event-filter extraction, in wire order.
    ///
    /// Includes every property instantiated on the condition; optional
    /// states that were never instantiated appear as a `Null` variant with
    /// Good status (the documented not-yet-set sentinel).
    pub fn build_event_payload(&self, identity: &ConditionIdentity) -> EventPayload {
        let mut p = EventPayload::new();
        p.set(
            "eventId",
            DataValue::new(Variant::ByteString(self.event_id.as_bytes().to_vec())),
        );
        p.set("eventType", DataValue::new(Variant::NodeId(identity.event_type.clone())));
        p.set("sourceNode", DataValue::new(Variant::NodeId(identity.source_node.clone())));
        p.set("sourceName", DataValue::new(Variant::String(identity.source_name.clone())));
        p.set("time", DataValue::new(Variant::DateTime(self.time)));
        p.set("message", DataValue::new(Variant::LocalizedText(self.message.clone())));
        p.set("severity", DataValue::new(Variant::UInt16(self.severity)));
        p.set("branchId", DataValue::new(Variant::NodeId(self.branch_id.clone())));
        p.set(
            "conditionClassId",
            DataValue::new(Variant::NodeId(identity.condition_class_id.clone())),
        );
        p.set(
            "conditionClassName",
            DataValue::new(Variant::LocalizedText(identity.condition_class_name.clone())),
        );
        p.set(
            "conditionName",
            DataValue::new(Variant::String(identity.condition_name.clone())),
        );
        p.set("enabledState", self.enabled_state.text_value());
        p.set("enabledState.id", self.enabled_state.id_value());
        p.set("quality", DataValue::new(Variant::StatusCode(self.quality)));
        p.set("lastSeverity", DataValue::new(Variant::UInt16(self.last_severity)));
        p.set("comment", DataValue::new(Variant::LocalizedText(self.comment.clone())));
        p.set("retain", DataValue::new(Variant::Boolean(self.retain)));
        Self::set_two_state(&mut p, "ackedState", self.acked_state.as_ref());
        Self::set_two_state(&mut p, "confirmedState", self.confirmed_state.as_ref());
        Self::set_two_state(&mut p, "activeState", self.active_state.as_ref());
        Self::set_two_state(&mut p, "suppressedState", self.suppressed_state.as_ref());
        p
    }

    /// Payload for a disabled condition: only identity, time, and
    /// EnabledState carry real values; everything else reads
    /// `BadConditionDisabled`.
    pub fn build_disabled_payload(&self, identity: &ConditionIdentity) -> EventPayload {
        let full = self.build_event_payload(identity);
        let keep = [
            "eventId",
            "eventType",
            "sourceNode",
            "sourceName",
            "time",
            "enabledState",
            "enabledState.id",
        ];
        let mut masked = EventPayload::new();
        for (key, value) in full.iter() {
            if keep.contains(&key) {
                masked.set(key, value.clone());
            } else {
                masked.set(key, DataValue::with_status(StatusCode::BadConditionDisabled));
            }
        }
        masked
    }

    fn set_two_state(p: &mut EventPayload, key: &str, state: Option<&TwoStateVariable>) {
        match state {
            Some(s) => {
                p.set(key, s.text_value());
                p.set(format!("{}.id", key), s.id_value());
            }
            None => {
                // Not instantiated on this condition type
                p.set(key, DataValue::new(Variant::Null));
                p.set(format!("{}.id", key), DataValue::new(Variant::Null));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ConditionIdentity {
        ConditionIdentity {
            node_id: NodeId::from_name("TestCondition"),
            event_type: crate::events::event_type_ids::CONDITION,
            source_node: NodeId::from_name("Tank1"),
            source_name: "Tank1".to_string(),
            condition_class_id: NodeId::Numeric(11163),
            condition_class_name: LocalizedText::new("ProcessConditionClass"),
            condition_name: "TestCondition".to_string(),
        }
    }

    #[test]
    fn test_setting_severity_should_record_last_severity() {
        let mut snap = ConditionSnapshot::current(Utc::now());
        snap.set_severity(100);
        snap.set_severity(200);
        assert_eq!(snap.last_severity(), 100);
        assert_eq!(snap.severity(), 200);
    }

    #[test]
    fn test_branch_isolation() {
        let now = Utc::now();
        let mut current = ConditionSnapshot::current(now);
        current.acked_state = Some(TwoStateVariable::new("Acknowledged", "Unacknowledged"));
        current.set_severity(500);

        let mut branch = current.create_branch();
        assert!(!branch.is_current_branch());
        assert!(current.is_current_branch());
        assert_ne!(branch.branch_id(), current.branch_id());

        branch.set_severity(999);
        branch.set_acked(true, now);
        branch.set_comment(LocalizedText::new("branch only"));

        assert_eq!(current.severity(), 500);
        assert!(!current.acked_state.as_ref().unwrap().id());
        assert_eq!(current.comment().text, "");

        current.set_severity(1);
        assert_eq!(branch.severity(), 999);
    }

    #[test]
    fn test_branch_ids_are_unique() {
        let current = ConditionSnapshot::current(Utc::now());
        let a = current.create_branch();
        let b = current.create_branch();
        assert_ne!(a.branch_id(), b.branch_id());
        assert!(!a.branch_id().is_null());
    }

    #[test]
    fn test_payload_contains_instantiated_fields() {
        let mut snap = ConditionSnapshot::current(Utc::now());
        snap.active_state = Some(TwoStateVariable::new("Active", "Inactive"));
        let p = snap.build_event_payload(&identity());
        assert_eq!(p.get("activeState.id").unwrap().value, Variant::Boolean(false));
        // AckedState never instantiated: sentinel Null with Good status
        let acked = p.get("ackedState.id").unwrap();
        assert!(acked.value.is_null());
        assert_eq!(acked.status, StatusCode::Good);
    }

    #[test]
    fn test_disabled_payload_masks_everything_but_identity() {
        let snap = ConditionSnapshot::current(Utc::now());
        let p = snap.build_disabled_payload(&identity());
        assert_eq!(p.get("severity").unwrap().status, StatusCode::BadConditionDisabled);
        assert_eq!(p.get("retain").unwrap().status, StatusCode::BadConditionDisabled);
        assert_eq!(p.get("eventId").unwrap().status, StatusCode::Good);
        assert_eq!(p.get("enabledState.id").unwrap().status, StatusCode::Good);
    }

    #[test]
    fn test_computed_retain_truth_table() {
        let now = Utc::now();
        let mut s = ConditionSnapshot::current(now);
        s.acked_state = Some(TwoStateVariable::new("Acknowledged", "Unacknowledged").initially(true));
        s.confirmed_state = Some(TwoStateVariable::new("Confirmed", "Unconfirmed").initially(true));
        s.active_state = Some(TwoStateVariable::new("Active", "Inactive"));

        // (Active, Acked, Confirmed) -> retain
        assert!(!s.computed_retain()); // (f, t, t)
        s.set_active(true, now);
        assert!(s.computed_retain()); // (t, t, t)
        s.set_acked(false, now);
        assert!(s.computed_retain()); // (t, f, t)
        s.set_active(false, now);
        assert!(s.computed_retain()); // (f, f, t)
        s.set_acked(true, now);
        s.set_confirmed(false, now);
        assert!(s.computed_retain()); // (f, t, f)
        s.set_confirmed(true, now);
        assert!(!s.computed_retain()); // (f, t, t)
    }
}
