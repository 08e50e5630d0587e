// src/acknowledgeable.rs - Acknowledge/Confirm semantics on top of ConditionBase
use crate::condition::ConditionBase;
use crate::events::EventSink;
use crate::snapshot::{ConditionIdentity, ConditionSnapshot};
use crate::types::{EventId, LocalizedText};
use crate::TwoStateVariable;
use crate::StatusCode;
use chrono::{DateTime, Utc};
use log::info;

/// Condition with AckedState and (optionally) ConfirmedState, both
/// true-sub-states of EnabledState, plus the Acknowledge/Confirm method
/// contracts.
///
/// Retain follows the (Active, Acked, Confirmed) truth table: it drops to
/// false only when the condition is inactive, acknowledged, and confirmed
/// (or has no ConfirmedState at all).
#[derive(Debug)]
pub struct AcknowledgeableCondition {
    base: ConditionBase,
}

impl AcknowledgeableCondition {
    /// Build with AckedState instantiated; `with_confirm` adds the optional
    /// ConfirmedState/Confirm pair. Both start true: a fresh condition has
    /// nothing outstanding.
    pub fn new(identity: ConditionIdentity, now: DateTime<Utc>, with_confirm: bool) -> Self {
        let mut snapshot = ConditionSnapshot::current(now);
        snapshot.acked_state = Some(
            TwoStateVariable::new("Acknowledged", "Unacknowledged")
                .true_substate_of("EnabledState")
                .initially(true),
        );
        if with_confirm {
            snapshot.confirmed_state = Some(
                TwoStateVariable::new("Confirmed", "Unconfirmed")
                    .true_substate_of("EnabledState")
                    .initially(true),
            );
        }
        Self { base: ConditionBase::new(identity, snapshot) }
    }

    /// Wrap an already prepared base (used by alarm subtypes that add more
    /// states to the snapshot first).
    pub fn from_base(base: ConditionBase) -> Self {
        Self { base }
    }

    pub fn base(&self) -> &ConditionBase {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut ConditionBase {
        &mut self.base
    }

    /// True when the selected branch needs no further acknowledgment.
    pub fn acked(&self) -> bool {
        self.base.current().acked()
    }

    pub fn confirmed(&self) -> bool {
        self.base.current().confirmed()
    }

    /// Acknowledge the branch selected by `event_id` (`None` for the
    /// current branch).
    ///
    /// Re-acknowledging an already acknowledged branch is an idempotent
    /// success, not an error. On a real transition AckedState goes true,
    /// ConfirmedState (when instantiated) is forced false to demand a
    /// subsequent Confirm, retain is recomputed, and the branch's event is
    /// re-raised as the acknowledgment notification.
    pub fn acknowledge(
        &mut self,
        event_id: Option<&EventId>,
        comment: Option<LocalizedText>,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) -> StatusCode {
        let Some(sel) = self.base.resolve_branch_index(event_id) else {
            return StatusCode::BadEventIdUnknown;
        };
        match sel {
            None => {
                if self.base.current().acked() {
                    return StatusCode::Good;
                }
                info!("Condition '{}' acknowledged", self.base.condition_name());
                let has_confirm = self.base.current().confirmed_state.is_some();
                let current = self.base.current_mut();
                current.set_acked(true, now);
                if has_confirm {
                    current.set_confirmed(false, now);
                }
                if let Some(comment) = comment {
                    current.set_comment(comment);
                }
                let retain = current.computed_retain();
                current.set_retain(retain);
                self.base
                    .raise_new_condition(Default::default(), now, sink);
            }
            Some(idx) => {
                let (settled, branch_id) = {
                    let has_confirm;
                    let branch = &mut self.base.branches_mut()[idx];
                    if branch.acked() {
                        return StatusCode::Good;
                    }
                    has_confirm = branch.confirmed_state.is_some();
                    branch.set_acked(true, now);
                    if has_confirm {
                        branch.set_confirmed(false, now);
                    }
                    if let Some(comment) = comment {
                        branch.set_comment(comment);
                    }
                    let retain = branch.computed_retain();
                    branch.set_retain(retain);
                    (!retain, branch.branch_id().clone())
                };
                info!(
                    "Condition '{}' branch {} acknowledged",
                    self.base.condition_name(),
                    branch_id
                );
                self.base.raise_branch_event(idx, now, sink);
                if settled {
                    self.base.delete_branch(&branch_id);
                }
            }
        }
        StatusCode::Good
    }

    /// Confirm the branch selected by `event_id`; symmetric to
    /// [`acknowledge`](Self::acknowledge). Branches whose retain drops to
    /// false are deleted after the confirmation event.
    pub fn confirm(
        &mut self,
        event_id: Option<&EventId>,
        comment: Option<LocalizedText>,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) -> StatusCode {
        if self.base.current().confirmed_state.is_none() {
            // Confirm was not instantiated on this condition
            return StatusCode::BadEventIdUnknown;
        }
        let Some(sel) = self.base.resolve_branch_index(event_id) else {
            return StatusCode::BadEventIdUnknown;
        };
        match sel {
            None => {
                if self.base.current().confirmed() {
                    return StatusCode::Good;
                }
                info!("Condition '{}' confirmed", self.base.condition_name());
                let current = self.base.current_mut();
                current.set_confirmed(true, now);
                if let Some(comment) = comment {
                    current.set_comment(comment);
                }
                let retain = current.computed_retain();
                current.set_retain(retain);
                self.base
                    .raise_new_condition(Default::default(), now, sink);
            }
            Some(idx) => {
                let (settled, branch_id) = {
                    let branch = &mut self.base.branches_mut()[idx];
                    if branch.confirmed() {
                        return StatusCode::Good;
                    }
                    branch.set_confirmed(true, now);
                    if let Some(comment) = comment {
                        branch.set_comment(comment);
                    }
                    let retain = branch.computed_retain();
                    branch.set_retain(retain);
                    (!retain, branch.branch_id().clone())
                };
                info!(
                    "Condition '{}' branch {} confirmed",
                    self.base.condition_name(),
                    branch_id
                );
                self.base.raise_branch_event(idx, now, sink);
                if settled {
                    self.base.delete_branch(&branch_id);
                }
            }
        }
        StatusCode::Good
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{event_type_ids, RecordingSink};
    use crate::types::NodeId;

    fn make(with_confirm: bool) -> AcknowledgeableCondition {
        let identity = ConditionIdentity {
            node_id: NodeId::from_name("AckCond"),
            event_type: event_type_ids::ACKNOWLEDGEABLE_CONDITION,
            source_node: NodeId::from_name("Pump1"),
            source_name: "Pump1".to_string(),
            condition_class_id: NodeId::Numeric(11163),
            condition_class_name: LocalizedText::new("ProcessConditionClass"),
            condition_name: "AckCond".to_string(),
        };
        AcknowledgeableCondition::new(identity, Utc::now(), with_confirm)
    }

    #[test]
    fn test_reacknowledge_is_idempotent_success() {
        let mut c = make(true);
        let mut sink = RecordingSink::new();
        let now = Utc::now();
        c.base_mut().enable(now, &mut sink);
        c.base_mut().current_mut().set_acked(false, now);
        assert_eq!(c.acknowledge(None, None, now, &mut sink), StatusCode::Good);
        assert!(c.acked());
        let events_before = sink.events.len();
        assert_eq!(c.acknowledge(None, None, now, &mut sink), StatusCode::Good);
        // No extra event for the no-op re-acknowledge
        assert_eq!(sink.events.len(), events_before);
    }

    #[test]
    fn test_acknowledge_forces_confirm_pending() {
        let mut c = make(true);
        let mut sink = RecordingSink::new();
        let now = Utc::now();
        c.base_mut().enable(now, &mut sink);
        c.base_mut().current_mut().set_acked(false, now);
        c.acknowledge(None, Some(LocalizedText::new("seen")), now, &mut sink);
        assert!(c.acked());
        assert!(!c.confirmed());
        assert_eq!(c.base().current().comment().text, "seen");
    }

    #[test]
    fn test_confirm_without_confirmed_state() {
        let mut c = make(false);
        let mut sink = RecordingSink::new();
        let now = Utc::now();
        c.base_mut().enable(now, &mut sink);
        assert_eq!(
            c.confirm(None, None, now, &mut sink),
            StatusCode::BadEventIdUnknown
        );
    }

    #[test]
    fn test_unknown_event_id() {
        let mut c = make(true);
        let mut sink = RecordingSink::new();
        let now = Utc::now();
        c.base_mut().enable(now, &mut sink);
        let bogus = EventId(vec![9, 9]);
        assert_eq!(
            c.acknowledge(Some(&bogus), None, now, &mut sink),
            StatusCode::BadEventIdUnknown
        );
    }
}
