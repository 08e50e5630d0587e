// src/condition.rs - ConditionBase: enable/disable, branches, event raising
use crate::events::{ConditionEvent, EventPayload, EventSink};
use crate::snapshot::{ConditionIdentity, ConditionSnapshot};
use crate::types::{EventId, LocalizedText, NodeId};
use crate::StatusCode;
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::HashMap;

/// Optional pieces a raised event may override; omitted fields keep the
/// condition's current value (quality defaults to Good).
#[derive(Debug, Clone, Default)]
pub struct ConditionInfo {
    pub message: Option<LocalizedText>,
    pub severity: Option<u16>,
    pub quality: Option<StatusCode>,
    pub retain: Option<bool>,
}

/// Which snapshot an event id selected.
enum BranchSel {
    Current,
    Detached(usize),
}

/// Base of every condition: the enable/disable state machine, the current
/// branch (live variables), detached branches, comment/severity/quality
/// bookkeeping, and the event-raising protocol.
///
/// Conditions start Disabled with nothing retained; `enable()` is the first
/// transition of a freshly provisioned condition.
#[derive(Debug)]
pub struct ConditionBase {
    identity: ConditionIdentity,
    current: ConditionSnapshot,
    branches: Vec<ConditionSnapshot>,
    last_event: Option<EventPayload>,
    branch_events: HashMap<NodeId, EventPayload>,
}

impl ConditionBase {
    /// Build a condition from prepared identity and live snapshot. The
    /// subtype constructors decide which optional states the snapshot
    /// instantiates before handing it over.
    pub fn new(identity: ConditionIdentity, current: ConditionSnapshot) -> Self {
        Self {
            identity,
            current,
            branches: Vec::new(),
            last_event: None,
            branch_events: HashMap::new(),
        }
    }

    pub fn identity(&self) -> &ConditionIdentity {
        &self.identity
    }

    pub fn node_id(&self) -> &NodeId {
        &self.identity.node_id
    }

    pub fn condition_name(&self) -> &str {
        &self.identity.condition_name
    }

    /// Live (current-branch) snapshot.
    pub fn current(&self) -> &ConditionSnapshot {
        &self.current
    }

    /// Mutable live snapshot. Writes go straight through to the condition's
    /// variables; this is the current-branch write-through contract.
    pub fn current_mut(&mut self) -> &mut ConditionSnapshot {
        &mut self.current
    }

    pub fn enabled(&self) -> bool {
        self.current.enabled()
    }

    /// Enable the condition and raise one event carrying its actual current
    /// values. `BadConditionAlreadyEnabled` when already enabled.
    ///
    /// Alarm subtypes re-evaluate their input right after this call and
    /// raise the catch-up event for any state that changed while disabled.
    pub fn enable(&mut self, now: DateTime<Utc>, sink: &mut dyn EventSink) -> StatusCode {
        if self.enabled() {
            return StatusCode::BadConditionAlreadyEnabled;
        }
        info!("Condition '{}' enabled", self.identity.condition_name);
        self.current.enabled_state.set(true, now);
        self.current.set_retain(self.current.computed_retain());
        self.raise_new_condition(ConditionInfo::default(), now, sink);
        StatusCode::Good
    }

    /// Disable the condition: EnabledState=false, retain forced false, and
    /// one event whose payload carries `BadConditionDisabled` for every
    /// field except identity/time/EnabledState.
    pub fn disable(&mut self, now: DateTime<Utc>, sink: &mut dyn EventSink) -> StatusCode {
        if !self.enabled() {
            return StatusCode::BadConditionAlreadyDisabled;
        }
        info!("Condition '{}' disabled", self.identity.condition_name);
        self.current.enabled_state.set(false, now);
        self.current.set_retain(false);
        self.current.renew_event_id();
        self.current.time = now;
        let payload = self.current.build_disabled_payload(&self.identity);
        self.last_event = Some(payload.clone());
        sink.emit(ConditionEvent { event_type: self.identity.event_type.clone(), payload });
        StatusCode::Good
    }

    /// Raise a new event on the current branch: fresh event id, updated
    /// message/severity/quality, one emission. Two calls always produce two
    /// distinct event ids, identical payloads or not.
    pub fn raise_new_condition(
        &mut self,
        info: ConditionInfo,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) {
        self.current.renew_event_id();
        self.current.time = now;
        if let Some(message) = info.message {
            self.current.set_message(message);
        }
        if let Some(severity) = info.severity {
            self.current.set_severity(severity);
        }
        self.current.set_quality(info.quality.unwrap_or(StatusCode::Good));
        if let Some(retain) = info.retain {
            self.current.set_retain(retain);
        }
        let payload = self.current.build_event_payload(&self.identity);
        debug!(
            "Condition '{}' raising event {} (severity {})",
            self.identity.condition_name,
            self.current.event_id(),
            self.current.severity()
        );
        self.last_event = Some(payload.clone());
        sink.emit(ConditionEvent { event_type: self.identity.event_type.clone(), payload });
    }

    /// Raise an event on the detached branch at `index`, with a fresh event
    /// id for that branch.
    pub fn raise_branch_event(
        &mut self,
        index: usize,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) {
        let identity = self.identity.clone();
        if let Some(branch) = self.branches.get_mut(index) {
            branch.renew_event_id();
            branch.time = now;
            let payload = branch.build_event_payload(&identity);
            self.branch_events.insert(branch.branch_id().clone(), payload.clone());
            sink.emit(ConditionEvent { event_type: identity.event_type, payload });
        }
    }

    /// Snapshot the current branch into a new detached branch and return its
    /// (fresh, non-null) branch id.
    pub fn create_branch(&mut self) -> NodeId {
        let branch = self.current.create_branch();
        let id = branch.branch_id().clone();
        debug!(
            "Condition '{}' created branch {}",
            self.identity.condition_name, id
        );
        self.branches.push(branch);
        id
    }

    pub fn branch_count(&self) -> usize {
        self.branches.len()
    }

    pub fn branches(&self) -> &[ConditionSnapshot] {
        &self.branches
    }

    pub fn branch(&self, branch_id: &NodeId) -> Option<&ConditionSnapshot> {
        self.branches.iter().find(|b| b.branch_id() == branch_id)
    }

    pub fn branch_mut(&mut self, branch_id: &NodeId) -> Option<&mut ConditionSnapshot> {
        self.branches.iter_mut().find(|b| b.branch_id() == branch_id)
    }

    pub(crate) fn branches_mut(&mut self) -> &mut Vec<ConditionSnapshot> {
        &mut self.branches
    }

    /// Delete a detached branch and its stored last event.
    pub fn delete_branch(&mut self, branch_id: &NodeId) -> bool {
        let before = self.branches.len();
        self.branches.retain(|b| b.branch_id() != branch_id);
        self.branch_events.remove(branch_id);
        self.branches.len() != before
    }

    /// Drop every detached branch whose retain has fallen to false.
    pub fn prune_branches(&mut self) {
        let dead: Vec<NodeId> = self
            .branches
            .iter()
            .filter(|b| !b.retain())
            .map(|b| b.branch_id().clone())
            .collect();
        for id in dead {
            debug!(
                "Condition '{}' dropping settled branch {}",
                self.identity.condition_name, id
            );
            self.delete_branch(&id);
        }
    }

    /// Mutate the comment of the branch whose last event id matches
    /// (`None` selects the current branch). `BadEventIdUnknown` on miss.
    pub fn add_comment(
        &mut self,
        event_id: Option<&EventId>,
        comment: LocalizedText,
        now: DateTime<Utc>,
        sink: &mut dyn EventSink,
    ) -> StatusCode {
        match self.locate_branch(event_id) {
            Some(BranchSel::Current) => {
                self.current.set_comment(comment);
                self.raise_new_condition(ConditionInfo::default(), now, sink);
                StatusCode::Good
            }
            Some(BranchSel::Detached(idx)) => {
                self.branches[idx].set_comment(comment);
                self.raise_branch_event(idx, now, sink);
                StatusCode::Good
            }
            None => StatusCode::BadEventIdUnknown,
        }
    }

    /// True when this condition must be reported: its current branch or any
    /// detached branch still has retain set.
    pub fn retained(&self) -> bool {
        self.current.retain() || self.branches.iter().any(|b| b.retain())
    }

    /// Events `ConditionRefresh` re-emits for this condition: the current
    /// branch's last event (when retained) followed by each retained
    /// branch's last event, in branch-creation order.
    pub fn refresh_events(&self) -> Vec<EventPayload> {
        let mut out = Vec::new();
        if self.current.retain() {
            if let Some(e) = &self.last_event {
                out.push(e.clone());
            }
        }
        for branch in &self.branches {
            if branch.retain() {
                if let Some(e) = self.branch_events.get(branch.branch_id()) {
                    out.push(e.clone());
                }
            }
        }
        out
    }

    /// Last event raised on the current branch, if any.
    pub fn last_event(&self) -> Option<&EventPayload> {
        self.last_event.as_ref()
    }

    fn locate_branch(&self, event_id: Option<&EventId>) -> Option<BranchSel> {
        match event_id {
            None => Some(BranchSel::Current),
            Some(id) if id.as_bytes().is_empty() => Some(BranchSel::Current),
            Some(id) => {
                if self.current.event_id() == id {
                    return Some(BranchSel::Current);
                }
                self.branches
                    .iter()
                    .position(|b| b.event_id() == id)
                    .map(BranchSel::Detached)
            }
        }
    }

    /// Internal selector used by acknowledge/confirm: resolves an event id
    /// to the current branch (`None`) or a detached branch index.
    pub(crate) fn resolve_branch_index(&self, event_id: Option<&EventId>) -> Option<Option<usize>> {
        match self.locate_branch(event_id)? {
            BranchSel::Current => Some(None),
            BranchSel::Detached(i) => Some(Some(i)),
        }
    }
}
