// src/two_state.rs - Boolean-backed state variable with transition bookkeeping
use crate::types::{DataValue, LocalizedText, QualifiedName};
use crate::value::Variant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A two-state (boolean-backed) state variable: EnabledState, AckedState,
/// ActiveState and friends. Carries the localized texts for both states,
/// the time of the last transition, and optional sub-state links (e.g.
/// AckedState is a true-sub-state of EnabledState).
///
/// Sub-state links are weak back-references used for counting/validation
/// only, never ownership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwoStateVariable {
    id: bool,
    transition_time: Option<DateTime<Utc>>,
    effective_transition_time: Option<DateTime<Utc>>,
    pub true_state: LocalizedText,
    pub false_state: LocalizedText,
    pub effective_display_name: Option<LocalizedText>,
    pub is_true_substate_of: Option<QualifiedName>,
    pub is_false_substate_of: Option<QualifiedName>,
}

impl TwoStateVariable {
    /// New variable, initially false, with the given state texts.
    pub fn new(true_state: impl Into<LocalizedText>, false_state: impl Into<LocalizedText>) -> Self {
        Self {
            id: false,
            transition_time: None,
            effective_transition_time: None,
            true_state: true_state.into(),
            false_state: false_state.into(),
            effective_display_name: None,
            is_true_substate_of: None,
            is_false_substate_of: None,
        }
    }

    /// Declare this variable a true-sub-state of `parent`.
    pub fn true_substate_of(mut self, parent: impl Into<String>) -> Self {
        self.is_true_substate_of = Some(QualifiedName::new(parent));
        self
    }

    /// Declare this variable a false-sub-state of `parent`.
    pub fn false_substate_of(mut self, parent: impl Into<String>) -> Self {
        self.is_false_substate_of = Some(QualifiedName::new(parent));
        self
    }

    /// Start out true instead of false.
    pub fn initially(mut self, id: bool) -> Self {
        self.id = id;
        self
    }

    /// Current boolean state.
    pub fn id(&self) -> bool {
        self.id
    }

    /// Set the state; transition timestamps update only on an actual change.
    pub fn set(&mut self, id: bool, now: DateTime<Utc>) {
        if self.id != id {
            self.id = id;
            self.transition_time = Some(now);
            self.effective_transition_time = Some(now);
        }
    }

    /// Time of the last transition, if one has occurred.
    pub fn transition_time(&self) -> Option<DateTime<Utc>> {
        self.transition_time
    }

    /// Effective transition time (tracks sub-state transitions too; without
    /// sub-states it equals the plain transition time).
    pub fn effective_transition_time(&self) -> Option<DateTime<Utc>> {
        self.effective_transition_time
    }

    /// Localized text for the current state.
    pub fn text(&self) -> &LocalizedText {
        if self.id {
            &self.true_state
        } else {
            &self.false_state
        }
    }

    /// The display text as a data value (the `"xxxState"` payload field).
    pub fn text_value(&self) -> DataValue {
        DataValue::new(Variant::LocalizedText(self.text().clone()))
    }

    /// The boolean id as a data value (the `"xxxState.id"` payload field).
    pub fn id_value(&self) -> DataValue {
        DataValue::new(Variant::Boolean(self.id))
    }
}
