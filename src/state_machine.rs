// src/state_machine.rs - Generic finite state machine over named states
use crate::error::{Result, SentraError};
use crate::types::{DataValue, LocalizedText};
use crate::value::Variant;
use crate::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state of a [`FiniteStateMachine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    /// Browse name; lookups are exact and case-sensitive
    pub name: String,
    /// Numeric state id (well-known node id in the standard's namespace)
    pub state_number: u32,
}

/// Directed transition between two states, identified by a numeric id.
/// The `(from, to)` pair is unique within a machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub to: String,
    pub id: u32,
}

/// Generic state container: ordered states, directed transitions, and a
/// current-state pointer that may be unset ("not active").
///
/// Reading the current state while unset yields a value whose status is
/// `BadStateNotActive`, not a Good null.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FiniteStateMachine {
    states: Vec<State>,
    transitions: Vec<Transition>,
    current: Option<usize>,
    last_transition_time: Option<DateTime<Utc>>,
}

impl FiniteStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state. Duplicate names are a configuration error.
    pub fn add_state(&mut self, name: impl Into<String>, state_number: u32) -> Result<()> {
        let name = name.into();
        if self.states.iter().any(|s| s.name == name) {
            return Err(SentraError::Config(format!("duplicate state '{}'", name)));
        }
        self.states.push(State { name, state_number });
        Ok(())
    }

    /// Register a transition. The `(from, to)` pair must be unique and both
    /// endpoints must already be registered states.
    pub fn add_transition(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        id: u32,
    ) -> Result<()> {
        let (from, to) = (from.into(), to.into());
        for endpoint in [&from, &to] {
            if self.state_by_name(endpoint).is_none() {
                return Err(SentraError::Config(format!("unknown state '{}'", endpoint)));
            }
        }
        if self.transitions.iter().any(|t| t.from == from && t.to == to) {
            return Err(SentraError::Config(format!(
                "duplicate transition '{}' -> '{}'",
                from, to
            )));
        }
        self.transitions.push(Transition { from, to, id });
        Ok(())
    }

    /// Exact-name state lookup; `None` on miss (absence is the caller's call).
    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    /// Transition lookup by `(from, to)` pair; `None` on miss.
    pub fn find_transition(&self, from: &str, to: &str) -> Option<&Transition> {
        self.transitions.iter().find(|t| t.from == from && t.to == to)
    }

    /// Point the machine at `state`. Fails silently when the name is not a
    /// registered state; the current state is then left untouched.
    pub fn set_state(&mut self, state: &str, now: DateTime<Utc>) {
        if let Some(idx) = self.states.iter().position(|s| s.name == state) {
            self.current = Some(idx);
            self.last_transition_time = Some(now);
        }
    }

    /// Clear the current state ("not active").
    pub fn clear_state(&mut self, now: DateTime<Utc>) {
        self.current = None;
        self.last_transition_time = Some(now);
    }

    /// Name of the current state, if set.
    pub fn current_state_name(&self) -> Option<&str> {
        self.current.map(|i| self.states[i].name.as_str())
    }

    /// Current state as a readable data value: the state's text with Good
    /// status, or a `BadStateNotActive` placeholder while unset.
    pub fn current_state_value(&self) -> DataValue {
        match self.current {
            Some(i) => DataValue::new(Variant::LocalizedText(LocalizedText::new(
                self.states[i].name.clone(),
            ))),
            None => DataValue::with_status(StatusCode::BadStateNotActive),
        }
    }

    /// Time of the last `set_state`/`clear_state`.
    pub fn last_transition_time(&self) -> Option<DateTime<Utc>> {
        self.last_transition_time
    }

    /// Registered states in registration order.
    pub fn states(&self) -> &[State] {
        &self.states
    }

    /// Registered transitions in registration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}
