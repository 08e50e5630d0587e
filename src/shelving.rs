// src/shelving.rs - Alarm shelving state machine with timed auto-unshelve
use crate::state_machine::FiniteStateMachine;
use crate::StatusCode;
use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// The three shelving states of an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShelvingState {
    /// Not shelved (initial)
    Unshelved,
    /// Shelved for a fixed duration; auto-reverts when the deadline passes
    TimedShelved,
    /// Shelved until explicitly unshelved
    OneShotShelved,
}

impl ShelvingState {
    /// Browse name of the state node.
    pub fn name(self) -> &'static str {
        match self {
            ShelvingState::Unshelved => "Unshelved",
            ShelvingState::TimedShelved => "TimedShelved",
            ShelvingState::OneShotShelved => "OneShotShelved",
        }
    }
}

/// Shelving machine: a [`FiniteStateMachine`] over
/// Unshelved/TimedShelved/OneShotShelved plus the timed-shelve deadline.
///
/// The auto-unshelve is a deadline, not a spawned task: the hosting engine
/// calls [`tick`](Self::tick) from its scan loop and the transition happens
/// interleaved with other mutations, never concurrently. Unshelving clears
/// the deadline, so a cancelled timer can never fire afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShelvingStateMachine {
    machine: FiniteStateMachine,
    state: ShelvingState,
    shelved_at: Option<DateTime<Utc>>,
    shelved_until: Option<DateTime<Utc>>,
    /// Upper bound on timed-shelve durations, in milliseconds, when set
    pub max_time_shelved: Option<f64>,
}

impl ShelvingStateMachine {
    /// New machine in the Unshelved state.
    pub fn new(max_time_shelved: Option<f64>, now: DateTime<Utc>) -> Self {
        let mut machine = FiniteStateMachine::new();
        // Well-known ShelvedStateMachineType state/transition ids
        let _ = machine.add_state("Unshelved", 2930);
        let _ = machine.add_state("TimedShelved", 2932);
        let _ = machine.add_state("OneShotShelved", 2933);
        let _ = machine.add_transition("Unshelved", "TimedShelved", 2935);
        let _ = machine.add_transition("Unshelved", "OneShotShelved", 2936);
        let _ = machine.add_transition("TimedShelved", "Unshelved", 2940);
        let _ = machine.add_transition("OneShotShelved", "Unshelved", 2943);
        machine.set_state("Unshelved", now);
        Self {
            machine,
            state: ShelvingState::Unshelved,
            shelved_at: None,
            shelved_until: None,
            max_time_shelved,
        }
    }

    /// Current shelving state.
    pub fn state(&self) -> ShelvingState {
        self.state
    }

    /// The underlying state machine (currentState read contract and all).
    pub fn machine(&self) -> &FiniteStateMachine {
        &self.machine
    }

    /// True in either shelved state.
    pub fn is_shelved(&self) -> bool {
        self.state != ShelvingState::Unshelved
    }

    /// Return to Unshelved. `BadConditionNotShelved` when already there.
    /// Cancels any pending timed-shelve deadline.
    pub fn unshelve(&mut self, now: DateTime<Utc>) -> StatusCode {
        if self.state == ShelvingState::Unshelved {
            return StatusCode::BadConditionNotShelved;
        }
        debug!("Unshelving (was {:?})", self.state);
        self.transition(ShelvingState::Unshelved, now);
        StatusCode::Good
    }

    /// Shelve for `duration_ms` milliseconds, arming the auto-unshelve
    /// deadline. Re-arming resets the countdown precisely. The duration must
    /// be a positive, finite number of milliseconds.
    pub fn timed_shelve(&mut self, duration_ms: f64, now: DateTime<Utc>) -> StatusCode {
        if self.state != ShelvingState::Unshelved {
            return StatusCode::BadConditionAlreadyShelved;
        }
        if !duration_ms.is_finite() || duration_ms <= 0.0 {
            warn!("Rejecting timed shelve of {} ms", duration_ms);
            return StatusCode::BadShelvingTimeOutOfRange;
        }
        if let Some(max) = self.max_time_shelved {
            if duration_ms > max {
                warn!(
                    "Rejecting timed shelve of {} ms (maxTimeShelved is {} ms)",
                    duration_ms, max
                );
                return StatusCode::BadShelvingTimeOutOfRange;
            }
        }
        self.transition(ShelvingState::TimedShelved, now);
        self.shelved_until = Some(now + Duration::milliseconds(duration_ms as i64));
        StatusCode::Good
    }

    /// Shelve until explicitly unshelved. `BadConditionAlreadyShelved` when
    /// already shelved, timed or one-shot.
    pub fn one_shot_shelve(&mut self, now: DateTime<Utc>) -> StatusCode {
        if self.state != ShelvingState::Unshelved {
            return StatusCode::BadConditionAlreadyShelved;
        }
        self.transition(ShelvingState::OneShotShelved, now);
        StatusCode::Good
    }

    /// Remaining time on the timed-shelve countdown, in milliseconds.
    /// Zero when not timed-shelved or already past the deadline.
    pub fn unshelve_time(&self, now: DateTime<Utc>) -> f64 {
        match self.shelved_until {
            Some(until) if self.state == ShelvingState::TimedShelved => {
                (until - now).num_milliseconds().max(0) as f64
            }
            _ => 0.0,
        }
    }

    /// Check the timed-shelve deadline; auto-unshelves when it has passed.
    /// Returns true when this call performed the transition.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        match self.shelved_until {
            Some(until) if self.state == ShelvingState::TimedShelved && now >= until => {
                debug!("Timed shelve expired, reverting to Unshelved");
                self.transition(ShelvingState::Unshelved, now);
                true
            }
            _ => false,
        }
    }

    fn transition(&mut self, to: ShelvingState, now: DateTime<Utc>) {
        self.state = to;
        self.machine.set_state(to.name(), now);
        match to {
            ShelvingState::Unshelved => {
                self.shelved_at = None;
                self.shelved_until = None;
            }
            _ => {
                self.shelved_at = Some(now);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_unshelve_when_unshelved_fails() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        assert_eq!(s.unshelve(at(1)), StatusCode::BadConditionNotShelved);
        assert_eq!(s.state(), ShelvingState::Unshelved);
    }

    #[test]
    fn test_double_timed_shelve_fails() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        assert_eq!(s.timed_shelve(1000.0, at(0)), StatusCode::Good);
        assert_eq!(s.timed_shelve(1000.0, at(10)), StatusCode::BadConditionAlreadyShelved);
        assert_eq!(s.state(), ShelvingState::TimedShelved);
    }

    #[test]
    fn test_one_shot_after_timed_fails() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        s.timed_shelve(1000.0, at(0));
        assert_eq!(s.one_shot_shelve(at(10)), StatusCode::BadConditionAlreadyShelved);
    }

    #[test]
    fn test_duration_over_max_rejected() {
        let mut s = ShelvingStateMachine::new(Some(500.0), at(0));
        assert_eq!(s.timed_shelve(501.0, at(0)), StatusCode::BadShelvingTimeOutOfRange);
        assert_eq!(s.state(), ShelvingState::Unshelved);
        assert_eq!(s.timed_shelve(500.0, at(0)), StatusCode::Good);
    }

    #[test]
    fn test_non_positive_or_nan_duration_rejected() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        for bad in [0.0, -100.0, f64::NAN, f64::INFINITY] {
            assert_eq!(s.timed_shelve(bad, at(0)), StatusCode::BadShelvingTimeOutOfRange);
            assert_eq!(s.state(), ShelvingState::Unshelved);
        }
        // A rejected shelve must not arm a deadline
        assert!(!s.tick(at(10_000)));
        assert_eq!(s.timed_shelve(1.0, at(0)), StatusCode::Good);
    }

    #[test]
    fn test_countdown_is_monotonic() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        s.timed_shelve(1500.0, at(0));
        assert_eq!(s.unshelve_time(at(0)), 1500.0);
        assert_eq!(s.unshelve_time(at(400)), 1100.0);
        assert_eq!(s.unshelve_time(at(1500)), 0.0);
        assert_eq!(s.unshelve_time(at(9999)), 0.0);
    }

    #[test]
    fn test_rearm_resets_countdown() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        s.timed_shelve(1000.0, at(0));
        assert_eq!(s.unshelve(at(300)), StatusCode::Good);
        s.timed_shelve(2000.0, at(300));
        assert_eq!(s.unshelve_time(at(800)), 1500.0);
    }

    #[test]
    fn test_tick_auto_unshelves_once() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        s.timed_shelve(1500.0, at(0));
        assert!(!s.tick(at(1499)));
        assert!(s.tick(at(1500)));
        assert_eq!(s.state(), ShelvingState::Unshelved);
        assert_eq!(s.machine().current_state_name(), Some("Unshelved"));
        assert!(!s.tick(at(2000)));
    }

    #[test]
    fn test_cancel_leaves_no_dangling_deadline() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        s.timed_shelve(1000.0, at(0));
        s.unshelve(at(100));
        // Ticking past the old deadline must not change anything
        assert!(!s.tick(at(5000)));
        assert_eq!(s.state(), ShelvingState::Unshelved);
    }

    #[test]
    fn test_one_shot_has_no_countdown() {
        let mut s = ShelvingStateMachine::new(None, at(0));
        s.one_shot_shelve(at(0));
        assert_eq!(s.unshelve_time(at(100)), 0.0);
        assert!(!s.tick(at(100_000)));
        assert_eq!(s.state(), ShelvingState::OneShotShelved);
    }
}
