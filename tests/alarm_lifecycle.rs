// Full-lifecycle tests driving the alarm engine the way a session would:
// configuration, value writes, method calls, and event subscription.
use sentra::*;
use chrono::{Duration as ChronoDuration, Utc};
use std::cell::RefCell;
use std::rc::Rc;

const CONFIG: &str = r#"
signals:
  - name: tank_level
    type: float
    initial: 50.0
  - name: flow_rate
    type: float
    initial: 10.0
  - name: flow_setpoint
    type: float
    initial: 10.0
  - name: valve_state
    type: bool
  - name: valve_normal
    type: bool
  - name: pressure
    type: float
    initial: 10.0
  - name: pressure_setpoint
    type: float
    initial: 10.0

alarms:
  - name: TankLevelAlarm
    kind: exclusive_limit
    source: Tank1
    input: tank_level
    limits:
      low_low: 5.0
      low: 20.0
      high: 80.0
      high_high: 95.0
    severity: 500
    confirm: true
    max_time_shelved: 60000.0
  - name: FlowDeviation
    kind: non_exclusive_deviation
    source: FlowLoop1
    input: flow_rate
    setpoint: flow_setpoint
    limits:
      low: -5.0
      high: 5.0
  - name: ValveFault
    kind: off_normal
    source: Valve1
    input: valve_state
    normal_state: valve_normal
  - name: PressureDeviation
    kind: exclusive_deviation
    source: PressureLoop1
    input: pressure
    setpoint: pressure_setpoint
    limits:
      low: -5.0
      high: 5.0
      high_high: 15.0
"#;

fn build_engine() -> AlarmEngine {
    let config = Config::from_yaml(CONFIG).unwrap();
    AlarmEngine::from_config(&config).unwrap()
}

fn capture_events(engine: &mut AlarmEngine) -> Rc<RefCell<Vec<ConditionEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    engine.subscribe_events(move |event| sink.borrow_mut().push(event.clone()));
    events
}

fn field_text(event: &ConditionEvent, key: &str) -> String {
    event.payload.get(key).map(|v| v.value.to_string()).unwrap_or_default()
}

#[test]
fn test_exclusive_limit_band_walkthrough() {
    let mut engine = build_engine();
    let events = capture_events(&mut engine);
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();

    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
    {
        let node = engine.condition(&alarm).unwrap();
        assert!(node.base().current().active());
        assert_eq!(node.as_exclusive_limit().unwrap().limit_state_name(), Some("High"));
    }
    assert_eq!(events.borrow().len(), 1);
    assert_eq!(
        field_text(&events.borrow()[0], "message"),
        "Condition value is 85 and state is High"
    );

    // Crossing into HighHigh is a new state, one more event
    engine.write_signal("tank_level", Variant::Double(96.0)).unwrap();
    assert_eq!(
        engine
            .condition(&alarm)
            .unwrap()
            .as_exclusive_limit()
            .unwrap()
            .limit_state_name(),
        Some("HighHigh")
    );
    assert_eq!(events.borrow().len(), 2);

    // Same band again: de-duplicated, no event
    engine.write_signal("tank_level", Variant::Double(97.0)).unwrap();
    assert_eq!(events.borrow().len(), 2);

    engine.write_signal("tank_level", Variant::Double(50.0)).unwrap();
    let node = engine.condition(&alarm).unwrap();
    assert!(!node.base().current().active());
    assert_eq!(node.as_exclusive_limit().unwrap().limit_state_name(), None);
}

#[test]
fn test_unacknowledged_excursions_accumulate_branches() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();

    for _ in 0..2 {
        engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
        engine.write_signal("tank_level", Variant::Double(50.0)).unwrap();
    }

    let node = engine.condition(&alarm).unwrap();
    assert_eq!(node.base().branch_count(), 2);
    for branch in node.base().branches() {
        assert!(branch.active());
        assert!(!branch.acked());
        assert!(branch.retain());
    }
    // The current branch settled back to normal but the condition stays
    // reported through its branches
    assert!(!node.base().current().active());
    assert!(node.base().retained());

    let summaries = engine.retained_summaries();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].branch_count, 2);
}

#[test]
fn test_acknowledge_confirm_cycle() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();

    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
    let states = |engine: &AlarmEngine| {
        let c = engine.condition(&alarm).unwrap().base().current().clone();
        (c.active(), c.acked(), c.confirmed(), c.retain())
    };
    assert_eq!(states(&engine), (true, false, true, true));

    assert_eq!(
        engine.acknowledge(&alarm, None, Some(LocalizedText::new("operator ack"))),
        StatusCode::Good
    );
    assert_eq!(states(&engine), (true, true, false, true));

    engine.write_signal("tank_level", Variant::Double(50.0)).unwrap();
    // Acknowledged before the return to normal: no branch
    assert_eq!(engine.condition(&alarm).unwrap().base().branch_count(), 0);
    assert_eq!(states(&engine), (false, true, false, true));

    assert_eq!(engine.confirm(&alarm, None, None), StatusCode::Good);
    assert_eq!(states(&engine), (false, true, true, false));
    assert!(engine.retained_summaries().is_empty());
}

#[test]
fn test_branch_acknowledge_by_event_id() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();

    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
    engine.write_signal("tank_level", Variant::Double(50.0)).unwrap();

    let branch_event_id = engine.condition(&alarm).unwrap().base().branches()[0]
        .event_id()
        .clone();
    assert_eq!(
        engine.acknowledge(&alarm, Some(&branch_event_id), None),
        StatusCode::Good
    );
    // Acknowledged branch still awaits Confirm, so it survives
    let node = engine.condition(&alarm).unwrap();
    assert_eq!(node.base().branch_count(), 1);
    assert!(node.base().branches()[0].acked());
    assert!(!node.base().branches()[0].confirmed());

    let confirm_event_id = node.base().branches()[0].event_id().clone();
    assert_eq!(engine.confirm(&alarm, Some(&confirm_event_id), None), StatusCode::Good);
    // Fully settled branches are deleted
    assert_eq!(engine.condition(&alarm).unwrap().base().branch_count(), 0);

    let stale = EventId(vec![0xde, 0xad]);
    assert_eq!(
        engine.acknowledge(&alarm, Some(&stale), None),
        StatusCode::BadEventIdUnknown
    );
}

#[test]
fn test_non_exclusive_deviation_overlap() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("FlowDeviation").unwrap();
    let events = capture_events(&mut engine);

    // deviation = flow - setpoint = 17 - 10 = 7 >= high
    engine.write_signal("flow_rate", Variant::Double(17.0)).unwrap();
    let flags = engine
        .condition(&alarm)
        .unwrap()
        .as_non_exclusive_limit()
        .unwrap()
        .flags();
    assert!(flags.high && !flags.low);
    assert_eq!(events.borrow().len(), 1);

    // Changing the setpoint re-evaluates the deviation: 17 - 25 = -8 <= low
    engine.write_signal("flow_setpoint", Variant::Double(25.0)).unwrap();
    let flags = engine
        .condition(&alarm)
        .unwrap()
        .as_non_exclusive_limit()
        .unwrap()
        .flags();
    assert!(flags.low && !flags.high);

    engine.write_signal("flow_setpoint", Variant::Double(17.0)).unwrap();
    assert!(!engine.condition(&alarm).unwrap().base().current().active());
}

#[test]
fn test_set_limit_reevaluates_immediately() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();
    engine.write_signal("tank_level", Variant::Double(75.0)).unwrap();
    assert!(!engine.condition(&alarm).unwrap().base().current().active());

    let events = capture_events(&mut engine);
    // Lowering the high limit below the current input activates the alarm
    // without a new write
    engine.set_limit(&alarm, LimitStateName::High, 70.0).unwrap();
    {
        let node = engine.condition(&alarm).unwrap();
        assert!(node.base().current().active());
        assert_eq!(node.as_exclusive_limit().unwrap().limit_state_name(), Some("High"));
    }
    assert_eq!(events.borrow().len(), 1);

    // Raising it back above the input returns to normal, branching the
    // still-unacknowledged excursion
    engine.set_limit(&alarm, LimitStateName::High, 90.0).unwrap();
    let node = engine.condition(&alarm).unwrap();
    assert!(!node.base().current().active());
    assert_eq!(node.base().branch_count(), 1);

    // Non-limit conditions reject limit changes
    let valve = engine.find_condition("ValveFault").unwrap();
    assert!(engine.set_limit(&valve, LimitStateName::High, 1.0).is_err());
}

#[test]
fn test_exclusive_deviation_follows_setpoint() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("PressureDeviation").unwrap();
    let band = |engine: &AlarmEngine| {
        engine
            .condition(&alarm)
            .unwrap()
            .as_exclusive_limit()
            .unwrap()
            .limit_state_name()
            .map(str::to_string)
    };

    // deviation = 16 - 10 = 6, inside the High band
    engine.write_signal("pressure", Variant::Double(16.0)).unwrap();
    assert_eq!(band(&engine), Some("High".to_string()));

    // A setpoint change alone re-triggers: 16 - 0 = 16 crosses HighHigh
    engine.write_signal("pressure_setpoint", Variant::Double(0.0)).unwrap();
    assert_eq!(band(&engine), Some("HighHigh".to_string()));

    // Matching the setpoint to the input clears the deviation
    engine.write_signal("pressure_setpoint", Variant::Double(16.0)).unwrap();
    assert_eq!(band(&engine), None);
    assert!(!engine.condition(&alarm).unwrap().base().current().active());
}

#[test]
fn test_suppressed_or_shelved_mirrored_to_variable() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();
    let var = engine
        .address_space()
        .find_variable("TankLevelAlarm.SuppressedOrShelved")
        .unwrap();
    assert_eq!(engine.address_space().get_value(&var), Some(&Variant::Boolean(false)));

    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = changes.clone();
    engine.subscribe_value_changes(move |node, value| {
        sink.borrow_mut().push((node.clone(), value.value.clone()));
    });

    assert_eq!(engine.set_suppressed(&alarm, true), StatusCode::Good);
    assert_eq!(engine.address_space().get_value(&var), Some(&Variant::Boolean(true)));
    assert!(changes.borrow().iter().any(|(n, v)| n == &var && v == &Variant::Boolean(true)));

    assert_eq!(engine.set_suppressed(&alarm, false), StatusCode::Good);
    assert_eq!(engine.address_space().get_value(&var), Some(&Variant::Boolean(false)));

    // Shelving drives the same derived variable
    assert_eq!(engine.one_shot_shelve(&alarm), StatusCode::Good);
    assert_eq!(engine.address_space().get_value(&var), Some(&Variant::Boolean(true)));
    engine.unshelve(&alarm);
    assert_eq!(engine.address_space().get_value(&var), Some(&Variant::Boolean(false)));

    let bogus = NodeId::from_name("nope");
    assert_eq!(engine.set_suppressed(&bogus, true), StatusCode::BadNodeIdUnknown);
}

#[test]
fn test_off_normal_follows_either_node() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("ValveFault").unwrap();

    engine.write_signal("valve_state", Variant::Boolean(true)).unwrap();
    assert!(engine.condition(&alarm).unwrap().base().current().active());

    // Declaring the current value normal clears the alarm
    engine.write_signal("valve_normal", Variant::Boolean(true)).unwrap();
    assert!(!engine.condition(&alarm).unwrap().base().current().active());
}

#[test]
fn test_shelving_roundtrip_with_expiry() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();

    let changes = Rc::new(RefCell::new(Vec::new()));
    let sink = changes.clone();
    engine.subscribe_value_changes(move |node, value| {
        sink.borrow_mut().push((node.clone(), value.value.to_string()));
    });

    // Duration above maxTimeShelved is rejected up front
    assert_eq!(
        engine.timed_shelve(&alarm, 120_000.0),
        StatusCode::BadShelvingTimeOutOfRange
    );

    assert_eq!(engine.timed_shelve(&alarm, 1500.0), StatusCode::Good);
    assert_eq!(
        engine.timed_shelve(&alarm, 1500.0),
        StatusCode::BadConditionAlreadyShelved
    );
    assert!(engine.condition(&alarm).unwrap().as_alarm().unwrap().suppressed_or_shelved());
    assert!(engine.unshelve_time(&alarm).unwrap() > 0.0);

    // The shelving state variable was pushed to value listeners
    assert!(changes
        .borrow()
        .iter()
        .any(|(n, v)| n == &NodeId::from_name("TankLevelAlarm.ShelvingState.CurrentState")
            && v == "TimedShelved"));

    // Tick past the deadline: auto-unshelve
    engine.tick_shelving(Utc::now() + ChronoDuration::milliseconds(1600));
    assert_eq!(
        engine.condition(&alarm).unwrap().as_alarm().unwrap().shelving_state(),
        ShelvingState::Unshelved
    );
    assert!(!engine.condition(&alarm).unwrap().as_alarm().unwrap().suppressed_or_shelved());
    assert!(changes.borrow().iter().any(|(_, v)| v == "Unshelved"));
    assert_eq!(engine.unshelve(&alarm), StatusCode::BadConditionNotShelved);
    assert_eq!(engine.stats().shelving_expiries, 1);
}

#[tokio::test]
async fn test_run_loop_expires_timed_shelves() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();
    assert_eq!(engine.timed_shelve(&alarm, 50.0), StatusCode::Good);

    // The loop runs until shutdown; bound it and let the interval tick the
    // shelving deadline past expiry in the meantime.
    let _ = tokio::time::timeout(
        std::time::Duration::from_millis(400),
        engine.run(std::time::Duration::from_millis(20)),
    )
    .await;

    assert_eq!(
        engine.condition(&alarm).unwrap().as_alarm().unwrap().shelving_state(),
        ShelvingState::Unshelved
    );
    assert_eq!(engine.stats().shelving_expiries, 1);
}

#[test]
fn test_enable_disable_cycle_with_catchup() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();
    let events = capture_events(&mut engine);

    assert_eq!(engine.disable(&alarm), StatusCode::Good);
    assert_eq!(engine.disable(&alarm), StatusCode::BadConditionAlreadyDisabled);
    // The rejected call must not emit
    assert_eq!(events.borrow().len(), 1);
    {
        let disable_event = &events.borrow()[0];
        assert_eq!(
            disable_event.payload.get("severity").unwrap().status,
            StatusCode::BadConditionDisabled
        );
    }

    // State drifts while disabled: nothing emitted
    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
    assert_eq!(events.borrow().len(), 1);
    assert!(!engine.condition(&alarm).unwrap().base().current().active());

    // Enable raises its own event plus exactly one catch-up activation
    assert_eq!(engine.enable(&alarm), StatusCode::Good);
    assert_eq!(events.borrow().len(), 3);
    assert!(engine.condition(&alarm).unwrap().base().current().active());
    assert_eq!(field_text(&events.borrow()[2], "activeState"), "Active");

    assert_eq!(engine.enable(&alarm), StatusCode::BadConditionAlreadyEnabled);
    assert_eq!(events.borrow().len(), 3);
}

#[test]
fn test_condition_refresh_ordering() {
    let mut engine = build_engine();

    // Two retained conditions, in instantiation order
    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
    engine.write_signal("valve_state", Variant::Boolean(true)).unwrap();

    let events = capture_events(&mut engine);
    assert_eq!(engine.condition_refresh(7), StatusCode::Good);

    let events = events.borrow();
    assert!(events.len() >= 4);
    assert_eq!(events.first().unwrap().event_type, event_type_ids::REFRESH_START);
    assert_eq!(events.last().unwrap().event_type, event_type_ids::REFRESH_END);
    let names: Vec<String> = events[1..events.len() - 1]
        .iter()
        .map(|e| field_text(e, "conditionName"))
        .collect();
    assert_eq!(names, vec!["TankLevelAlarm", "ValveFault"]);

    // Unshelved FlowDeviation never went active, so it is absent
    assert!(!names.contains(&"FlowDeviation".to_string()));
}

#[test]
fn test_refresh_includes_branches_after_current() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();

    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
    engine.write_signal("tank_level", Variant::Double(50.0)).unwrap();
    engine.write_signal("tank_level", Variant::Double(96.0)).unwrap();

    let events = capture_events(&mut engine);
    engine.condition_refresh(1);
    let events = events.borrow();
    // start, current event, one branch event, end
    assert_eq!(events.len(), 4);
    let current_branch = field_text(&events[1], "branchId");
    let detached_branch = field_text(&events[2], "branchId");
    assert_eq!(current_branch, NodeId::Null.to_string());
    assert_ne!(detached_branch, current_branch);
    drop(events);

    let _ = alarm;
}

#[test]
fn test_every_raise_gets_fresh_event_id() {
    let mut engine = build_engine();
    let events = capture_events(&mut engine);

    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();
    engine.write_signal("tank_level", Variant::Double(96.0)).unwrap();

    let events = events.borrow();
    let ids: Vec<_> = events
        .iter()
        .map(|e| e.payload.get("eventId").unwrap().value.clone())
        .collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);
}

#[test]
fn test_add_comment_reraises() {
    let mut engine = build_engine();
    let alarm = engine.find_condition("TankLevelAlarm").unwrap();
    engine.write_signal("tank_level", Variant::Double(85.0)).unwrap();

    let events = capture_events(&mut engine);
    assert_eq!(
        engine.add_comment(&alarm, None, LocalizedText::new("checking pump")),
        StatusCode::Good
    );
    let events = events.borrow();
    assert_eq!(events.len(), 1);
    assert_eq!(field_text(&events[0], "comment"), "checking pump");
}
