//! Unit tests for the FSM data structures

use crate::fsm::{
    Action, FiniteStateMachine, Guard, GuardKind, ModelError, NodeId, NodeKind, State,
    Transition, TransitionId,
};

#[test]
fn test_fsm_new() {
    let fsm = FiniteStateMachine::new("TestMachine");
    assert_eq!(fsm.name, "TestMachine");
    assert!(fsm.start_point().is_none());
    assert!(fsm.nodes.is_empty());
    assert!(fsm.transitions.is_empty());
    assert!(fsm.action_codes().is_empty());
}

#[test]
fn test_state_new() {
    let state = State::new("Idle");
    assert_eq!(state.name, "Idle");
    assert!(!state.accepting);
    assert!(state.enter_action.is_none());
    assert!(state.exit_action.is_none());
    assert!(state.in_action.is_none());
    assert_eq!(state.to_string(), "Idle");
}

#[test]
fn test_ids_follow_insertion_order() {
    let mut fsm = FiniteStateMachine::new("Test");
    let start = fsm.add_start_point().unwrap();
    let a = fsm.add_state(State::new("A"));
    let end = fsm.add_end_point();
    let b = fsm.add_state(State::new("B"));
    assert_eq!((start, a, end, b), (NodeId(0), NodeId(1), NodeId(2), NodeId(3)));

    let t0 = fsm.add_transition(Transition::new(start, a)).unwrap();
    let t1 = fsm.add_transition(Transition::new(a, b)).unwrap();
    let t2 = fsm.add_transition(Transition::new(b, end)).unwrap();
    assert_eq!((t0, t1, t2), (TransitionId(0), TransitionId(1), TransitionId(2)));

    let names: Vec<&str> = fsm.states().iter().map(|(_, s)| s.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
}

#[test]
fn test_ordering_ignores_storage_order() {
    let mut fsm = FiniteStateMachine::new("Test");
    let a = fsm.add_state(State::new("A"));
    let b = fsm.add_state(State::new("B"));
    fsm.add_transition(Transition::new(a, b)).unwrap();
    fsm.add_transition(Transition::new(a, a)).unwrap();
    fsm.nodes.reverse();
    fsm.transitions.reverse();

    let names: Vec<&str> = fsm.states().iter().map(|(_, s)| s.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B"]);
    let ids: Vec<TransitionId> = fsm.transitions_from(a).iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![TransitionId(0), TransitionId(1)]);
}

#[test]
fn test_single_start_point() {
    let mut fsm = FiniteStateMachine::new("Test");
    let start = fsm.add_start_point().unwrap();
    assert_eq!(
        fsm.add_start_point(),
        Err(ModelError::DuplicateStartPoint(start))
    );
    assert_eq!(fsm.start_point(), Some(start));
}

#[test]
fn test_add_transition_rejects_bad_anchors() {
    let mut fsm = FiniteStateMachine::new("Test");
    let start = fsm.add_start_point().unwrap();
    let a = fsm.add_state(State::new("A"));
    let end = fsm.add_end_point();

    assert_eq!(
        fsm.add_transition(Transition::new(a, NodeId(42))),
        Err(ModelError::UnknownNode(NodeId(42)))
    );
    assert_eq!(
        fsm.add_transition(Transition::new(end, a)),
        Err(ModelError::SourceIsEndPoint(end))
    );
    assert_eq!(
        fsm.add_transition(Transition::new(a, start)),
        Err(ModelError::TargetIsStartPoint(start))
    );
    assert!(fsm.transitions.is_empty());
}

#[test]
fn test_guard_kinds() {
    let mut fsm = FiniteStateMachine::new("Test");
    let a = fsm.add_state(State::new("A"));

    assert_eq!(Transition::new(a, a).guard_kind(), GuardKind::Unguarded);
    assert_eq!(
        Transition::new(a, a).with_guard(Guard::new("  ")).guard_kind(),
        GuardKind::Unguarded
    );
    assert_eq!(
        Transition::new(a, a).with_guard(Guard::new("ELSE")).guard_kind(),
        GuardKind::Else
    );
    assert_eq!(
        Transition::new(a, a).with_guard(Guard::otherwise()).guard_kind(),
        GuardKind::Else
    );
    assert_eq!(
        Transition::new(a, a).with_guard(Guard::new(" x > 0 ")).guard_kind(),
        GuardKind::Condition("x > 0")
    );
    assert_eq!(
        Transition::new(a, a).with_guard(Guard::new("elsewhere")).guard_kind(),
        GuardKind::Condition("elsewhere")
    );
}

#[test]
fn test_transition_label() {
    let mut fsm = FiniteStateMachine::new("Test");
    let a = fsm.add_state(State::new("A"));
    let t = Transition::new(a, a)
        .with_guard(Guard::new("is_valid"))
        .with_action(Action::new("process"));
    assert!(t.label().contains("[is_valid]"));
    assert!(t.label().contains("/ process"));
    assert_eq!(Transition::new(a, a).label(), "");
}

#[test]
fn test_referenced_actions() {
    let mut fsm = FiniteStateMachine::new("Test");
    let a = fsm.add_state(
        State::new("A")
            .with_enter(Action::new("on_enter"))
            .with_in(Action::new("tick")),
    );
    let b = fsm.add_state(State::new("B").with_exit(Action::new("on_exit")));
    fsm.add_transition(Transition::new(a, b).with_action(Action::new("tick")))
        .unwrap();

    let actions: Vec<&str> = fsm.referenced_actions().into_iter().collect();
    assert_eq!(actions, vec!["on_enter", "on_exit", "tick"]);
}

#[test]
fn test_fsm_validation_valid() {
    let mut fsm = FiniteStateMachine::new("Test");
    let start = fsm.add_start_point().unwrap();
    let idle = fsm.add_state(State::new("Idle"));
    let end = fsm.add_end_point();
    fsm.add_transition(Transition::new(start, idle)).unwrap();
    fsm.add_transition(Transition::new(idle, end).with_action(Action::new("stop")))
        .unwrap();
    fsm.set_action_code("stop", "System.exit(0);");

    assert!(fsm.validate().is_ok());
}

#[test]
fn test_fsm_validation_reports_broken_structure() {
    let mut fsm = FiniteStateMachine::new("Test");
    fsm.add_start_point().unwrap();
    let a = fsm.add_state(State::new("A"));
    fsm.nodes.push(crate::fsm::Node {
        id: NodeId(7),
        kind: NodeKind::StartPoint,
    });
    let mut dangling = Transition::new(a, NodeId(99));
    dangling.id = TransitionId(3);
    fsm.transitions.push(dangling);
    fsm.set_action_code("not an identifier", "");

    let errors = fsm.validate().unwrap_err();
    assert!(errors.iter().any(|e| e.contains("start points")));
    assert!(errors.iter().any(|e| e.contains("#99")));
    assert!(errors.iter().any(|e| e.contains("not an identifier")));
}

#[test]
fn test_json_roundtrip_preserves_structure() {
    let mut fsm = FiniteStateMachine::new("Test");
    let start = fsm.add_start_point().unwrap();
    let a = fsm.add_state(State::new("A").accepting().with_enter(Action::new("hello")));
    fsm.add_transition(Transition::new(start, a).with_guard(Guard::new("x > 1")))
        .unwrap();
    fsm.set_action_code("hello", "print(1);");

    let json = serde_json::to_string(&fsm).unwrap();
    assert!(json.contains("\"kind\":\"start_point\""));
    let back: FiniteStateMachine = serde_json::from_str(&json).unwrap();
    assert_eq!(back, fsm);
}

#[test]
fn test_blank_action_names_mean_no_action() {
    let mut fsm = FiniteStateMachine::new("Test");
    let start = fsm.add_start_point().unwrap();
    let a = fsm.add_state(
        State::new("A")
            .with_enter(Action::new(""))
            .with_in(Action::new("  "))
            .with_exit(Action::new("leave")),
    );
    fsm.add_transition(Transition::new(start, a).with_action(Action::new("")))
        .unwrap();

    let actions: Vec<&str> = fsm.referenced_actions().into_iter().collect();
    assert_eq!(actions, vec!["leave"]);
    assert!(fsm.validate().is_ok());
    assert_eq!(fsm.transitions[0].label(), "");
}

#[test]
fn test_blank_action_from_json_is_accepted() {
    let json = r#"{
        "name": "Test",
        "nodes": [{ "id": 0, "kind": "state", "name": "A", "in_action": { "name": "" } }],
        "transitions": []
    }"#;
    let fsm: FiniteStateMachine = serde_json::from_str(json).unwrap();
    assert!(fsm.referenced_actions().is_empty());
    assert!(fsm.validate().is_ok());
}

#[test]
fn test_ids_continue_after_deserialization() {
    let mut fsm = FiniteStateMachine::new("Test");
    let a = fsm.add_state(State::new("A"));
    let b = fsm.add_state(State::new("B"));
    fsm.add_transition(Transition::new(a, b)).unwrap();
    fsm.nodes.reverse();

    let json = serde_json::to_string(&fsm).unwrap();
    let mut back: FiniteStateMachine = serde_json::from_str(&json).unwrap();
    assert_eq!(back.add_state(State::new("C")), NodeId(2));
    assert_eq!(
        back.add_transition(Transition::new(b, a)).unwrap(),
        TransitionId(1)
    );
    assert!(back.validate().is_ok());
}

#[test]
fn test_node_lookup_in_any_storage_order() {
    let mut fsm = FiniteStateMachine::new("Test");
    let ids: Vec<NodeId> = (0..50)
        .map(|i| fsm.add_state(State::new(format!("S{}", i))))
        .collect();
    for &id in &ids {
        assert_eq!(fsm.node(id).map(|n| n.id), Some(id));
    }

    fsm.nodes.swap(3, 41);
    fsm.nodes.reverse();
    for &id in &ids {
        assert_eq!(fsm.node(id).map(|n| n.id), Some(id));
    }
    fsm.state_mut(ids[41]).unwrap().accepting = true;
    assert!(fsm.state(ids[41]).unwrap().accepting);
    assert!(fsm.node(NodeId(50)).is_none());
}

#[test]
fn test_large_chain_builds_and_validates() {
    let mut fsm = FiniteStateMachine::new("Chain");
    let mut previous = fsm.add_start_point().unwrap();
    for i in 0..20_000 {
        let next = fsm.add_state(State::new(format!("S{}", i)));
        fsm.add_transition(Transition::new(previous, next)).unwrap();
        previous = next;
    }
    assert_eq!(fsm.nodes.len(), 20_001);
    assert_eq!(fsm.transitions.len(), 20_000);
    assert!(fsm.validate().is_ok());
}
