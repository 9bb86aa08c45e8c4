use strata_machine_core::{
    parse_stored_controller_json, Animator, ControllerError, InlineScheduler, Inputs, LayerId,
    NullHierarchy, ParamCommand, ParamValue,
};

/// it should parse the locomotion fixture into a fully bound controller.
#[test]
fn parses_locomotion_fixture() {
    let json = strata_test_fixtures::controllers::json("locomotion").unwrap();
    let ctrl = parse_stored_controller_json(&json).unwrap();

    assert_eq!(ctrl.name, "locomotion");
    assert_eq!(ctrl.parameters.len(), 3);
    assert_eq!(ctrl.parameters[0].name, "speed");
    assert_eq!(ctrl.parameters[1].default, ParamValue::Bool(true));
    assert!(matches!(
        ctrl.parameters[2].default,
        ParamValue::Trigger(false)
    ));
    assert_eq!(ctrl.motions.len(), 5);
    assert_eq!(ctrl.layers.len(), 1);
    let base = &ctrl.layers[0];
    assert_eq!(base.entry_state, 0);
    assert_eq!(base.states.len(), 3);
    assert_eq!(base.states[1].name, "Move");
    assert_eq!(base.states[1].transitions[1].cooldown_frames, 10);
    assert!(base.states[1].transitions[0].allow_revert);
    assert_eq!(base.states[2].transitions[0].param_ops.len(), 1);
}

/// it should parse the additive overlay fixture with a bound blend
/// parameter.
#[test]
fn parses_gesture_overlay_fixture() {
    let json = strata_test_fixtures::controllers::json("gesture-overlay").unwrap();
    let ctrl = parse_stored_controller_json(&json).unwrap();

    assert_eq!(ctrl.layers.len(), 2);
    assert!(ctrl.layers[1].additive);
    assert!(ctrl.layers[1].blend_param.is_some());
    let overlay = ctrl.layers[1].blend_param.unwrap();
    assert_eq!(ctrl.parameters[overlay.0 as usize].name, "overlay");
}

/// it should drive a fixture controller end to end: speeding up leaves Idle
/// for Move with conserved crossfade weights.
#[test]
fn fixture_controller_runs() {
    let json = strata_test_fixtures::controllers::json("locomotion").unwrap();
    let ctrl = parse_stored_controller_json(&json).unwrap();
    let mut anim = Animator::instantiate(&ctrl).unwrap();
    let mut sched = InlineScheduler::new();

    let speed = anim.param_id("speed").unwrap();
    let inputs = Inputs {
        param_cmds: vec![ParamCommand::SetFloat {
            param: speed,
            value: 2.0,
        }],
        layer_cmds: vec![],
    };
    anim.update(0.1, inputs, &mut sched, &NullHierarchy);
    let base = anim.layer(LayerId(0)).unwrap();
    let idle = base.state_index("Idle").unwrap();
    let moving = base.state_index("Move").unwrap();
    let sum = base.state(idle).unwrap().weight + base.state(moving).unwrap().weight;
    assert!((sum - 1.0).abs() < 1e-4);

    for _ in 0..4 {
        anim.update(0.1, Inputs::default(), &mut sched, &NullHierarchy);
    }
    assert_eq!(anim.layers()[0].current_state(), moving);
    // The blend tree samples both children at speed 2.0.
    assert!(sched.jobs.iter().any(|j| j.clip == "walk"));
    assert!(sched.jobs.iter().any(|j| j.clip == "run"));
}

/// it should reject malformed JSON with a parse error.
#[test]
fn rejects_malformed_json() {
    let err = parse_stored_controller_json("{ not json").unwrap_err();
    assert!(matches!(err, ControllerError::ParseError { .. }));
}

/// it should reject references to undefined parameters.
#[test]
fn rejects_unknown_parameter() {
    let json = r#"{
        "name": "bad",
        "parameters": [],
        "motions": [{ "type": "clip", "clip": "a", "duration": 1.0 }],
        "layers": [{
            "name": "base", "motions": [0], "entryState": 0,
            "states": [{
                "name": "A", "motion": 0,
                "transitions": [{ "target": 0, "duration": 0.1, "conditions": [
                    { "kind": "bool", "param": "nope", "value": true }
                ]}]
            }]
        }]
    }"#;
    let err = parse_stored_controller_json(json).unwrap_err();
    assert!(matches!(err, ControllerError::InvalidController { .. }));
}

/// it should reject an out-of-range entry state on the asset path.
#[test]
fn rejects_entry_state_out_of_range() {
    let json = r#"{
        "name": "bad",
        "parameters": [],
        "motions": [{ "type": "clip", "clip": "a", "duration": 1.0 }],
        "layers": [{
            "name": "base", "motions": [0], "entryState": 3,
            "states": [{ "name": "A", "motion": 0 }]
        }]
    }"#;
    let err = parse_stored_controller_json(json).unwrap_err();
    assert!(matches!(err, ControllerError::EntryStateOutOfRange { .. }));
}

/// it should list the known controller fixtures.
#[test]
fn fixture_manifest_lists_controllers() {
    let mut keys = strata_test_fixtures::controllers::keys();
    keys.sort();
    assert_eq!(keys, vec!["gesture-overlay", "locomotion"]);
}
