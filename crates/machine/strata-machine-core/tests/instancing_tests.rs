use std::collections::HashSet;

use strata_machine_core::{
    Animator, Blend1DDef, BlendChildDef, ClipDef, Config, ControllerDef, InlineScheduler, Inputs,
    Layer, LayerDef, LayerId, LoopMode, MachineEvent, MotionDef, MotionId, NodeIndex,
    NullHierarchy, ParamDef, StateDef, TransitionDef,
};

fn clip(name: &str, duration: f32) -> MotionDef {
    MotionDef::Clip(ClipDef {
        clip: name.to_string(),
        duration,
        looping: LoopMode::Loop,
        speed: 1.0,
        speed_param: None,
    })
}

fn blend(children: &[u32]) -> MotionDef {
    MotionDef::Blend1D(Blend1DDef {
        param: None,
        children: children
            .iter()
            .enumerate()
            .map(|(i, &m)| BlendChildDef {
                threshold: i as f32,
                motion: MotionId(m),
            })
            .collect(),
    })
}

fn state(name: &str, motion: u32) -> StateDef {
    StateDef {
        name: name.to_string(),
        motion: Some(MotionId(motion)),
        transitions: vec![],
    }
}

fn layer(motions: Vec<u32>, entry_state: usize, states: Vec<StateDef>) -> LayerDef {
    LayerDef {
        name: "base".to_string(),
        weight: 1.0,
        additive: false,
        blend_param: None,
        motions: motions.into_iter().map(MotionId).collect(),
        entry_state,
        states,
    }
}

fn controller(motions: Vec<MotionDef>, layers: Vec<LayerDef>) -> ControllerDef {
    ControllerDef {
        name: "test".to_string(),
        parameters: Vec::<ParamDef>::new(),
        motions,
        layers,
    }
}

/// Indices reachable from a state root, root included.
fn reachable(layer: &Layer, root: NodeIndex) -> HashSet<usize> {
    let mut seen = HashSet::new();
    let mut stack = vec![root];
    while let Some(idx) = stack.pop() {
        if !seen.insert(idx.usize()) {
            continue;
        }
        if let Some(node) = layer.node(idx) {
            stack.extend(node.child_indices());
        }
    }
    seen
}

/// No node index is referenced by two parents or claimed by two states.
fn assert_single_ownership(layer: &Layer) {
    let mut referencers = vec![0usize; layer.nodes().len()];
    for node in layer.nodes().iter().flatten() {
        for child in node.child_indices() {
            referencers[child.usize()] += 1;
        }
    }
    for s in layer.states() {
        if let Some(root) = s.node {
            referencers[root.usize()] += 1;
        }
    }
    assert!(
        referencers.iter().all(|&count| count <= 1),
        "a node has multiple referencers: {referencers:?}"
    );
}

/// it should give two states that reference the same motion identifier
/// exclusive node clones with identical configuration but independent
/// playback cursors.
#[test]
fn shared_motion_identifier_is_cloned_per_state() {
    let ctrl = controller(
        vec![clip("idle", 2.0), clip("shared", 1.0)],
        vec![layer(
            vec![0, 1],
            0,
            vec![state("A", 1), state("B", 1), state("C", 0)],
        )],
    );
    let mut anim = Animator::instantiate(&ctrl).unwrap();
    let base = anim.layer_mut(LayerId(0)).unwrap();

    let root_a = base.state(0).unwrap().node.unwrap();
    let root_b = base.state(1).unwrap().node.unwrap();
    assert_ne!(root_a, root_b);

    // Identical initial configuration...
    assert_eq!(base.node(root_a).unwrap().kind, base.node(root_b).unwrap().kind);

    // ...but advancing one cursor leaves the other alone.
    base.set_state_normalized_time(0, 0.5);
    assert!((base.state_time(0) - 0.5).abs() < 1e-6);
    assert_eq!(base.state_time(1), 0.0);

    assert_single_ownership(base);
}

/// it should leave no motion-node index reachable from two distinct state
/// roots after instantiation, even with heavy sharing in the prototype.
#[test]
fn reachability_sets_are_disjoint() {
    // walk is shared by both blends and blend "a" references it twice.
    let ctrl = controller(
        vec![
            clip("idle", 2.0),
            clip("walk", 1.2),
            blend(&[1, 1]),
            blend(&[1, 0]),
        ],
        vec![layer(
            vec![2, 3, 1],
            0,
            vec![state("A", 2), state("B", 3), state("C", 1)],
        )],
    );
    let anim = Animator::instantiate(&ctrl).unwrap();
    let base = &anim.layers()[0];

    let roots: Vec<NodeIndex> = base.states().iter().filter_map(|s| s.node).collect();
    assert_eq!(roots.len(), 3);
    for i in 0..roots.len() {
        for j in (i + 1)..roots.len() {
            let a = reachable(base, roots[i]);
            let b = reachable(base, roots[j]);
            assert!(
                a.is_disjoint(&b),
                "roots {i} and {j} share nodes: {:?}",
                a.intersection(&b).collect::<Vec<_>>()
            );
        }
    }
    assert_single_ownership(base);
}

/// it should null out cyclic branches at instantiation and keep the rest of
/// the layer animating.
#[test]
fn cyclic_branches_are_nulled() {
    // 1 -> 2 -> 1 is a cycle; 0 is a healthy clip.
    let ctrl = controller(
        vec![clip("idle", 2.0), blend(&[2]), blend(&[1])],
        vec![layer(vec![0, 1], 0, vec![state("A", 0), state("B", 1)])],
    );
    let mut anim = Animator::instantiate(&ctrl).unwrap();
    assert!(anim
        .outputs()
        .events
        .iter()
        .any(|e| matches!(e, MachineEvent::CycleDetected { .. })));

    let base = &anim.layers()[0];
    // Every DFS from a state root terminates; the cyclic root's slot is gone.
    for s in base.states() {
        if let Some(root) = s.node {
            let _ = reachable(base, root);
        }
    }
    let root_b = base.states()[1].node.unwrap();
    assert!(base.node(root_b).is_none());

    // The healthy branch still schedules work.
    let mut sched = InlineScheduler::new();
    anim.update(0.1, Inputs::default(), &mut sched, &NullHierarchy);
    assert_eq!(sched.jobs.len(), 1);
    assert_eq!(sched.jobs[0].clip, "idle");
}

/// it should keep the pre-deduplication array when the pass ceiling is
/// exceeded, and settle the same graph when given enough passes.
#[test]
fn dedup_overflow_restores_backup() {
    // y -> (x, x), x -> (walk, walk): needs more than one pass because the
    // clone appended for the second x still shares walk.
    let ctrl = controller(
        vec![clip("walk", 1.2), blend(&[0, 0]), blend(&[1, 1])],
        vec![layer(vec![2], 0, vec![state("A", 2)])],
    );

    let starved = Config {
        max_dedup_passes: 1,
        ..Config::default()
    };
    let anim = Animator::with_config(&ctrl, starved).unwrap();
    assert!(anim
        .outputs()
        .events
        .contains(&MachineEvent::DuplicationOverflow { layer: LayerId(0) }));
    // The backup is the unmodified post-clone array: one node per resolved id.
    assert_eq!(anim.layers()[0].nodes().len(), 3);

    let anim = Animator::instantiate(&ctrl).unwrap();
    assert!(!anim
        .outputs()
        .events
        .contains(&MachineEvent::DuplicationOverflow { layer: LayerId(0) }));
    assert_single_ownership(&anim.layers()[0]);
}

/// it should treat missing motion identifiers as absent branches: the state
/// plays nothing, everything else keeps working.
#[test]
fn missing_motion_identifier_degrades() {
    let ctrl = controller(
        vec![clip("idle", 2.0)],
        vec![layer(vec![0, 9], 0, vec![state("A", 0), state("B", 9)])],
    );
    let mut anim = Animator::instantiate(&ctrl).unwrap();
    let base = &anim.layers()[0];
    assert!(base.states()[1].node.is_none());

    let mut sched = InlineScheduler::new();
    anim.update(0.1, Inputs::default(), &mut sched, &NullHierarchy);
    assert_eq!(sched.jobs.len(), 1);
}

/// it should disable transitions that target a missing state and report the
/// degradation.
#[test]
fn missing_transition_target_disabled() {
    let mut a = state("A", 0);
    a.transitions = vec![TransitionDef {
        target: 7,
        duration: 0.2,
        conditions: vec![],
        window: None,
        cooldown_frames: 0,
        set_source_time: None,
        set_target_time: None,
        must_be_first: false,
        allow_chaining: false,
        allow_revert: false,
        cancel_time_scale: 1.0,
        speed_sync: None,
        param_ops: vec![],
        cancel_param_ops: vec![],
    }];
    let ctrl = ControllerDef {
        name: "test".to_string(),
        parameters: vec![],
        motions: vec![clip("idle", 2.0)],
        layers: vec![layer(vec![0], 0, vec![a])],
    };
    // Programmatic instantiation tolerates the bad edge (the strict check
    // lives in the stored-asset path); it is disabled with an event.
    let mut anim = Animator::instantiate(&ctrl).unwrap();
    assert!(anim
        .outputs()
        .events
        .contains(&MachineEvent::MissingTransitionTarget {
            layer: LayerId(0),
            state: 0,
            target: 7,
        }));

    let mut sched = InlineScheduler::new();
    for _ in 0..5 {
        anim.update(0.1, Inputs::default(), &mut sched, &NullHierarchy);
    }
    assert_eq!(anim.layers()[0].current_state(), 0);
}

/// it should start the active-state cursor at the prototype's entry state.
#[test]
fn entry_cursor_follows_prototype() {
    let ctrl = controller(
        vec![clip("idle", 2.0), clip("walk", 1.2)],
        vec![layer(vec![0, 1], 1, vec![state("A", 0), state("B", 1)])],
    );
    let anim = Animator::instantiate(&ctrl).unwrap();
    assert_eq!(anim.layers()[0].current_state(), 1);
}

/// it should not alias node arrays between two instantiations of the same
/// prototype.
#[test]
fn instances_do_not_alias() {
    let ctrl = controller(
        vec![clip("idle", 2.0)],
        vec![layer(vec![0], 0, vec![state("A", 0)])],
    );
    let mut first = Animator::instantiate(&ctrl).unwrap();
    let second = Animator::instantiate(&ctrl).unwrap();

    let mut sched = InlineScheduler::new();
    first.update(0.5, Inputs::default(), &mut sched, &NullHierarchy);
    assert!(first.layers()[0].state_time(0) > 0.0);
    assert_eq!(second.layers()[0].state_time(0), 0.0);
}
