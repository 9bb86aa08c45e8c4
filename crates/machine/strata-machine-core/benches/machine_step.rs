use criterion::{black_box, criterion_group, criterion_main, Criterion};

use strata_machine_core::{
    Animator, Blend1DDef, BlendChildDef, ClipDef, ConditionDef, ControllerDef, InlineScheduler,
    Inputs, LayerDef, LoopMode, MotionDef, MotionId, NullHierarchy, ParamDef, ParamId, ParamValue,
    StateDef, TransitionDef,
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

fn transition(target: usize, duration: f32, conditions: Vec<ConditionDef>) -> TransitionDef {
    TransitionDef {
        target,
        duration,
        conditions,
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
    }
}

/// Two layers: a blend-tree locomotion machine plus an additive overlay.
fn bench_controller() -> ControllerDef {
    let speed = ParamId(0);
    ControllerDef {
        name: "bench".to_string(),
        parameters: vec![ParamDef {
            name: "speed".to_string(),
            default: ParamValue::Float(1.5),
        }],
        motions: vec![
            clip("idle", 2.0),
            clip("walk", 1.2),
            clip("run", 0.8),
            MotionDef::Blend1D(Blend1DDef {
                param: Some(speed),
                children: vec![
                    BlendChildDef {
                        threshold: 0.5,
                        motion: MotionId(1),
                    },
                    BlendChildDef {
                        threshold: 3.0,
                        motion: MotionId(2),
                    },
                ],
            }),
            clip("breathe", 3.0),
        ],
        layers: vec![
            LayerDef {
                name: "base".to_string(),
                weight: 1.0,
                additive: false,
                blend_param: None,
                motions: vec![MotionId(0), MotionId(3)],
                entry_state: 0,
                states: vec![
                    StateDef {
                        name: "Idle".to_string(),
                        motion: Some(MotionId(0)),
                        transitions: vec![transition(
                            1,
                            0.25,
                            vec![ConditionDef::Float {
                                param: speed,
                                op: strata_machine_core::CompareOp::Gt,
                                value: 0.1,
                            }],
                        )],
                    },
                    StateDef {
                        name: "Move".to_string(),
                        motion: Some(MotionId(3)),
                        transitions: vec![transition(
                            0,
                            0.25,
                            vec![ConditionDef::Float {
                                param: speed,
                                op: strata_machine_core::CompareOp::Le,
                                value: 0.1,
                            }],
                        )],
                    },
                ],
            },
            LayerDef {
                name: "overlay".to_string(),
                weight: 0.5,
                additive: true,
                blend_param: None,
                motions: vec![MotionId(4)],
                entry_state: 0,
                states: vec![StateDef {
                    name: "Breathe".to_string(),
                    motion: Some(MotionId(4)),
                    transitions: vec![],
                }],
            },
        ],
    }
}

fn machine_step(c: &mut Criterion) {
    let ctrl = bench_controller();

    c.bench_function("animator_update_60hz", |b| {
        let mut anim = Animator::instantiate(&ctrl).unwrap();
        let mut sched = InlineScheduler::new();
        b.iter(|| {
            sched.clear();
            let (_, handle) =
                anim.update(black_box(1.0 / 60.0), Inputs::default(), &mut sched, &NullHierarchy);
            black_box(handle);
        });
    });

    c.bench_function("animator_instantiate", |b| {
        b.iter(|| black_box(Animator::instantiate(&ctrl).unwrap()));
    });
}

criterion_group!(benches, machine_step);
criterion_main!(benches);
