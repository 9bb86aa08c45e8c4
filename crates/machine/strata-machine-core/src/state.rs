//! Runtime states and the per-tick progression state machine.
//!
//! A state is Idle, Transitioning, TransitionCancelling, or
//! TransitionReverting; all flips happen inside `progress_chain` and the
//! machine runs for the layer's lifetime. The recursion follows the active
//! chain: a transitioning source progresses its target (possibly with a
//! speed-scaled dt), and a completed transition hands the chain over to the
//! target, which may immediately chain again when the edge allows it.

use serde::{Deserialize, Serialize};

use crate::data::{OpPhase, TargetTime};
use crate::hierarchy::HierarchyProvider;
use crate::ids::{LayerId, NodeIndex};
use crate::jobs::{JobHandle, JobScheduler};
use crate::motion::{self, AdvanceCtx, MotionNode};
use crate::outputs::{MachineEvent, Outputs};
use crate::params::ParamStore;
use crate::transition::Transition;

/// Floor for blend totals and speed ratios; keeps the crossfade math away
/// from divide-by-zero without changing observable weights.
const MIN_TOTAL: f32 = 1e-6;

/// Phase of a state's transition machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// No active transition.
    Idle,
    /// Crossfading toward the target.
    Transitioning,
    /// Crossfade reversed toward the source after a cancellation.
    TransitionCancelling,
    /// Crossfade resumed toward the target after a reversion.
    TransitionReverting,
}

impl ProgressPhase {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Transitioning => "transitioning",
            Self::TransitionCancelling => "cancelling",
            Self::TransitionReverting => "reverting",
        }
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    #[inline]
    pub fn is_blending(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Transient record of an in-flight transition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActiveTransition {
    /// Index into the owning state's transition list.
    pub transition: usize,
    /// Target state index.
    pub target: usize,
    pub total: f32,
    pub remaining: f32,
    pub cancelled: bool,
    pub reverted: bool,
}

/// A state-machine node instance: one motion plus outgoing transitions,
/// cloned per layer instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeState {
    pub name: String,
    pub index: usize,
    /// Exclusive motion-node root; None for empty states and nulled branches.
    pub node: Option<NodeIndex>,
    pub transitions: Vec<Transition>,
    pub active: Option<ActiveTransition>,
    /// Current blend weight within the layer.
    pub weight: f32,
}

impl RuntimeState {
    pub fn phase(&self) -> ProgressPhase {
        match &self.active {
            None => ProgressPhase::Idle,
            Some(act) if act.cancelled => ProgressPhase::TransitionCancelling,
            Some(act) if act.reverted => ProgressPhase::TransitionReverting,
            Some(_) => ProgressPhase::Transitioning,
        }
    }
}

/// Arguments threaded through the recursive progression calls.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProgressArgs {
    /// Hierarchy written by the next non-additive, non-blended layer.
    pub next_hierarchy: Option<usize>,
    pub next_is_blended: bool,
    pub skip_if_derivative: bool,
    pub dt: f32,
    pub allow_transitions: bool,
    pub is_transition_target: bool,
    pub can_loop: bool,
}

/// Collaborators for one tick, shared across the recursion.
pub(crate) struct ProgressCtx<'a> {
    pub layer: LayerId,
    pub layer_weight: f32,
    pub additive: bool,
    pub frame: u64,
    pub params: &'a mut ParamStore,
    pub sched: &'a mut dyn JobScheduler,
    pub hierarchy: &'a dyn HierarchyProvider,
    pub outputs: &'a mut Outputs,
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn node_speed(nodes: &[Option<MotionNode>], index: NodeIndex, params: &ParamStore) -> f32 {
    nodes
        .get(index.usize())
        .and_then(|n| n.as_ref())
        .map(|n| n.effective_speed(params))
        .unwrap_or(1.0)
}

/// Progress the state at `index` and everything hanging off its active
/// transition. Returns the index now at the head of the chain plus the
/// combined handle of all motion work scheduled beneath this call.
pub(crate) fn progress_chain(
    states: &mut [RuntimeState],
    nodes: &mut [Option<MotionNode>],
    index: usize,
    args: ProgressArgs,
    ctx: &mut ProgressCtx<'_>,
) -> (usize, JobHandle) {
    if index >= states.len() {
        return (index, JobHandle::NONE);
    }

    // The advance can be skipped when a later non-additive, non-blended
    // layer fully overwrites this layer's hierarchy. Transition logic still
    // runs below either way.
    let suppress = args.skip_if_derivative
        && !args.next_is_blended
        && match (
            args.next_hierarchy,
            ctx.hierarchy.longest_hierarchy_index(ctx.layer),
        ) {
            (Some(next), Some(mine)) => ctx.hierarchy.is_derivative(mine, next),
            _ => false,
        };

    // Idle: scan transitions in declared order; first satisfied wins and is
    // the only arm this tick.
    if states[index].active.is_none() && args.allow_transitions {
        try_arm(states, nodes, index, &args, ctx);
    }

    let mut handle = JobHandle::NONE;
    let mut dt_source = args.dt;

    if let Some(mut act) = states[index].active.take() {
        act.remaining -= args.dt;
        if act.remaining <= 0.0 {
            let overshoot = -act.remaining;
            let cancelled = act.cancelled;
            let allow_chaining = {
                let tr = &states[index].transitions[act.transition];
                tr.apply_ops(OpPhase::AtEnd, cancelled, ctx.params);
                tr.def.allow_chaining
            };
            if cancelled {
                // Settle back to fully-source and rewind the abandoned target.
                if let Some(tnode) = states[act.target].node {
                    motion::reset_subtree(nodes, tnode);
                }
                states[act.target].weight = 0.0;
                states[index].weight = 1.0;
                // This state stays the idle head and advances below.
            } else {
                // Settle to fully-target, rewind the source, hand over.
                if let Some(snode) = states[index].node {
                    motion::reset_subtree(nodes, snode);
                }
                states[index].weight = 0.0;
                states[act.target].weight = 1.0;
                ctx.outputs.push_event(MachineEvent::TransitionCompleted {
                    layer: ctx.layer,
                    from: index,
                    to: act.target,
                });
                ctx.outputs.push_event(MachineEvent::StateEntered {
                    layer: ctx.layer,
                    state: act.target,
                });
                let next_args = ProgressArgs {
                    dt: overshoot,
                    allow_transitions: allow_chaining,
                    is_transition_target: true,
                    ..args
                };
                return progress_chain(states, nodes, act.target, next_args, ctx);
            }
        } else {
            // Still blending.
            let target = act.target;
            let (allow_revert, cancel_scale, speed_sync, allow_chaining) = {
                let tr = &states[index].transitions[act.transition];
                (
                    tr.def.allow_revert,
                    tr.def.cancel_time_scale,
                    tr.def.speed_sync,
                    tr.def.allow_chaining,
                )
            };

            // Cancellation and reversion are driven purely by re-evaluating
            // the forward predicate; there is no external cancel API.
            if allow_revert {
                let forward_holds =
                    states[index].transitions[act.transition].conditions_met(ctx.params);
                if !act.cancelled && !forward_holds {
                    let k = cancel_scale.max(MIN_TOTAL);
                    let total = act.total.max(MIN_TOTAL);
                    // Invert elapsed time so weights stay continuous, then
                    // rescale the window by the cancellation multiplier.
                    act.remaining = (total - act.remaining) * k;
                    act.total = total * k;
                    act.cancelled = true;
                    states[index].transitions[act.transition].apply_ops(
                        OpPhase::AtStart,
                        true,
                        ctx.params,
                    );
                    ctx.outputs.push_event(MachineEvent::TransitionCancelled {
                        layer: ctx.layer,
                        from: index,
                        to: target,
                    });
                } else if act.cancelled && forward_holds {
                    // Revert: restore forward pacing and invert progress.
                    let k = cancel_scale.max(MIN_TOTAL);
                    let p_cancelled = 1.0 - act.remaining / act.total.max(MIN_TOTAL);
                    act.total /= k;
                    act.remaining = act.total * p_cancelled;
                    act.cancelled = false;
                    act.reverted = true;
                    ctx.outputs.push_event(MachineEvent::TransitionReverted {
                        layer: ctx.layer,
                        from: index,
                        to: target,
                    });
                }
            }

            let p = (1.0 - act.remaining / act.total.max(MIN_TOTAL)).clamp(0.0, 1.0);
            let (source_weight, target_weight) = if act.cancelled {
                (p, 1.0 - p)
            } else {
                (1.0 - p, p)
            };
            states[index].weight = source_weight;
            states[target].weight = target_weight;

            // Speed sync: converge effective playback speeds across the
            // window. Each side's speed comes from its own node.
            let mut dt_target = args.dt;
            if let Some(sync) = speed_sync {
                let s_src = states[index]
                    .node
                    .map(|n| node_speed(nodes, n, ctx.params))
                    .unwrap_or(1.0);
                let s_tgt = states[target]
                    .node
                    .map(|n| node_speed(nodes, n, ctx.params))
                    .unwrap_or(1.0);
                let to_target = if s_tgt.abs() > MIN_TOTAL {
                    s_src / s_tgt
                } else {
                    1.0
                };
                let to_source = if s_src.abs() > MIN_TOTAL {
                    s_tgt / s_src
                } else {
                    1.0
                };
                // The target starts paced like the source and eases into its
                // own speed; the source eases toward the target's pace.
                dt_target = args.dt * lerp(to_target, 1.0, p) * sync.target_multiplier;
                dt_source = args.dt * lerp(1.0, to_source, p) * sync.source_multiplier;
            }

            states[index].active = Some(act);

            let next_args = ProgressArgs {
                dt: dt_target,
                allow_transitions: allow_chaining,
                is_transition_target: true,
                ..args
            };
            let (_, h) = progress_chain(states, nodes, target, next_args, ctx);
            handle = ctx.sched.combine(handle, h);
        }
    } else if !args.is_transition_target {
        // Idle head of the chain owns the full weight.
        states[index].weight = 1.0;
    }

    // Advance this state's motion unless a later layer fully overwrites it.
    if !suppress {
        if let Some(nidx) = states[index].node {
            let weight = states[index].weight;
            let adv = AdvanceCtx {
                layer: ctx.layer,
                layer_weight: ctx.layer_weight,
                additive: ctx.additive,
                params: &*ctx.params,
            };
            let h = motion::progress_node(
                nodes,
                nidx,
                dt_source,
                weight,
                args.can_loop,
                &adv,
                ctx.sched,
            );
            handle = ctx.sched.combine(handle, h);
        }
    }

    (index, handle)
}

/// Scan the state's transitions and arm the first satisfied one: rewind the
/// target, fire AtStart ops, consume triggers, apply forced normalized
/// times, and record the blend window.
fn try_arm(
    states: &mut [RuntimeState],
    nodes: &mut [Option<MotionNode>],
    index: usize,
    args: &ProgressArgs,
    ctx: &mut ProgressCtx<'_>,
) {
    let source_norm = states[index]
        .node
        .map(|n| motion::node_normalized_time(nodes, n))
        .unwrap_or(0.0);
    let armed = states[index].transitions.iter().position(|tr| {
        tr.satisfied(ctx.params, source_norm, ctx.frame, args.is_transition_target)
    });
    let ti = match armed {
        Some(ti) => ti,
        None => return,
    };

    let (target, duration, set_source_time, set_target_time) = {
        let tr = &mut states[index].transitions[ti];
        tr.consume_triggers(ctx.params);
        tr.mark_triggered(ctx.frame);
        tr.apply_ops(OpPhase::AtStart, false, ctx.params);
        (
            tr.def.target,
            tr.def.duration,
            tr.def.set_source_time,
            tr.def.set_target_time,
        )
    };
    if target >= states.len() {
        // Instantiation disables these; stay put if one slips through.
        return;
    }

    // Rewind the target before blending it in.
    states[target].active = None;
    states[target].weight = 0.0;
    if let Some(tnode) = states[target].node {
        motion::reset_subtree(nodes, tnode);
    }

    if let Some(u) = set_source_time {
        if let Some(snode) = states[index].node {
            motion::seek_normalized(nodes, snode, u);
        }
    }
    if let Some(tt) = set_target_time {
        if let Some(tnode) = states[target].node {
            let u = match tt {
                TargetTime::Fixed(u) => u,
                TargetTime::FromSource { scale, offset } => {
                    let src = states[index]
                        .node
                        .map(|n| motion::node_normalized_time(nodes, n))
                        .unwrap_or(0.0);
                    src * scale + offset
                }
            };
            motion::seek_normalized(nodes, tnode, u.clamp(0.0, 1.0));
        }
    }

    states[index].active = Some(ActiveTransition {
        transition: ti,
        target,
        total: duration.max(0.0),
        remaining: duration.max(0.0),
        cancelled: false,
        reverted: false,
    });
    ctx.outputs.push_event(MachineEvent::TransitionStarted {
        layer: ctx.layer,
        from: index,
        to: target,
    });
}
