//! Runtime transitions: gating predicate, anti-thrash cooldown, and
//! parameter side-effects.
//!
//! Trigger conditions are peeked during predicate evaluation and consumed
//! only when the transition actually arms, so a transition that loses the
//! first-match tie-break does not eat another transition's trigger.

use serde::{Deserialize, Serialize};

use crate::data::{CompareOp, ConditionDef, OpPhase, TransitionDef};
use crate::ids::ParamId;
use crate::params::ParamStore;

/// Sentinel for a parameter reference that failed to remap. Reads through it
/// hit the store's neutral-default path; triggers never fire through it.
pub const UNBOUND_PARAM: ParamId = ParamId(u32::MAX);

/// A transition instance: cloned prototype data plus transient runtime
/// bookkeeping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub def: TransitionDef,
    /// Set at instantiation for self-targeting or missing-target edges;
    /// disabled transitions never arm.
    pub disabled: bool,
    /// Frame of the most recent arming, for the cooldown check.
    pub last_trigger_frame: Option<u64>,
}

impl Transition {
    pub fn new(def: TransitionDef) -> Self {
        Self {
            def,
            disabled: false,
            last_trigger_frame: None,
        }
    }

    /// Full arming predicate: enabled, chain position, cooldown elapsed,
    /// source normalized time inside the window, and all conditions holding
    /// (triggers peeked, not consumed).
    pub fn satisfied(
        &self,
        params: &ParamStore,
        source_normalized_time: f32,
        frame: u64,
        is_transition_target: bool,
    ) -> bool {
        if self.disabled {
            return false;
        }
        if self.def.must_be_first && is_transition_target {
            return false;
        }
        if let Some(last) = self.last_trigger_frame {
            if frame.saturating_sub(last) < self.def.cooldown_frames {
                return false;
            }
        }
        if let Some(w) = self.def.window {
            if source_normalized_time < w.min || source_normalized_time > w.max {
                return false;
            }
        }
        self.conditions_met(params)
    }

    /// The forward predicate alone (parameter comparisons). Re-evaluated
    /// mid-blend for cancellation and reversion, where window and cooldown
    /// no longer apply.
    pub fn conditions_met(&self, params: &ParamStore) -> bool {
        self.def
            .conditions
            .iter()
            .all(|c| condition_holds(c, params))
    }

    /// Consume every trigger condition exactly once. Called at arming,
    /// after the predicate has been confirmed.
    pub fn consume_triggers(&self, params: &mut ParamStore) {
        for cond in &self.def.conditions {
            if let ConditionDef::Trigger { param } = cond {
                params.try_consume(Some(*param));
            }
        }
    }

    pub fn mark_triggered(&mut self, frame: u64) {
        self.last_trigger_frame = Some(frame);
    }

    /// Apply the parameter-state-changes for one phase. While cancelled, the
    /// cancellation op list takes over entirely.
    pub fn apply_ops(&self, phase: OpPhase, cancelled: bool, params: &mut ParamStore) {
        let ops = if cancelled {
            &self.def.cancel_param_ops
        } else {
            &self.def.param_ops
        };
        for op in ops.iter().filter(|op| op.phase == phase) {
            params.apply(op.param, op.value);
        }
    }

    /// Rewrite every parameter reference through `remap`; references that
    /// fail to remap become unbound.
    pub fn remap_params(&mut self, remap: &impl Fn(ParamId) -> Option<ParamId>) {
        let map = |id: &mut ParamId| *id = remap(*id).unwrap_or(UNBOUND_PARAM);
        for cond in &mut self.def.conditions {
            match cond {
                ConditionDef::Float { param, .. }
                | ConditionDef::Bool { param, .. }
                | ConditionDef::Trigger { param } => map(param),
            }
        }
        for op in &mut self.def.param_ops {
            map(&mut op.param);
        }
        for op in &mut self.def.cancel_param_ops {
            map(&mut op.param);
        }
    }
}

fn condition_holds(cond: &ConditionDef, params: &ParamStore) -> bool {
    match cond {
        ConditionDef::Float { param, op, value } => {
            let v = params.float(Some(*param));
            match op {
                CompareOp::Eq => v == *value,
                CompareOp::Ne => v != *value,
                CompareOp::Gt => v > *value,
                CompareOp::Lt => v < *value,
                CompareOp::Ge => v >= *value,
                CompareOp::Le => v <= *value,
            }
        }
        ConditionDef::Bool { param, value } => params.boolean(Some(*param)) == *value,
        ConditionDef::Trigger { param } => params.trigger_armed(Some(*param)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TimeWindow;
    use crate::params::{ParamDef, ParamValue};

    fn params() -> ParamStore {
        ParamStore::from_defs(&[
            ParamDef {
                name: "speed".into(),
                default: ParamValue::Float(0.0),
            },
            ParamDef {
                name: "jump".into(),
                default: ParamValue::Trigger(false),
            },
        ])
        .unwrap()
    }

    fn base_def() -> TransitionDef {
        TransitionDef {
            target: 1,
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
        }
    }

    #[test]
    fn window_gates_arming() {
        let mut def = base_def();
        def.window = Some(TimeWindow { min: 0.5, max: 0.9 });
        let tr = Transition::new(def);
        let p = params();
        assert!(!tr.satisfied(&p, 0.2, 0, false));
        assert!(tr.satisfied(&p, 0.7, 0, false));
        assert!(!tr.satisfied(&p, 0.95, 0, false));
    }

    #[test]
    fn cooldown_counts_frames() {
        let mut def = base_def();
        def.cooldown_frames = 3;
        let mut tr = Transition::new(def);
        let p = params();
        assert!(tr.satisfied(&p, 0.0, 10, false));
        tr.mark_triggered(10);
        assert!(!tr.satisfied(&p, 0.0, 11, false));
        assert!(!tr.satisfied(&p, 0.0, 12, false));
        assert!(tr.satisfied(&p, 0.0, 13, false));
    }

    #[test]
    fn trigger_peeked_then_consumed() {
        let mut def = base_def();
        let mut p = params();
        let jump = p.id_of("jump").unwrap();
        def.conditions = vec![ConditionDef::Trigger { param: jump }];
        let tr = Transition::new(def);
        assert!(!tr.satisfied(&p, 0.0, 0, false));
        p.arm(jump);
        // Peeking does not consume.
        assert!(tr.satisfied(&p, 0.0, 0, false));
        assert!(tr.satisfied(&p, 0.0, 0, false));
        tr.consume_triggers(&mut p);
        assert!(!tr.satisfied(&p, 0.0, 0, false));
    }

    #[test]
    fn remap_failure_unbinds() {
        let mut def = base_def();
        let mut p = params();
        let speed = p.id_of("speed").unwrap();
        def.conditions = vec![ConditionDef::Float {
            param: speed,
            op: CompareOp::Gt,
            value: 0.5,
        }];
        let mut tr = Transition::new(def);
        p.set_float(speed, 1.0);
        assert!(tr.conditions_met(&p));
        tr.remap_params(&|_| None);
        // Unbound reads neutral 0.0, so `> 0.5` no longer holds.
        assert!(!tr.conditions_met(&p));
    }
}
