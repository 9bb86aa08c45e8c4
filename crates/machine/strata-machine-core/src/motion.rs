//! Runtime motion nodes: the things a state plays.
//!
//! Nodes live in the owning layer's flat `Vec<Option<MotionNode>>`; a `None`
//! slot is a node that was nulled out during instantiation (cyclic branch).
//! Child references are plain `NodeIndex` values into that array, so the
//! graph can be walked and mutated without pointers. After the dedup passes
//! every node has at most one parent, which is what makes the index-based
//! recursion below safe.

use serde::{Deserialize, Serialize};

use crate::data::{LoopMode, MotionDef};
use crate::ids::{LayerId, NodeIndex, ParamId};
use crate::jobs::{JobHandle, JobScheduler, MotionJob};
use crate::params::ParamStore;

/// One child slot of a blend node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendEntry {
    pub threshold: f32,
    pub child: NodeIndex,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionKind {
    Clip {
        clip: String,
        duration: f32,
        looping: LoopMode,
        speed: f32,
        speed_param: Option<ParamId>,
    },
    Blend1D {
        param: Option<ParamId>,
        entries: Vec<BlendEntry>,
    },
}

/// A motion node instance with its private playback cursor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionNode {
    pub kind: MotionKind,
    /// Accumulated local playback time in seconds (raw; loop mapping is
    /// applied when emitting jobs).
    pub time: f32,
    /// Contribution weight computed on the last advance.
    pub weight: f32,
    pub initialized: bool,
}

pub(crate) fn fmod(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        return 0.0;
    }
    let m = a % b;
    if (m < 0.0 && b > 0.0) || (m > 0.0 && b < 0.0) {
        m + b
    } else {
        m
    }
}

/// Reflect t into [0, span] with ping-pong behavior, where period = 2 * span.
pub(crate) fn ping_pong(t: f32, span: f32) -> f32 {
    if span <= 0.0 {
        return 0.0;
    }
    let period = 2.0 * span;
    let m = fmod(t, period);
    if m < 0.0 {
        let mm = m + period;
        if mm <= span {
            mm
        } else {
            period - mm
        }
    } else if m <= span {
        m
    } else {
        period - m
    }
}

impl MotionNode {
    /// Clone a prototype definition into a runtime node. Child references
    /// still carry the authored `MotionId` values; `remap_children` rewrites
    /// them into array indices during the clone pass.
    pub fn from_def(def: &MotionDef) -> Self {
        let kind = match def {
            MotionDef::Clip(c) => MotionKind::Clip {
                clip: c.clip.clone(),
                duration: c.duration,
                looping: c.looping,
                speed: c.speed,
                speed_param: c.speed_param,
            },
            MotionDef::Blend1D(b) => MotionKind::Blend1D {
                param: b.param,
                entries: b
                    .children
                    .iter()
                    .map(|c| BlendEntry {
                        threshold: c.threshold,
                        child: NodeIndex(c.motion.0),
                    })
                    .collect(),
            },
        };
        Self {
            kind,
            time: 0.0,
            weight: 0.0,
            initialized: false,
        }
    }

    /// Child indices in declared order.
    pub fn child_indices(&self) -> Vec<NodeIndex> {
        match &self.kind {
            MotionKind::Clip { .. } => Vec::new(),
            MotionKind::Blend1D { entries, .. } => entries.iter().map(|e| e.child).collect(),
        }
    }

    /// Rewrite child references through `remap`. Entries that fail to remap
    /// are dropped; the caller has already logged the missing identifier.
    pub fn remap_children(&mut self, remap: impl Fn(NodeIndex) -> Option<NodeIndex>) {
        if let MotionKind::Blend1D { entries, .. } = &mut self.kind {
            entries.retain_mut(|e| match remap(e.child) {
                Some(new) => {
                    e.child = new;
                    true
                }
                None => false,
            });
        }
    }

    /// Remap exactly one child slot (used by the dedup pass when a clone is
    /// appended for a second referencer).
    pub fn remap_one_child(&mut self, from: NodeIndex, to: NodeIndex) {
        if let MotionKind::Blend1D { entries, .. } = &mut self.kind {
            if let Some(e) = entries.iter_mut().find(|e| e.child == from) {
                e.child = to;
            }
        }
    }

    /// Rewrite parameter references through `remap`; failed lookups become
    /// unbound (speed multipliers fall back to 1.0, blend inputs to 0.0).
    pub fn remap_params(&mut self, remap: &impl Fn(ParamId) -> Option<ParamId>) {
        match &mut self.kind {
            MotionKind::Clip { speed_param, .. } => {
                *speed_param = speed_param.and_then(remap);
            }
            MotionKind::Blend1D { param, .. } => {
                *param = param.and_then(remap);
            }
        }
    }

    /// Acquire playback state against the owning layer: rewind the cursor
    /// and apply the configured loop mode.
    pub fn initialize(&mut self) {
        self.time = 0.0;
        self.weight = 0.0;
        self.initialized = true;
    }

    pub fn reset(&mut self) {
        self.time = 0.0;
        self.weight = 0.0;
    }

    /// Base speed times the optional speed-multiplier parameter. An unbound
    /// multiplier reads as 1.0 so a missing parameter never freezes playback.
    pub fn effective_speed(&self, params: &ParamStore) -> f32 {
        match &self.kind {
            MotionKind::Clip {
                speed, speed_param, ..
            } => {
                let mul = speed_param
                    .and_then(|p| params.float_opt(p))
                    .unwrap_or(1.0);
                speed * mul
            }
            MotionKind::Blend1D { .. } => 1.0,
        }
    }

    /// Map the raw cursor into clip-local time per loop mode.
    fn local_time(&self, can_loop: bool) -> f32 {
        match &self.kind {
            MotionKind::Clip {
                duration, looping, ..
            } => {
                if *duration <= 0.0 {
                    return 0.0;
                }
                if !can_loop {
                    return self.time.clamp(0.0, *duration);
                }
                match looping {
                    LoopMode::Once => self.time.clamp(0.0, *duration),
                    LoopMode::Loop => fmod(self.time, *duration),
                    LoopMode::PingPong => ping_pong(self.time, *duration),
                }
            }
            MotionKind::Blend1D { .. } => self.time,
        }
    }
}

/// Effective duration of the subtree at `index`: clip duration for leaves,
/// longest child for blends. Missing/nulled slots read 0.
pub(crate) fn node_duration(nodes: &[Option<MotionNode>], index: NodeIndex) -> f32 {
    let node = match nodes.get(index.usize()).and_then(|n| n.as_ref()) {
        Some(n) => n,
        None => return 0.0,
    };
    match &node.kind {
        MotionKind::Clip { duration, .. } => *duration,
        MotionKind::Blend1D { entries, .. } => entries
            .iter()
            .map(|e| node_duration(nodes, e.child))
            .fold(0.0, f32::max),
    }
}

/// Normalized playback time of the subtree at `index` in [0,1].
pub(crate) fn node_normalized_time(nodes: &[Option<MotionNode>], index: NodeIndex) -> f32 {
    let node = match nodes.get(index.usize()).and_then(|n| n.as_ref()) {
        Some(n) => n,
        None => return 0.0,
    };
    let duration = node_duration(nodes, index);
    if duration <= 0.0 {
        return 0.0;
    }
    (node.local_time(true) / duration).clamp(0.0, 1.0)
}

/// Seek the subtree at `index` to normalized time `u`, keeping children in
/// step with their parent.
pub(crate) fn seek_normalized(nodes: &mut [Option<MotionNode>], index: NodeIndex, u: f32) {
    let duration = node_duration(nodes, index);
    let children = match nodes.get_mut(index.usize()).and_then(|n| n.as_mut()) {
        Some(node) => {
            node.time = u.clamp(0.0, 1.0) * duration;
            node.child_indices()
        }
        None => return,
    };
    for child in children {
        seek_normalized(nodes, child, u);
    }
}

/// Rewind the subtree at `index`.
pub(crate) fn reset_subtree(nodes: &mut [Option<MotionNode>], index: NodeIndex) {
    let children = match nodes.get_mut(index.usize()).and_then(|n| n.as_mut()) {
        Some(node) => {
            node.reset();
            node.child_indices()
        }
        None => return,
    };
    for child in children {
        reset_subtree(nodes, child);
    }
}

/// Context for one node advance: everything that does not change during the
/// recursion.
pub(crate) struct AdvanceCtx<'a> {
    pub layer: LayerId,
    pub layer_weight: f32,
    pub additive: bool,
    pub params: &'a ParamStore,
}

/// Advance the subtree at `index` by `dt` and enqueue sampling jobs for every
/// clip with nonzero contribution. Zero-weight children still advance so
/// their cursors stay deterministic; they just schedule nothing. Returns the
/// combined handle for all work scheduled under this subtree.
pub(crate) fn progress_node(
    nodes: &mut [Option<MotionNode>],
    index: NodeIndex,
    dt: f32,
    weight: f32,
    can_loop: bool,
    ctx: &AdvanceCtx<'_>,
    sched: &mut dyn JobScheduler,
) -> JobHandle {
    let node = match nodes.get_mut(index.usize()).and_then(|n| n.as_mut()) {
        Some(n) => n,
        None => return JobHandle::NONE,
    };
    node.weight = weight;

    match &node.kind {
        MotionKind::Clip { clip, duration, .. } => {
            let clip = clip.clone();
            let duration = *duration;
            let speed = node.effective_speed(ctx.params);
            node.time += dt * speed;
            if !can_loop {
                // Hold at the clip bounds while looping is suppressed.
                node.time = node.time.clamp(0.0, duration);
            }
            let local = node.local_time(can_loop);
            let job_weight = weight * ctx.layer_weight;
            if job_weight <= 0.0 {
                return JobHandle::NONE;
            }
            sched.schedule(MotionJob {
                layer: ctx.layer,
                node: index,
                clip,
                time: local,
                normalized_time: if duration > 0.0 {
                    (local / duration).clamp(0.0, 1.0)
                } else {
                    0.0
                },
                weight: job_weight,
                additive: ctx.additive,
            })
        }
        MotionKind::Blend1D { param, entries } => {
            let value = param
                .and_then(|p| ctx.params.float_opt(p))
                .unwrap_or(0.0);
            let entries = entries.clone();
            node.time += dt;
            let weights = blend_weights(&entries, value);
            let mut handle = JobHandle::NONE;
            for (entry, w) in entries.iter().zip(weights) {
                let child =
                    progress_node(nodes, entry.child, dt, weight * w, can_loop, ctx, sched);
                handle = sched.combine(handle, child);
            }
            handle
        }
    }
}

/// Per-child weights for a 1D blend: full weight at or outside the extreme
/// thresholds, linear split between the two bracketing children elsewhere.
fn blend_weights(entries: &[BlendEntry], value: f32) -> Vec<f32> {
    let mut weights = vec![0.0; entries.len()];
    if entries.is_empty() {
        return weights;
    }
    if value <= entries[0].threshold {
        weights[0] = 1.0;
        return weights;
    }
    let last = entries.len() - 1;
    if value >= entries[last].threshold {
        weights[last] = 1.0;
        return weights;
    }
    for i in 0..last {
        let lo = entries[i].threshold;
        let hi = entries[i + 1].threshold;
        if value >= lo && value <= hi {
            let span = hi - lo;
            let t = if span > 0.0 { (value - lo) / span } else { 1.0 };
            weights[i] = 1.0 - t;
            weights[i + 1] = t;
            return weights;
        }
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(threshold: f32, child: u32) -> BlendEntry {
        BlendEntry {
            threshold,
            child: NodeIndex(child),
        }
    }

    #[test]
    fn blend_weights_bracket_and_clamp() {
        let entries = [entry(0.0, 0), entry(1.0, 1), entry(2.0, 2)];
        assert_eq!(blend_weights(&entries, -1.0), vec![1.0, 0.0, 0.0]);
        assert_eq!(blend_weights(&entries, 5.0), vec![0.0, 0.0, 1.0]);
        let w = blend_weights(&entries, 0.25);
        assert!((w[0] - 0.75).abs() < 1e-6);
        assert!((w[1] - 0.25).abs() < 1e-6);
        assert_eq!(w[2], 0.0);
    }

    #[test]
    fn ping_pong_reflects() {
        assert!((ping_pong(0.25, 1.0) - 0.25).abs() < 1e-6);
        assert!((ping_pong(1.25, 1.0) - 0.75).abs() < 1e-6);
        assert!((ping_pong(2.25, 1.0) - 0.25).abs() < 1e-6);
    }
}
