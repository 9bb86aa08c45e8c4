//! Canonical authored controller data model.
//!
//! A `ControllerDef` is the shared, immutable prototype: parameter defaults,
//! a flat arena of motion-node definitions addressed by `MotionId`, and the
//! per-layer state machines. Instantiation (`instancing.rs`) turns the parts
//! a layer references into a private runtime copy; nothing here is mutated
//! after authoring.

use serde::{Deserialize, Serialize};

use crate::error::ControllerError;
use crate::ids::{MotionId, ParamId};
use crate::params::{ParamDef, ParamValue};

/// Loop behavior of a clip node.
#[derive(Copy, Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum LoopMode {
    Once,
    Loop,
    PingPong,
}

/// Leaf motion node: a single animation clip reference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClipDef {
    /// Animation asset reference, resolved by the host when sampling.
    pub clip: String,
    /// Clip duration in seconds (asset metadata; authoritative for
    /// normalized-time math).
    pub duration: f32,
    pub looping: LoopMode,
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Optional parameter multiplying the base speed at playback time.
    #[serde(default)]
    pub speed_param: Option<ParamId>,
}

/// One child of a 1D blend node.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendChildDef {
    pub threshold: f32,
    pub motion: MotionId,
}

/// Interior motion node: weighted blend over children, driven by one
/// float parameter against an ordered threshold list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Blend1DDef {
    #[serde(default)]
    pub param: Option<ParamId>,
    pub children: Vec<BlendChildDef>,
}

/// Closed set of motion-node kinds. New kinds extend this enum; all of them
/// answer the same progress/child-indices contract at runtime.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionDef {
    Clip(ClipDef),
    Blend1D(Blend1DDef),
}

impl MotionDef {
    /// Motion ids referenced by this node, in declared order.
    pub fn child_ids(&self) -> Vec<MotionId> {
        match self {
            MotionDef::Clip(_) => Vec::new(),
            MotionDef::Blend1D(b) => b.children.iter().map(|c| c.motion).collect(),
        }
    }
}

/// Normalized-time window gating a transition.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub min: f32,
    pub max: f32,
}

/// When a transition parameter op fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpPhase {
    AtStart,
    AtEnd,
}

/// A parameter side-effect attached to a transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamOpDef {
    pub param: ParamId,
    pub value: ParamValue,
    pub phase: OpPhase,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// Parameter comparison gating a transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConditionDef {
    Float {
        param: ParamId,
        op: CompareOp,
        value: f32,
    },
    Bool {
        param: ParamId,
        value: bool,
    },
    /// Armed trigger; consumed exactly once when the transition arms.
    Trigger {
        param: ParamId,
    },
}

/// How the target's normalized time is force-set when a transition arms.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum TargetTime {
    /// Fixed normalized time.
    Fixed(f32),
    /// Mapped from the source's normalized time at arming.
    FromSource { scale: f32, offset: f32 },
}

/// Multipliers applied while syncing playback speeds across a crossfade.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpeedSyncDef {
    #[serde(default = "default_speed")]
    pub source_multiplier: f32,
    #[serde(default = "default_speed")]
    pub target_multiplier: f32,
}

/// Directed edge between two states of one layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitionDef {
    /// Target state index within the owning layer.
    pub target: usize,
    /// Crossfade duration in seconds.
    pub duration: f32,
    #[serde(default)]
    pub conditions: Vec<ConditionDef>,
    /// Source normalized-time window the transition may arm in.
    #[serde(default)]
    pub window: Option<TimeWindow>,
    /// Minimum frames between two armings of this transition.
    #[serde(default)]
    pub cooldown_frames: u64,
    /// Force the source's normalized time when arming.
    #[serde(default)]
    pub set_source_time: Option<f32>,
    /// Force the target's normalized time when arming.
    #[serde(default)]
    pub set_target_time: Option<TargetTime>,
    /// Only arms when the state is progressed as the head of the chain.
    #[serde(default)]
    pub must_be_first: bool,
    /// Permits the target to arm its own transition immediately on completion.
    #[serde(default)]
    pub allow_chaining: bool,
    /// Permits mid-flight cancellation and later reversion.
    #[serde(default)]
    pub allow_revert: bool,
    /// Remaining/total time multiplier applied when the transition cancels.
    #[serde(default = "default_speed")]
    pub cancel_time_scale: f32,
    /// Converge the two sides' effective playback speeds across the blend.
    #[serde(default)]
    pub speed_sync: Option<SpeedSyncDef>,
    #[serde(default)]
    pub param_ops: Vec<ParamOpDef>,
    /// Ops that take over when the transition cancels.
    #[serde(default)]
    pub cancel_param_ops: Vec<ParamOpDef>,
}

/// State-machine node: one motion plus its outgoing transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateDef {
    pub name: String,
    #[serde(default)]
    pub motion: Option<MotionId>,
    #[serde(default)]
    pub transitions: Vec<TransitionDef>,
}

/// An independently weighted animation track: motion graph + state machine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerDef {
    pub name: String,
    #[serde(default = "default_speed")]
    pub weight: f32,
    #[serde(default)]
    pub additive: bool,
    /// Optional parameter overriding the authored weight at runtime.
    #[serde(default)]
    pub blend_param: Option<ParamId>,
    /// Top-level motion identifiers declared by this layer, ordered.
    /// Nested children are collected during instantiation.
    pub motions: Vec<MotionId>,
    pub entry_state: usize,
    pub states: Vec<StateDef>,
}

/// Shared, immutable controller prototype.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControllerDef {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<ParamDef>,
    #[serde(default)]
    pub motions: Vec<MotionDef>,
    pub layers: Vec<LayerDef>,
}

fn default_speed() -> f32 {
    1.0
}

impl ControllerDef {
    pub fn motion(&self, id: MotionId) -> Option<&MotionDef> {
        self.motions.get(id.0 as usize)
    }

    /// Validate authored invariants: at least one layer, entry states and
    /// transition targets in range, blend thresholds non-decreasing,
    /// non-negative durations. Self-transitions are intentionally not
    /// rejected here; they are disabled (and logged) at instantiation so an
    /// authored asset with one bad edge still animates.
    pub fn validate_basic(&self) -> Result<(), ControllerError> {
        if self.layers.is_empty() {
            return Err(ControllerError::EmptyController {
                name: self.name.clone(),
            });
        }
        for motion in &self.motions {
            match motion {
                MotionDef::Clip(c) => {
                    if !c.duration.is_finite() || c.duration < 0.0 {
                        return Err(ControllerError::InvalidController {
                            reason: format!("clip '{}' has invalid duration {}", c.clip, c.duration),
                        });
                    }
                }
                MotionDef::Blend1D(b) => {
                    let mut last = -f32::INFINITY;
                    for child in &b.children {
                        if child.threshold < last {
                            return Err(ControllerError::InvalidController {
                                reason: "blend thresholds must be non-decreasing".into(),
                            });
                        }
                        last = child.threshold;
                    }
                }
            }
        }
        for layer in &self.layers {
            if layer.entry_state >= layer.states.len() {
                return Err(ControllerError::EntryStateOutOfRange {
                    layer: layer.name.clone(),
                    index: layer.entry_state,
                    count: layer.states.len(),
                });
            }
            for (si, state) in layer.states.iter().enumerate() {
                for t in &state.transitions {
                    if t.target >= layer.states.len() {
                        return Err(ControllerError::TransitionTargetOutOfRange {
                            layer: layer.name.clone(),
                            state: si,
                            target: t.target,
                        });
                    }
                    if !t.duration.is_finite() || t.duration < 0.0 {
                        return Err(ControllerError::InvalidController {
                            reason: format!(
                                "transition {} -> {} in layer '{}' has invalid duration",
                                si, t.target, layer.name
                            ),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
