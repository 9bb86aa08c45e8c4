//! Parse StoredController-style JSON into the canonical `ControllerDef`.
//!
//! The stored format references parameters by name; this loader resolves
//! every reference against the document's parameter table and fails the
//! whole document on unknown names, so a controller that loads is fully
//! bound. Runtime lookups still degrade gracefully; strictness here is a
//! property of the asset path only.

use hashbrown::HashMap;
use serde::Deserialize;

use crate::data::{
    Blend1DDef, BlendChildDef, ClipDef, CompareOp, ConditionDef, ControllerDef, LayerDef,
    LoopMode, MotionDef, OpPhase, ParamOpDef, SpeedSyncDef, StateDef, TargetTime, TimeWindow,
    TransitionDef,
};
use crate::error::ControllerError;
use crate::ids::{MotionId, ParamId};
use crate::params::{ParamDef, ParamValue};

/// Public API: parse a stored controller document into `ControllerDef`.
pub fn parse_stored_controller_json(s: &str) -> Result<ControllerDef, ControllerError> {
    let raw: StoredController = serde_json::from_str(s).map_err(|e| ControllerError::ParseError {
        reason: e.to_string(),
    })?;

    let mut parameters = Vec::with_capacity(raw.parameters.len());
    let mut by_name: HashMap<String, ParamId> = HashMap::with_capacity(raw.parameters.len());
    for p in &raw.parameters {
        let default = match p.kind.as_str() {
            "float" => ParamValue::Float(p.default.and_then(RawScalar::as_float).unwrap_or(0.0)),
            "bool" => ParamValue::Bool(p.default.and_then(RawScalar::as_bool).unwrap_or(false)),
            "trigger" => ParamValue::Trigger(false),
            other => {
                return Err(ControllerError::InvalidController {
                    reason: format!("parameter '{}' has unknown type '{other}'", p.name),
                })
            }
        };
        by_name.insert(p.name.clone(), ParamId(parameters.len() as u32));
        parameters.push(ParamDef {
            name: p.name.clone(),
            default,
        });
    }

    let resolve = |name: &str| -> Result<ParamId, ControllerError> {
        by_name
            .get(name)
            .copied()
            .ok_or_else(|| ControllerError::InvalidController {
                reason: format!("unknown parameter '{name}'"),
            })
    };

    let mut motions = Vec::with_capacity(raw.motions.len());
    for m in &raw.motions {
        motions.push(match m {
            RawMotion::Clip {
                clip,
                duration,
                looping,
                speed,
                speed_param,
            } => MotionDef::Clip(ClipDef {
                clip: clip.clone(),
                duration: *duration,
                looping: LoopMode::from(looping.as_str()),
                speed: speed.unwrap_or(1.0),
                speed_param: speed_param.as_deref().map(&resolve).transpose()?,
            }),
            RawMotion::Blend1d { param, children } => MotionDef::Blend1D(Blend1DDef {
                param: param.as_deref().map(&resolve).transpose()?,
                children: children
                    .iter()
                    .map(|c| BlendChildDef {
                        threshold: c.threshold,
                        motion: MotionId(c.motion),
                    })
                    .collect(),
            }),
        });
    }

    let mut layers = Vec::with_capacity(raw.layers.len());
    for l in &raw.layers {
        let mut states = Vec::with_capacity(l.states.len());
        for s in &l.states {
            let mut transitions = Vec::with_capacity(s.transitions.len());
            for t in &s.transitions {
                transitions.push(TransitionDef {
                    target: t.target,
                    duration: t.duration,
                    conditions: t
                        .conditions
                        .iter()
                        .map(|c| to_condition(c, &resolve))
                        .collect::<Result<_, _>>()?,
                    window: t.window.map(|w| TimeWindow { min: w.min, max: w.max }),
                    cooldown_frames: t.cooldown_frames,
                    set_source_time: t.set_source_time,
                    set_target_time: t.set_target_time.as_ref().map(to_target_time),
                    must_be_first: t.must_be_first,
                    allow_chaining: t.allow_chaining,
                    allow_revert: t.allow_revert,
                    cancel_time_scale: t.cancel_time_scale.unwrap_or(1.0),
                    speed_sync: t.speed_sync.map(|s| SpeedSyncDef {
                        source_multiplier: s.source_multiplier.unwrap_or(1.0),
                        target_multiplier: s.target_multiplier.unwrap_or(1.0),
                    }),
                    param_ops: t
                        .param_ops
                        .iter()
                        .map(|op| to_param_op(op, &resolve))
                        .collect::<Result<_, _>>()?,
                    cancel_param_ops: t
                        .cancel_param_ops
                        .iter()
                        .map(|op| to_param_op(op, &resolve))
                        .collect::<Result<_, _>>()?,
                });
            }
            states.push(StateDef {
                name: s.name.clone(),
                motion: s.motion.map(MotionId),
                transitions,
            });
        }
        layers.push(LayerDef {
            name: l.name.clone(),
            weight: l.weight.unwrap_or(1.0),
            additive: l.additive,
            blend_param: l.blend_param.as_deref().map(&resolve).transpose()?,
            motions: l.motions.iter().map(|&m| MotionId(m)).collect(),
            entry_state: l.entry_state,
            states,
        });
    }

    let def = ControllerDef {
        name: raw.name,
        parameters,
        motions,
        layers,
    };
    def.validate_basic()?;
    Ok(def)
}

fn to_condition(
    raw: &RawCondition,
    resolve: &impl Fn(&str) -> Result<ParamId, ControllerError>,
) -> Result<ConditionDef, ControllerError> {
    let param = resolve(&raw.param)?;
    match raw.kind.as_str() {
        "float" => Ok(ConditionDef::Float {
            param,
            op: to_compare_op(raw.op.as_deref().unwrap_or("gt"))?,
            value: raw.value.and_then(RawScalar::as_float).unwrap_or(0.0),
        }),
        "bool" => Ok(ConditionDef::Bool {
            param,
            value: raw.value.and_then(RawScalar::as_bool).unwrap_or(true),
        }),
        "trigger" => Ok(ConditionDef::Trigger { param }),
        other => Err(ControllerError::InvalidController {
            reason: format!("unknown condition kind '{other}'"),
        }),
    }
}

fn to_compare_op(s: &str) -> Result<CompareOp, ControllerError> {
    match s {
        "eq" => Ok(CompareOp::Eq),
        "ne" => Ok(CompareOp::Ne),
        "gt" => Ok(CompareOp::Gt),
        "lt" => Ok(CompareOp::Lt),
        "ge" => Ok(CompareOp::Ge),
        "le" => Ok(CompareOp::Le),
        other => Err(ControllerError::InvalidController {
            reason: format!("unknown comparison '{other}'"),
        }),
    }
}

fn to_param_op(
    raw: &RawParamOp,
    resolve: &impl Fn(&str) -> Result<ParamId, ControllerError>,
) -> Result<ParamOpDef, ControllerError> {
    let param = resolve(&raw.param)?;
    let value = if raw.arm {
        ParamValue::Trigger(true)
    } else {
        match raw.value {
            Some(RawScalar::Bool(b)) => ParamValue::Bool(b),
            Some(RawScalar::Number(n)) => ParamValue::Float(n as f32),
            None => ParamValue::Float(0.0),
        }
    };
    let phase = match raw.phase.as_str() {
        "start" => OpPhase::AtStart,
        "end" => OpPhase::AtEnd,
        other => {
            return Err(ControllerError::InvalidController {
                reason: format!("unknown op phase '{other}'"),
            })
        }
    };
    Ok(ParamOpDef {
        param,
        value,
        phase,
    })
}

fn to_target_time(raw: &RawTargetTime) -> TargetTime {
    match raw {
        RawTargetTime::Fixed(u) => TargetTime::Fixed(*u),
        RawTargetTime::FromSource { scale, offset } => TargetTime::FromSource {
            scale: scale.unwrap_or(1.0),
            offset: offset.unwrap_or(0.0),
        },
    }
}

impl From<&str> for LoopMode {
    fn from(s: &str) -> Self {
        match s {
            "once" => Self::Once,
            "loop" => Self::Loop,
            "ping_pong" => Self::PingPong,
            // Default to looping for unknown modes; clips that should hold
            // are expected to say so.
            _ => Self::Loop,
        }
    }
}

// ---- raw serde mirror of the stored format --------------------------------

#[derive(Debug, Deserialize)]
struct StoredController {
    name: String,
    #[serde(default)]
    parameters: Vec<RawParameter>,
    #[serde(default)]
    motions: Vec<RawMotion>,
    layers: Vec<RawLayer>,
}

#[derive(Debug, Deserialize)]
struct RawParameter {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    default: Option<RawScalar>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Bool(bool),
    Number(f64),
}

impl RawScalar {
    fn as_float(self) -> Option<f32> {
        match self {
            RawScalar::Number(n) => Some(n as f32),
            RawScalar::Bool(_) => None,
        }
    }

    fn as_bool(self) -> Option<bool> {
        match self {
            RawScalar::Bool(b) => Some(b),
            RawScalar::Number(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum RawMotion {
    Clip {
        clip: String,
        duration: f32,
        #[serde(rename = "loop", default = "default_loop")]
        looping: String,
        #[serde(default)]
        speed: Option<f32>,
        #[serde(rename = "speedParam", default)]
        speed_param: Option<String>,
    },
    Blend1d {
        #[serde(default)]
        param: Option<String>,
        children: Vec<RawBlendChild>,
    },
}

fn default_loop() -> String {
    "loop".to_string()
}

#[derive(Debug, Deserialize)]
struct RawBlendChild {
    threshold: f32,
    motion: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLayer {
    name: String,
    #[serde(default)]
    weight: Option<f32>,
    #[serde(default)]
    additive: bool,
    #[serde(default)]
    blend_param: Option<String>,
    motions: Vec<u32>,
    entry_state: usize,
    states: Vec<RawState>,
}

#[derive(Debug, Deserialize)]
struct RawState {
    name: String,
    #[serde(default)]
    motion: Option<u32>,
    #[serde(default)]
    transitions: Vec<RawTransition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransition {
    target: usize,
    duration: f32,
    #[serde(default)]
    conditions: Vec<RawCondition>,
    #[serde(default)]
    window: Option<RawWindow>,
    #[serde(default)]
    cooldown_frames: u64,
    #[serde(default)]
    set_source_time: Option<f32>,
    #[serde(default)]
    set_target_time: Option<RawTargetTime>,
    #[serde(default)]
    must_be_first: bool,
    #[serde(default)]
    allow_chaining: bool,
    #[serde(default)]
    allow_revert: bool,
    #[serde(default)]
    cancel_time_scale: Option<f32>,
    #[serde(default)]
    speed_sync: Option<RawSpeedSync>,
    #[serde(default)]
    param_ops: Vec<RawParamOp>,
    #[serde(default)]
    cancel_param_ops: Vec<RawParamOp>,
}

#[derive(Debug, Deserialize)]
struct RawCondition {
    #[serde(rename = "kind")]
    kind: String,
    param: String,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    value: Option<RawScalar>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct RawWindow {
    min: f32,
    max: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum RawTargetTime {
    Fixed(f32),
    FromSource {
        #[serde(default)]
        scale: Option<f32>,
        #[serde(default)]
        offset: Option<f32>,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpeedSync {
    #[serde(default)]
    source_multiplier: Option<f32>,
    #[serde(default)]
    target_multiplier: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct RawParamOp {
    param: String,
    #[serde(default)]
    value: Option<RawScalar>,
    #[serde(default)]
    arm: bool,
    phase: String,
}
