//! Input contracts for the core engine.
//!
//! Hosts build and pass these into `Animator::update()` each tick. Commands
//! are applied synchronously at tick start, strictly before any motion job
//! is enqueued, so the tick's transition decisions see a stable parameter
//! snapshot.

use serde::{Deserialize, Serialize};

use crate::ids::{LayerId, ParamId};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Inputs {
    /// Parameter writes applied before stepping.
    #[serde(default)]
    pub param_cmds: Vec<ParamCommand>,
    /// Layer-level commands applied before stepping.
    #[serde(default)]
    pub layer_cmds: Vec<LayerCommand>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ParamCommand {
    SetFloat { param: ParamId, value: f32 },
    SetBool { param: ParamId, value: bool },
    ArmTrigger { param: ParamId },
    ResetToDefault { param: ParamId },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LayerCommand {
    SetWeight {
        layer: LayerId,
        weight: f32,
    },
    SetActive {
        layer: LayerId,
        active: bool,
    },
    /// Rewind the layer to a state (current state when None).
    Restart {
        layer: LayerId,
        state: Option<usize>,
    },
    /// Seek every node of the active chain back to normalized time 0
    /// without touching transition bookkeeping.
    Resync {
        layer: LayerId,
    },
}

impl Inputs {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.param_cmds.is_empty() && self.layer_cmds.is_empty()
    }
}
