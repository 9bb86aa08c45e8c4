#![allow(dead_code)]
//! Strata Machine Core (engine-agnostic)
//!
//! Layered animation state machines over instanced motion-node graphs.
//! This crate defines the authored controller data model, per-instance
//! graph instantiation (clone, cycle rejection, reference dedup), the
//! transition/crossfade progression machine, the Parameter Store, and the
//! collaborator contracts for job scheduling and transform hierarchies.
//! Clip sampling itself happens host-side, behind the job contract.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod hierarchy;
pub mod ids;
pub mod inputs;
mod instancing;
pub mod jobs;
pub mod layer;
pub mod motion;
pub mod outputs;
pub mod params;
pub mod state;
pub mod stored_controller;
pub mod transition;

// Re-exports for consumers (adapters)
pub use config::Config;
pub use data::{
    Blend1DDef, BlendChildDef, ClipDef, CompareOp, ConditionDef, ControllerDef, LayerDef,
    LoopMode, MotionDef, OpPhase, ParamOpDef, SpeedSyncDef, StateDef, TargetTime, TimeWindow,
    TransitionDef,
};
pub use engine::Animator;
pub use error::ControllerError;
pub use hierarchy::{HierarchyProvider, NullHierarchy};
pub use ids::{IdAllocator, LayerId, MotionId, NodeIndex, ParamId};
pub use inputs::{Inputs, LayerCommand, ParamCommand};
pub use jobs::{InlineScheduler, JobHandle, JobScheduler, MotionJob};
pub use layer::Layer;
pub use motion::{MotionKind, MotionNode};
pub use outputs::{MachineEvent, Outputs};
pub use params::{ParamDef, ParamStore, ParamValue};
pub use state::{ActiveTransition, ProgressPhase, RuntimeState};
pub use stored_controller::parse_stored_controller_json;
pub use transition::Transition;
