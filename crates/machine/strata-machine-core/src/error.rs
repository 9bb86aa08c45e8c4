//! Error types for controller construction.
//!
//! Only setup failures surface here; everything inside the tick loop degrades
//! in place and is reported through `log` and `MachineEvent`s instead.

use serde::{Deserialize, Serialize};

/// Errors returned while parsing or instantiating a controller asset.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ControllerError {
    /// Controller defines no layers; there is nothing to instantiate.
    #[error("Controller '{name}' defines no layers")]
    EmptyController { name: String },

    /// Two parameters share the same name.
    #[error("Duplicate parameter name: {name}")]
    DuplicateParameter { name: String },

    /// A layer's entry-state index is outside its state array.
    #[error("Layer '{layer}' entry state {index} out of range ({count} states)")]
    EntryStateOutOfRange {
        layer: String,
        index: usize,
        count: usize,
    },

    /// A transition targets a state index outside the owning layer.
    #[error("Transition in layer '{layer}' state {state} targets missing state {target}")]
    TransitionTargetOutOfRange {
        layer: String,
        state: usize,
        target: usize,
    },

    /// Stored-controller JSON failed to parse.
    #[error("Controller parse error: {reason}")]
    ParseError { reason: String },

    /// Stored-controller document failed validation.
    #[error("Invalid controller: {reason}")]
    InvalidController { reason: String },
}
