//! Output contracts from the core engine.
//!
//! Outputs carry the semantic events of one tick: state-machine milestones
//! and structural degradations. Pose data never flows through here; it is
//! produced by the host once the tick's job handle completes.

use serde::{Deserialize, Serialize};

use crate::ids::{LayerId, NodeIndex};

/// Discrete semantic signals emitted during stepping.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[non_exhaustive]
pub enum MachineEvent {
    TransitionStarted {
        layer: LayerId,
        from: usize,
        to: usize,
    },
    TransitionCancelled {
        layer: LayerId,
        from: usize,
        to: usize,
    },
    TransitionReverted {
        layer: LayerId,
        from: usize,
        to: usize,
    },
    TransitionCompleted {
        layer: LayerId,
        from: usize,
        to: usize,
    },
    StateEntered {
        layer: LayerId,
        state: usize,
    },
    /// A cyclic motion-node branch was nulled out during instantiation.
    CycleDetected {
        layer: LayerId,
        node: NodeIndex,
    },
    /// The dedup pass hit its ceiling; the pre-dedup array was kept.
    DuplicationOverflow {
        layer: LayerId,
    },
    /// A transition targeting its own state was disabled.
    SelfTransition {
        layer: LayerId,
        state: usize,
    },
    /// A transition referencing a missing state was disabled.
    MissingTransitionTarget {
        layer: LayerId,
        state: usize,
        target: usize,
    },
    /// Catch-all for non-fatal structural problems.
    Error {
        message: String,
    },
}

/// Outputs accumulated over one `Animator::update()` call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub events: Vec<MachineEvent>,
    /// Events beyond the per-tick cap are counted here instead of retained.
    #[serde(default)]
    pub dropped_events: usize,
    #[serde(skip)]
    cap: usize,
}

impl Default for Outputs {
    fn default() -> Self {
        Self::with_cap(usize::MAX)
    }
}

impl Outputs {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            events: Vec::new(),
            dropped_events: 0,
            cap,
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
        self.dropped_events = 0;
    }

    #[inline]
    pub fn push_event(&mut self, event: MachineEvent) {
        if self.events.len() < self.cap {
            self.events.push(event);
        } else {
            self.dropped_events += 1;
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
