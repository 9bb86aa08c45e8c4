//! Layers: the unit of instancing and per-frame progression.
//!
//! A layer exclusively owns its instantiated motion-node and state arrays;
//! nothing aliases the prototype or sibling instances. The Parameter Store
//! stays with the Animator and is passed in per tick.

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::data::ControllerDef;
use crate::hierarchy::HierarchyProvider;
use crate::ids::{LayerId, NodeIndex, ParamId};
use crate::instancing::instantiate_graph;
use crate::jobs::{JobHandle, JobScheduler};
use crate::motion::{self, MotionNode};
use crate::outputs::Outputs;
use crate::params::ParamStore;
use crate::state::{progress_chain, ProgressArgs, ProgressCtx, RuntimeState};

#[derive(Debug, Serialize, Deserialize)]
pub struct Layer {
    pub id: LayerId,
    pub name: String,
    weight: f32,
    additive: bool,
    active: bool,
    disposed: bool,
    blend_param: Option<ParamId>,
    entry_state: usize,
    /// Active-state cursor: head of the progression chain.
    current: usize,
    nodes: Vec<Option<MotionNode>>,
    states: Vec<RuntimeState>,
}

impl Layer {
    /// Instantiate one layer from the controller prototype. Structural
    /// problems in the graph degrade in place (see `instancing`); the layer
    /// always comes back usable.
    pub(crate) fn instantiate(
        controller: &ControllerDef,
        def_index: usize,
        id: LayerId,
        config: &Config,
        outputs: &mut Outputs,
    ) -> Self {
        let def = &controller.layers[def_index];
        let (nodes, states) = instantiate_graph(controller, def, id, config, outputs);
        let entry_state = if def.entry_state < states.len() {
            def.entry_state
        } else {
            log::warn!(
                "layer '{}': entry state {} out of range; starting at 0",
                def.name,
                def.entry_state
            );
            0
        };
        Self {
            id,
            name: def.name.clone(),
            weight: def.weight,
            additive: def.additive,
            active: true,
            disposed: false,
            blend_param: def.blend_param,
            entry_state,
            current: entry_state,
            nodes,
            states,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active && !self.disposed
    }

    pub fn set_active(&mut self, active: bool) {
        if !self.disposed {
            self.active = active;
        }
    }

    #[inline]
    pub fn is_additive(&self) -> bool {
        self.additive
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_weight(&mut self, weight: f32) {
        if !self.disposed {
            self.weight = weight.clamp(0.0, 1.0);
        }
    }

    /// Authored weight, overridden by the blend parameter when one is bound.
    pub fn effective_weight(&self, params: &ParamStore) -> f32 {
        if !self.is_active() {
            return 0.0;
        }
        match self.blend_param {
            Some(p) => params.float_opt(p).unwrap_or(self.weight).clamp(0.0, 1.0),
            None => self.weight,
        }
    }

    /// Advance the layer by `dt`, resolving transitions and scheduling
    /// motion jobs. Returns the combined handle for this layer's work.
    /// Hosts normally drive this through `Animator::update`, which supplies
    /// the collaborators and the frame counter.
    #[allow(clippy::too_many_arguments)]
    pub fn progress(
        &mut self,
        dt: f32,
        next_hierarchy: Option<usize>,
        next_is_blended: bool,
        skip_if_derivative: bool,
        frame: u64,
        params: &mut ParamStore,
        sched: &mut dyn JobScheduler,
        hierarchy: &dyn HierarchyProvider,
        outputs: &mut Outputs,
    ) -> JobHandle {
        if !self.is_active() {
            return JobHandle::NONE;
        }
        let layer_weight = self.effective_weight(params);
        let mut ctx = ProgressCtx {
            layer: self.id,
            layer_weight,
            additive: self.additive,
            frame,
            params,
            sched,
            hierarchy,
            outputs,
        };
        let args = ProgressArgs {
            next_hierarchy,
            next_is_blended,
            skip_if_derivative,
            dt,
            allow_transitions: true,
            is_transition_target: false,
            can_loop: true,
        };
        let (next, handle) = progress_chain(&mut self.states, &mut self.nodes, self.current, args, &mut ctx);
        self.current = next;
        handle
    }

    // ---- state queries and seeks ------------------------------------------

    #[inline]
    pub fn current_state(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn entry_state(&self) -> usize {
        self.entry_state
    }

    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s.name == name)
    }

    pub fn state(&self, index: usize) -> Option<&RuntimeState> {
        self.states.get(index)
    }

    pub fn states(&self) -> &[RuntimeState] {
        &self.states
    }

    pub fn nodes(&self) -> &[Option<MotionNode>] {
        &self.nodes
    }

    pub fn node(&self, index: NodeIndex) -> Option<&MotionNode> {
        self.nodes.get(index.usize()).and_then(|n| n.as_ref())
    }

    /// Local playback time of a state's motion, in seconds. Disposed layers
    /// and empty states read 0.
    pub fn state_time(&self, index: usize) -> f32 {
        self.states
            .get(index)
            .and_then(|s| s.node)
            .and_then(|n| self.node(n))
            .map(|n| n.time)
            .unwrap_or(0.0)
    }

    pub fn state_normalized_time(&self, index: usize) -> f32 {
        self.states
            .get(index)
            .and_then(|s| s.node)
            .map(|n| motion::node_normalized_time(&self.nodes, n))
            .unwrap_or(0.0)
    }

    pub fn set_state_time(&mut self, index: usize, seconds: f32) {
        if let Some(root) = self.states.get(index).and_then(|s| s.node) {
            let duration = motion::node_duration(&self.nodes, root);
            let u = if duration > 0.0 {
                (seconds / duration).clamp(0.0, 1.0)
            } else {
                0.0
            };
            motion::seek_normalized(&mut self.nodes, root, u);
        }
    }

    pub fn set_state_normalized_time(&mut self, index: usize, u: f32) {
        if let Some(root) = self.states.get(index).and_then(|s| s.node) {
            motion::seek_normalized(&mut self.nodes, root, u);
        }
    }

    /// Rewind to `state` (current state when None): clears every in-flight
    /// transition and resets the new head's motion.
    pub fn restart(&mut self, state: Option<usize>) {
        if self.disposed {
            return;
        }
        let target = state.unwrap_or(self.current);
        if target >= self.states.len() {
            return;
        }
        for s in &mut self.states {
            s.active = None;
            s.weight = 0.0;
        }
        self.current = target;
        if let Some(root) = self.states[target].node {
            motion::reset_subtree(&mut self.nodes, root);
        }
        self.states[target].weight = 1.0;
    }

    /// Seek every node of the active chain back to normalized time 0,
    /// leaving transition bookkeeping alone.
    pub fn resync(&mut self) {
        if self.disposed {
            return;
        }
        let mut index = self.current;
        let mut hops = 0;
        loop {
            let (root, next) = match self.states.get(index) {
                Some(s) => (s.node, s.active.as_ref().map(|a| a.target)),
                None => break,
            };
            if let Some(root) = root {
                motion::seek_normalized(&mut self.nodes, root, 0.0);
            }
            match next {
                // Chains are finite; the hop cap guards a corrupt cycle.
                Some(next) if hops < self.states.len() => {
                    index = next;
                    hops += 1;
                }
                _ => break,
            }
        }
    }

    /// Re-derive which node is logically longest running, for
    /// hierarchy-derivative comparisons: the longest-duration subtree along
    /// the active chain.
    pub fn longest_node(&self) -> Option<NodeIndex> {
        let mut best: Option<(NodeIndex, f32)> = None;
        let mut index = self.current;
        let mut hops = 0;
        loop {
            let state = match self.states.get(index) {
                Some(s) => s,
                None => break,
            };
            if let Some(root) = state.node {
                let d = motion::node_duration(&self.nodes, root);
                if best.map(|(_, bd)| d > bd).unwrap_or(true) {
                    best = Some((root, d));
                }
            }
            match state.active.as_ref().map(|a| a.target) {
                Some(next) if hops < self.states.len() => {
                    index = next;
                    hops += 1;
                }
                _ => break,
            }
        }
        best.map(|(n, _)| n)
    }

    /// Rewrite every parameter reference held by this layer through `remap`,
    /// atomically: references that fail to remap become unbound.
    pub fn remap_parameters(&mut self, remap: &impl Fn(ParamId) -> Option<ParamId>) {
        self.blend_param = self.blend_param.and_then(remap);
        for state in &mut self.states {
            for tr in &mut state.transitions {
                tr.remap_params(remap);
            }
        }
        for node in self.nodes.iter_mut().flatten() {
            node.remap_params(remap);
        }
    }

    /// Release all owned motion nodes and playback state. Safe to call more
    /// than once; every operation on a disposed layer is a no-op returning
    /// defaults.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.active = false;
        self.nodes.clear();
        for state in &mut self.states {
            state.active = None;
            state.node = None;
            state.weight = 0.0;
        }
    }
}
