//! Animator: data ownership and the public tick API.
//!
//! The animator owns the Parameter Store and the ordered layer list cloned
//! out of a controller prototype. `update` applies inputs synchronously,
//! then progresses layers in order, threading job handles through and
//! returning one combined handle the caller completes before reading pose
//! data. Parameter reads that drive transition decisions all happen before
//! the first job is enqueued.

use crate::config::Config;
use crate::data::ControllerDef;
use crate::error::ControllerError;
use crate::hierarchy::HierarchyProvider;
use crate::ids::{IdAllocator, LayerId, ParamId};
use crate::inputs::{Inputs, LayerCommand, ParamCommand};
use crate::jobs::{JobHandle, JobScheduler};
use crate::layer::Layer;
use crate::outputs::Outputs;
use crate::params::ParamStore;

#[derive(Debug)]
pub struct Animator {
    cfg: Config,
    params: ParamStore,
    layers: Vec<Layer>,
    ids: IdAllocator,
    /// Monotonically increasing tick counter, passed explicitly into every
    /// cooldown check so the engine stays deterministic without a frame
    /// clock.
    frame: u64,
    outputs: Outputs,
}

impl Animator {
    /// Instantiate a controller with the default config.
    pub fn instantiate(controller: &ControllerDef) -> Result<Self, ControllerError> {
        Self::with_config(controller, Config::default())
    }

    /// Instantiate a controller: clone the parameter defaults and build a
    /// private layer instance per authored layer. Only an unusable
    /// controller (no layers, duplicate parameter names) fails here;
    /// structural graph problems degrade per layer and surface as events
    /// (readable via `outputs()` until the first update). Strict asset
    /// validation lives on the stored-controller path.
    pub fn with_config(controller: &ControllerDef, cfg: Config) -> Result<Self, ControllerError> {
        if controller.layers.is_empty() {
            return Err(ControllerError::EmptyController {
                name: controller.name.clone(),
            });
        }
        let params = ParamStore::from_defs(&controller.parameters)?;
        let mut outputs = Outputs::with_cap(cfg.max_events_per_tick);
        let mut ids = IdAllocator::new();
        let layers = (0..controller.layers.len())
            .map(|i| Layer::instantiate(controller, i, ids.alloc_layer(), &cfg, &mut outputs))
            .collect();
        Ok(Self {
            cfg,
            params,
            layers,
            ids,
            frame: 0,
            outputs,
        })
    }

    #[inline]
    pub fn params(&self) -> &ParamStore {
        &self.params
    }

    #[inline]
    pub fn params_mut(&mut self) -> &mut ParamStore {
        &mut self.params
    }

    #[inline]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn layer_mut(&mut self, id: LayerId) -> Option<&mut Layer> {
        self.layers.iter_mut().find(|l| l.id == id)
    }

    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.name == name)
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    /// Step the simulation by dt: apply inputs, then progress layers in
    /// order. Returns this tick's events plus the combined handle for all
    /// scheduled motion work.
    pub fn update(
        &mut self,
        dt: f32,
        inputs: Inputs,
        sched: &mut dyn JobScheduler,
        hierarchy: &dyn HierarchyProvider,
    ) -> (&Outputs, JobHandle) {
        self.outputs.clear();
        self.frame = self.frame.wrapping_add(1);

        // 1) Commands, strictly before any job is enqueued.
        self.apply_inputs(inputs);

        // 2) Progress layers in order, combining handles.
        let mut handle = JobHandle::NONE;
        for i in 0..self.layers.len() {
            let (next_hierarchy, next_is_blended) = self.next_overwriter(i, hierarchy);
            let layer = &mut self.layers[i];
            let h = layer.progress(
                dt,
                next_hierarchy,
                next_is_blended,
                true,
                self.frame,
                &mut self.params,
                sched,
                hierarchy,
                &mut self.outputs,
            );
            handle = sched.combine(handle, h);
        }

        (&self.outputs, handle)
    }

    /// Hierarchy written by the first later layer that fully replaces output
    /// (non-additive, nonzero weight), and whether that layer is itself
    /// blended (a blended overwrite keeps this layer's output visible).
    fn next_overwriter(
        &self,
        index: usize,
        hierarchy: &dyn HierarchyProvider,
    ) -> (Option<usize>, bool) {
        for later in &self.layers[index + 1..] {
            if !later.is_active() || later.is_additive() {
                continue;
            }
            let w = later.effective_weight(&self.params);
            if w <= 0.0 {
                continue;
            }
            return (hierarchy.longest_hierarchy_index(later.id), w < 1.0);
        }
        (None, false)
    }

    fn apply_inputs(&mut self, inputs: Inputs) {
        for cmd in inputs.param_cmds {
            match cmd {
                ParamCommand::SetFloat { param, value } => self.params.set_float(param, value),
                ParamCommand::SetBool { param, value } => self.params.set_bool(param, value),
                ParamCommand::ArmTrigger { param } => self.params.arm(param),
                ParamCommand::ResetToDefault { param } => self.params.reset_to_default(param),
            }
        }
        for cmd in inputs.layer_cmds {
            match cmd {
                LayerCommand::SetWeight { layer, weight } => {
                    if let Some(l) = self.layer_mut(layer) {
                        l.set_weight(weight);
                    }
                }
                LayerCommand::SetActive { layer, active } => {
                    if let Some(l) = self.layer_mut(layer) {
                        l.set_active(active);
                    }
                }
                LayerCommand::Restart { layer, state } => {
                    if let Some(l) = self.layer_mut(layer) {
                        l.restart(state);
                    }
                }
                LayerCommand::Resync { layer } => {
                    if let Some(l) = self.layer_mut(layer) {
                        l.resync();
                    }
                }
            }
        }
    }

    /// Trigger convenience passthroughs keyed by name.
    pub fn param_id(&self, name: &str) -> Option<ParamId> {
        self.params.id_of(name)
    }

    /// Dispose every layer. Idempotent; a disposed animator still answers
    /// queries with defaults.
    pub fn dispose(&mut self) {
        for layer in &mut self.layers {
            layer.dispose();
        }
    }
}
