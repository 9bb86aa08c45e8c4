//! Parameter Store: named float/boolean/trigger variables read by transition
//! conditions and blend math.
//!
//! Lookups by a stale or unbound id return neutral values (0.0 / false)
//! instead of failing; mutation happens only through the store's own
//! operations so layers can share it read-mostly during a tick.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::ControllerError;
use crate::ids::ParamId;

/// Current value of a parameter. Triggers carry their armed flag.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f32),
    Bool(bool),
    Trigger(bool),
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::Float(0.0)
    }
}

impl ParamValue {
    #[inline]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Trigger(_) => "trigger",
        }
    }
}

/// Authored parameter definition: name plus default value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamDef {
    pub name: String,
    pub default: ParamValue,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Param {
    name: String,
    value: ParamValue,
    default: ParamValue,
}

/// Owned by the Animator; referenced by layers, states, and transitions.
/// Cloning a store yields fully independent parameter instances.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParamStore {
    params: Vec<Param>,
    by_name: HashMap<String, ParamId>,
}

impl ParamStore {
    /// Build a store from authored definitions. Duplicate names are a
    /// construction error; everything downstream assumes name uniqueness.
    pub fn from_defs(defs: &[ParamDef]) -> Result<Self, ControllerError> {
        let mut store = Self::default();
        for def in defs {
            if store.by_name.contains_key(&def.name) {
                return Err(ControllerError::DuplicateParameter {
                    name: def.name.clone(),
                });
            }
            let id = ParamId(store.params.len() as u32);
            store.by_name.insert(def.name.clone(), id);
            store.params.push(Param {
                name: def.name.clone(),
                value: def.default,
                default: def.default,
            });
        }
        Ok(store)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn id_of(&self, name: &str) -> Option<ParamId> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: ParamId) -> Option<&str> {
        self.params.get(id.0 as usize).map(|p| p.name.as_str())
    }

    /// Read a float parameter; unbound ids and non-float parameters read 0.0.
    pub fn float(&self, id: Option<ParamId>) -> f32 {
        match self.value(id) {
            Some(ParamValue::Float(v)) => v,
            _ => 0.0,
        }
    }

    /// Read a boolean parameter; unbound ids and non-bool parameters read false.
    pub fn boolean(&self, id: Option<ParamId>) -> bool {
        match self.value(id) {
            Some(ParamValue::Bool(v)) => v,
            _ => false,
        }
    }

    /// Read a float parameter, distinguishing "bound and float" from
    /// everything else. Callers with a non-zero neutral (speed multipliers)
    /// use this instead of `float`.
    pub fn float_opt(&self, id: ParamId) -> Option<f32> {
        match self.value(Some(id)) {
            Some(ParamValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    /// Whether a trigger is currently armed, without consuming it.
    pub fn trigger_armed(&self, id: Option<ParamId>) -> bool {
        matches!(self.value(id), Some(ParamValue::Trigger(true)))
    }

    fn value(&self, id: Option<ParamId>) -> Option<ParamValue> {
        id.and_then(|id| self.params.get(id.0 as usize))
            .map(|p| p.value)
    }

    pub fn set_float(&mut self, id: ParamId, value: f32) {
        if let Some(p) = self.params.get_mut(id.0 as usize) {
            if matches!(p.value, ParamValue::Float(_)) {
                p.value = ParamValue::Float(value);
            } else {
                log::debug!("set_float on non-float parameter '{}'", p.name);
            }
        }
    }

    pub fn set_bool(&mut self, id: ParamId, value: bool) {
        if let Some(p) = self.params.get_mut(id.0 as usize) {
            if matches!(p.value, ParamValue::Bool(_)) {
                p.value = ParamValue::Bool(value);
            } else {
                log::debug!("set_bool on non-bool parameter '{}'", p.name);
            }
        }
    }

    /// Arm a trigger. No-op on unbound ids or non-trigger parameters.
    pub fn arm(&mut self, id: ParamId) {
        if let Some(p) = self.params.get_mut(id.0 as usize) {
            if matches!(p.value, ParamValue::Trigger(_)) {
                p.value = ParamValue::Trigger(true);
            } else {
                log::debug!("arm on non-trigger parameter '{}'", p.name);
            }
        }
    }

    /// Mutating read of a trigger: returns true and clears exactly once.
    pub fn try_consume(&mut self, id: Option<ParamId>) -> bool {
        let id = match id {
            Some(id) => id,
            None => return false,
        };
        match self.params.get_mut(id.0 as usize) {
            Some(p) => match p.value {
                ParamValue::Trigger(true) => {
                    p.value = ParamValue::Trigger(false);
                    true
                }
                _ => false,
            },
            None => false,
        }
    }

    /// Apply a raw value, used by transition parameter-state-changes.
    /// The new value must match the parameter's kind; mismatches are dropped.
    pub fn apply(&mut self, id: ParamId, value: ParamValue) {
        match value {
            ParamValue::Float(v) => self.set_float(id, v),
            ParamValue::Bool(v) => self.set_bool(id, v),
            ParamValue::Trigger(true) => self.arm(id),
            ParamValue::Trigger(false) => {
                if let Some(p) = self.params.get_mut(id.0 as usize) {
                    if matches!(p.value, ParamValue::Trigger(_)) {
                        p.value = ParamValue::Trigger(false);
                    }
                }
            }
        }
    }

    pub fn reset_to_default(&mut self, id: ParamId) {
        if let Some(p) = self.params.get_mut(id.0 as usize) {
            p.value = p.default;
        }
    }
}
