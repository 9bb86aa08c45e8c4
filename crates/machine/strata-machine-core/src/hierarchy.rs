//! Transform-hierarchy collaborator contract.
//!
//! The core only asks two questions: which hierarchy a layer drives for the
//! longest-running comparison, and whether one hierarchy's output is fully
//! overwritten by another. Both feed the derivative-skip optimization; the
//! core never mutates hierarchy data.

use crate::ids::LayerId;

pub trait HierarchyProvider {
    /// Index of the longest-running transform hierarchy driven by `layer`,
    /// or None when the layer drives nothing this tick.
    fn longest_hierarchy_index(&self, layer: LayerId) -> Option<usize>;

    /// Whether writes to `hierarchy` are fully overwritten by a later write
    /// to `other`.
    fn is_derivative(&self, hierarchy: usize, other: usize) -> bool;
}

/// Provider with no hierarchy knowledge: nothing is ever derivative, so no
/// advance is ever skipped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHierarchy;

impl HierarchyProvider for NullHierarchy {
    fn longest_hierarchy_index(&self, _layer: LayerId) -> Option<usize> {
        None
    }

    fn is_derivative(&self, _hierarchy: usize, _other: usize) -> bool {
        false
    }
}
