//! Identifiers and simple allocators for core entities.

use serde::{Deserialize, Serialize};

/// Stable index of a parameter in the Parameter Store.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ParamId(pub u32);

/// Identifier of an authored motion node in a controller asset.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct MotionId(pub u32);

/// Index into a layer's instantiated motion-node array. Only meaningful for
/// the layer instance that produced it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub u32);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u32);

impl NodeIndex {
    #[inline]
    pub fn usize(self) -> usize {
        self.0 as usize
    }
}

/// Monotonic allocator for LayerId.
/// Dense indices improve cache locality; IDs are opaque externally.
#[derive(Default, Debug)]
pub struct IdAllocator {
    next_layer: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn alloc_layer(&mut self) -> LayerId {
        let id = LayerId(self.next_layer);
        self.next_layer = self.next_layer.wrapping_add(1);
        id
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_monotonic() {
        let mut alloc = IdAllocator::new();
        assert_eq!(alloc.alloc_layer(), LayerId(0));
        assert_eq!(alloc.alloc_layer(), LayerId(1));
        alloc.reset();
        assert_eq!(alloc.alloc_layer(), LayerId(0));
    }
}
