//! GPU-backed objects that stay valid while frames reference them.
//!
//! A primitive's current version lives in a [`PrimitiveCell`]. Frame slots
//! register cells they read through the type-erased [`AnyPrimitive`] view,
//! which carries the per-slot registration ids. Two update strategies exist:
//! - [`CowPrimitive`]: one version shared by every slot, replaced by a
//!   deferred three-stage reset
//! - [`SwapPrimitive`]: one version per slot, replaced or written in place
//!   only while that slot is active

mod completion;
mod cow;
mod swap;

use std::any::{Any, type_name};
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};

use smallvec::SmallVec;

use crate::error::{EngineError, EngineResult};

pub use completion::{Completion, CompletionSignal};
pub use cow::{CowAllocator, CowAwaitInit, CowPrimitive, CowPublish, CowReset};
pub use swap::{SwapAllocator, SwapPrimitive};

/// Registration ids of one primitive in each frame slot. Id 0 means "not
/// registered".
#[derive(Debug, Default)]
pub struct SlotIds(Mutex<SmallVec<[u32; 3]>>);

impl SlotIds {
    pub fn get(&self, slot: usize) -> u32 {
        let ids = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        ids.get(slot).copied().unwrap_or(0)
    }

    pub fn set(&self, slot: usize, id: u32) {
        let mut ids = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if ids.len() <= slot {
            ids.resize(slot + 1, 0);
        }
        ids[slot] = id;
    }

    /// Clears the id for `slot` if it is still `id`.
    pub fn clear(&self, slot: usize, id: u32) {
        let mut ids = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = ids.get_mut(slot)
            && *current == id
        {
            *current = 0;
        }
    }
}

/// Type-erased view of a primitive version.
pub trait AnyPrimitive: Any + Send + Sync {
    fn slot_ids(&self) -> &SlotIds;

    /// Name of the payload type, for diagnostics.
    fn type_name(&self) -> &'static str;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Reference-counted, type-erased primitive version.
pub type PrimitiveHandle = Arc<dyn AnyPrimitive>;

/// One version of a primitive's backing object.
#[derive(Debug)]
pub struct PrimitiveCell<T> {
    slot_ids: SlotIds,
    value: T,
}

impl<T: Send + Sync + 'static> PrimitiveCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            slot_ids: SlotIds::default(),
            value,
        }
    }

    /// Erases the payload type.
    pub fn handle(self: &Arc<Self>) -> PrimitiveHandle {
        self.clone()
    }
}

impl<T> Deref for PrimitiveCell<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Send + Sync + 'static> AnyPrimitive for PrimitiveCell<T> {
    fn slot_ids(&self) -> &SlotIds {
        &self.slot_ids
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Recovers the typed cell behind a handle.
pub fn downcast<T: Send + Sync + 'static>(
    handle: &PrimitiveHandle,
) -> EngineResult<Arc<PrimitiveCell<T>>> {
    let found = handle.type_name();
    handle
        .clone()
        .into_any()
        .downcast::<PrimitiveCell<T>>()
        .map_err(|_| {
            EngineError::Primitive(format!(
                "expected primitive of type {}, found {}",
                type_name::<T>(),
                found
            ))
        })
}

/// Update strategy of a primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    CopyOnWrite,
    Swap,
}

/// Read access shared by both strategies.
pub trait Primitive {
    type Object: Send + Sync + 'static;

    const KIND: PrimitiveKind;

    /// The version visible to frame slot `slot`.
    fn get(&self, slot: usize) -> Option<Arc<PrimitiveCell<Self::Object>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_ids_grow_and_clear() {
        let ids = SlotIds::default();
        assert_eq!(ids.get(5), 0);
        ids.set(5, 9);
        assert_eq!(ids.get(5), 9);
        ids.clear(5, 3);
        assert_eq!(ids.get(5), 9);
        ids.clear(5, 9);
        assert_eq!(ids.get(5), 0);
    }

    #[test]
    fn test_checked_downcast() {
        let cell = Arc::new(PrimitiveCell::new(42u32));
        let handle = cell.handle();
        assert_eq!(handle.type_name(), "u32");

        let typed = downcast::<u32>(&handle).unwrap();
        assert!(Arc::ptr_eq(&typed, &cell));
        assert_eq!(**typed, 42);

        let err = downcast::<String>(&handle).unwrap_err();
        assert!(matches!(err, EngineError::Primitive(_)));
    }
}
