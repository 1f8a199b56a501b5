//! Per-slot swap primitives.
//!
//! Each frame slot owns its own version, so writes never race with GPU work
//! from other slots. There is no guard: [`SwapPrimitive::reset`] and
//! [`SwapPrimitive::write`] must only be called for the slot that is
//! currently recording, and [`SwapPrimitive::reset_all`] only while no slot is.

use std::sync::Arc;

use frameflow_rhi::Backend;
use tracing::debug;

use crate::engine::EngineBase;
use crate::error::{EngineError, EngineResult};
use crate::frame::FrameSlot;
use crate::primitive::{Primitive, PrimitiveCell, PrimitiveKind};

/// Builds and updates the per-slot objects of a swap primitive.
pub trait SwapAllocator<B: Backend>: Send + Sync {
    type Object: Send + Sync + 'static;
    type Args;
    type WriteArgs;

    fn allocate(&self, engine: &EngineBase<B>, args: &Self::Args) -> EngineResult<Self::Object>;

    /// Updates `object` in place. Any commands needed to make the change
    /// visible are recorded into `slot`.
    fn write(
        &self,
        object: &Self::Object,
        slot: &FrameSlot<B>,
        args: Self::WriteArgs,
    ) -> EngineResult<()>;
}

/// One version per frame slot.
pub struct SwapPrimitive<B: Backend, A: SwapAllocator<B>> {
    engine: Arc<EngineBase<B>>,
    allocator: A,
    objects: Vec<Option<Arc<PrimitiveCell<A::Object>>>>,
}

impl<B: Backend, A: SwapAllocator<B>> SwapPrimitive<B, A> {
    /// Creates a primitive with no objects yet.
    pub fn new(engine: Arc<EngineBase<B>>, allocator: A) -> Self {
        let objects = (0..engine.frames_in_flight()).map(|_| None).collect();
        Self {
            engine,
            allocator,
            objects,
        }
    }

    #[inline]
    pub fn engine(&self) -> &Arc<EngineBase<B>> {
        &self.engine
    }

    pub fn get(&self, slot: usize) -> Option<Arc<PrimitiveCell<A::Object>>> {
        self.objects.get(slot).cloned().flatten()
    }

    /// Replaces the object of the active `slot`.
    pub fn reset(&mut self, slot: &FrameSlot<B>, args: A::Args) -> EngineResult<()> {
        debug_assert!(slot.is_active(), "reset outside slot {}'s active window", slot.index());
        let index = self.check_index(slot.index())?;
        let object = self.allocator.allocate(&self.engine, &args)?;
        self.objects[index] = Some(Arc::new(PrimitiveCell::new(object)));
        Ok(())
    }

    /// Rebuilds every slot's object from the same arguments. Nothing is
    /// replaced unless every allocation succeeds.
    pub fn reset_all(&mut self, args: &A::Args) -> EngineResult<()> {
        let fresh = (0..self.objects.len())
            .map(|_| {
                self.allocator
                    .allocate(&self.engine, args)
                    .map(|object| Some(Arc::new(PrimitiveCell::new(object))))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        self.objects = fresh;
        debug!("Swap primitive rebuilt for {} slots", self.objects.len());
        Ok(())
    }

    /// Writes into the active `slot`'s object in place.
    pub fn write(&self, slot: &FrameSlot<B>, args: A::WriteArgs) -> EngineResult<()> {
        debug_assert!(slot.is_active(), "write outside slot {}'s active window", slot.index());
        let index = self.check_index(slot.index())?;
        let object = self.objects[index].as_ref().ok_or_else(|| {
            EngineError::Primitive(format!("slot {} has no object to write", index))
        })?;
        self.allocator.write(object, slot, args)
    }

    fn check_index(&self, index: usize) -> EngineResult<usize> {
        if index < self.objects.len() {
            Ok(index)
        } else {
            Err(EngineError::Primitive(format!(
                "slot {} out of range for {} slots",
                index,
                self.objects.len()
            )))
        }
    }
}

impl<B: Backend, A: SwapAllocator<B>> Primitive for SwapPrimitive<B, A> {
    type Object = A::Object;

    const KIND: PrimitiveKind = PrimitiveKind::Swap;

    fn get(&self, slot: usize) -> Option<Arc<PrimitiveCell<A::Object>>> {
        SwapPrimitive::get(self, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::engine::FramedEngine;
    use frameflow_rhi::QueueCaps;
    use frameflow_rhi::headless::HeadlessBackend;
    use std::sync::Mutex;

    /// Objects are counters; writes add to them.
    struct Counters;

    impl SwapAllocator<HeadlessBackend> for Counters {
        type Object = Mutex<u32>;
        type Args = u32;
        type WriteArgs = u32;

        fn allocate(
            &self,
            _engine: &EngineBase<HeadlessBackend>,
            args: &u32,
        ) -> EngineResult<Mutex<u32>> {
            Ok(Mutex::new(*args))
        }

        fn write(
            &self,
            object: &Mutex<u32>,
            _slot: &FrameSlot<HeadlessBackend>,
            args: u32,
        ) -> EngineResult<()> {
            *object.lock().unwrap() += args;
            Ok(())
        }
    }

    fn value(swap: &SwapPrimitive<HeadlessBackend, Counters>, slot: usize) -> Option<u32> {
        swap.get(slot).map(|cell| *cell.lock().unwrap())
    }

    fn engine() -> FramedEngine<HeadlessBackend> {
        let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
        FramedEngine::create(&context, QueueCaps::UNIVERSAL, 2).unwrap()
    }

    #[test]
    fn test_reset_all_then_per_slot_write() {
        let mut engine = engine();
        let mut swap = SwapPrimitive::new(engine.base().clone(), Counters);
        assert_eq!(value(&swap, 0), None);
        swap.reset_all(&10).unwrap();

        let slot = engine.begin_current_slot().unwrap();
        swap.write(slot, 5).unwrap();
        engine.end_and_advance().unwrap();

        assert_eq!(value(&swap, 0), Some(15));
        assert_eq!(value(&swap, 1), Some(10));
    }

    #[test]
    fn test_reset_replaces_only_active_slot() {
        let mut engine = engine();
        let mut swap = SwapPrimitive::new(engine.base().clone(), Counters);
        swap.reset_all(&1).unwrap();
        let before = swap.get(0).unwrap();

        engine.begin_current_slot().unwrap();
        engine.end_and_advance().unwrap();
        let slot = engine.begin_current_slot().unwrap();
        swap.reset(slot, 7).unwrap();
        engine.end_and_advance().unwrap();

        assert!(Arc::ptr_eq(&before, &swap.get(0).unwrap()));
        assert_eq!(value(&swap, 1), Some(7));
    }

    #[test]
    fn test_write_without_object_fails() {
        let mut engine = engine();
        let swap = SwapPrimitive::new(engine.base().clone(), Counters);
        let slot = engine.begin_current_slot().unwrap();
        assert!(matches!(swap.write(slot, 1), Err(EngineError::Primitive(_))));
    }
}
