//! Frame slot engine.
//!
//! [`EngineBase`] holds what every engine needs: its context, a queue from the
//! registry and a command pool on that queue's family. [`FramedEngine`] adds a
//! fixed ring of [`FrameSlot`]s cycled round-robin:
//!
//! ```text
//! begin_current_slot()  -> collect garbage, begin recording slot `current`
//! ... record, register primitives ...
//! end_and_advance()     -> end recording, current = (current + 1) % dynamic
//! ```

use std::sync::Arc;

use frameflow_core::MAX_FRAMES_IN_FLIGHT;
use frameflow_rhi::{Backend, QueueCaps};
use tracing::{debug, info, trace};

use crate::context::Context;
use crate::error::{EngineError, EngineResult};
use crate::frame::FrameSlot;
use crate::queue::Queue;

/// Context, queue and command pool of one engine.
///
/// Dropping the last reference frees the queue in the registry.
pub struct EngineBase<B: Backend> {
    context: Context<B>,
    queue: Arc<Queue<B>>,
    command_pool: B::CommandPool,
    frames_in_flight: usize,
}

impl<B: Backend> EngineBase<B> {
    /// Allocates a queue for `caps` and a command pool on its family.
    pub fn new(context: &Context<B>, caps: QueueCaps, frames_in_flight: usize) -> EngineResult<Self> {
        if frames_in_flight == 0 || frames_in_flight > MAX_FRAMES_IN_FLIGHT as usize {
            return Err(EngineError::Configuration(format!(
                "frames in flight must be between 1 and {}, got {}",
                MAX_FRAMES_IN_FLIGHT, frames_in_flight
            )));
        }

        let queue = context.allocate_queue(caps)?;
        let command_pool = match context.device().create_command_pool(queue.family()) {
            Ok(pool) => pool,
            Err(e) => {
                context.free_queue(&queue);
                return Err(e.into());
            }
        };

        debug!(
            "Engine base created on queue {}:{} with {} frames in flight",
            queue.family(),
            queue.index(),
            frames_in_flight
        );
        Ok(Self {
            context: context.clone(),
            queue,
            command_pool,
            frames_in_flight,
        })
    }

    #[inline]
    pub fn context(&self) -> &Context<B> {
        &self.context
    }

    #[inline]
    pub fn device(&self) -> &Arc<B> {
        self.context.device()
    }

    #[inline]
    pub fn queue(&self) -> &Arc<Queue<B>> {
        &self.queue
    }

    #[inline]
    pub fn command_pool(&self) -> &B::CommandPool {
        &self.command_pool
    }

    /// Number of frame slots allocated for this engine.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Blocks until the engine's queue has finished all submitted work.
    pub fn wait_idle(&self) -> EngineResult<()> {
        let queue = self.queue.acquire();
        self.device().queue_wait_idle(&queue)?;
        Ok(())
    }
}

impl<B: Backend> Drop for EngineBase<B> {
    fn drop(&mut self) {
        self.context.free_queue(&self.queue);
    }
}

/// Ring of frame slots over an [`EngineBase`].
pub struct FramedEngine<B: Backend> {
    base: Arc<EngineBase<B>>,
    slots: Vec<FrameSlot<B>>,
    current: usize,
    dynamic: usize,
}

impl<B: Backend> FramedEngine<B> {
    /// Allocates one command buffer per frame slot.
    pub fn new(base: Arc<EngineBase<B>>) -> EngineResult<Self> {
        let device = base.device();
        let slots = (0..base.frames_in_flight())
            .map(|index| -> EngineResult<FrameSlot<B>> {
                let commands = device.allocate_command_buffer(base.command_pool())?;
                Ok(FrameSlot::new(index, commands))
            })
            .collect::<EngineResult<Vec<_>>>()?;

        info!("Framed engine created with {} slots", slots.len());
        Ok(Self {
            dynamic: slots.len(),
            base,
            slots,
            current: 0,
        })
    }

    /// Builds the base and the ring in one step.
    pub fn create(context: &Context<B>, caps: QueueCaps, frames_in_flight: usize) -> EngineResult<Self> {
        Self::new(Arc::new(EngineBase::new(context, caps, frames_in_flight)?))
    }

    #[inline]
    pub fn base(&self) -> &Arc<EngineBase<B>> {
        &self.base
    }

    #[inline]
    pub fn current_slot_index(&self) -> usize {
        self.current
    }

    /// Number of slots currently in the rotation.
    #[inline]
    pub fn dynamic_count(&self) -> usize {
        self.dynamic
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot<B>> {
        self.slots.get(index)
    }

    pub fn current_slot(&self) -> &FrameSlot<B> {
        &self.slots[self.current]
    }

    /// Collects the current slot's garbage and begins recording into it.
    pub fn begin_current_slot(&mut self) -> EngineResult<&mut FrameSlot<B>> {
        let device = self.base.device().clone();
        let slot = &mut self.slots[self.current];
        slot.collect_garbage();
        device.begin_commands(slot.commands())?;
        slot.set_active(true);
        Ok(slot)
    }

    /// Ends recording of the current slot and advances. Returns the index of
    /// the slot that was ended.
    pub fn end_and_advance(&mut self) -> EngineResult<usize> {
        let index = self.current;
        let slot = &mut self.slots[index];
        if !slot.is_active() {
            return Err(EngineError::Configuration(format!(
                "slot {} ended without being begun",
                index
            )));
        }
        self.base.device().end_commands(slot.commands())?;
        slot.set_active(false);
        self.current = (index + 1) % self.dynamic;
        Ok(index)
    }

    /// Ends recording of the current slot without submitting or advancing,
    /// so the same slot is begun again on the next cycle.
    pub fn abandon_current_slot(&mut self) -> EngineResult<()> {
        let index = self.current;
        let slot = &mut self.slots[index];
        if !slot.is_active() {
            return Ok(());
        }
        slot.set_active(false);
        self.base.device().end_commands(slot.commands())?;
        trace!("Slot {} abandoned", index);
        Ok(())
    }

    /// Shrinks (or restores) the rotation to the first `count` slots.
    pub fn set_dynamic_count(&mut self, count: usize) -> EngineResult<()> {
        if count == 0 || count > self.slots.len() {
            return Err(EngineError::Configuration(format!(
                "dynamic slot count must be between 1 and {}, got {}",
                self.slots.len(),
                count
            )));
        }
        self.dynamic = count;
        if self.current >= count {
            self.current = 0;
        }
        debug!("Dynamic slot count set to {}", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameflow_rhi::headless::HeadlessBackend;

    fn engine(frames: usize) -> FramedEngine<HeadlessBackend> {
        let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
        FramedEngine::create(&context, QueueCaps::UNIVERSAL, frames).unwrap()
    }

    fn cycle(engine: &mut FramedEngine<HeadlessBackend>) -> usize {
        engine.begin_current_slot().unwrap();
        engine.end_and_advance().unwrap()
    }

    #[test]
    fn test_abandoned_slot_is_reused() {
        let mut engine = engine(2);
        engine.begin_current_slot().unwrap();
        engine.abandon_current_slot().unwrap();
        assert!(!engine.current_slot().is_active());
        assert_eq!(engine.current_slot_index(), 0);
        assert!(engine.end_and_advance().is_err());
        assert_eq!(cycle(&mut engine), 0);
        assert_eq!(engine.current_slot_index(), 1);
    }

    #[test]
    fn test_slots_cycle_round_robin() {
        let mut engine = engine(3);
        let order: Vec<usize> = (0..7).map(|_| cycle(&mut engine)).collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(engine.current_slot_index(), 7 % 3);
    }

    #[test]
    fn test_dynamic_count_shrinks_rotation() {
        let mut engine = engine(3);
        cycle(&mut engine);
        cycle(&mut engine);
        assert_eq!(engine.current_slot_index(), 2);

        engine.set_dynamic_count(2).unwrap();
        assert_eq!(engine.current_slot_index(), 0);
        for m in 1..=5 {
            cycle(&mut engine);
            assert_eq!(engine.current_slot_index(), m % 2);
        }

        assert!(engine.set_dynamic_count(0).is_err());
        assert!(engine.set_dynamic_count(4).is_err());
    }

    #[test]
    fn test_end_without_begin_is_rejected() {
        let mut engine = engine(2);
        assert!(matches!(
            engine.end_and_advance(),
            Err(EngineError::Configuration(_))
        ));
        assert_eq!(engine.current_slot_index(), 0);
    }

    #[test]
    fn test_invalid_frames_in_flight() {
        let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
        assert!(EngineBase::new(&context, QueueCaps::UNIVERSAL, 0).is_err());
        assert!(EngineBase::new(&context, QueueCaps::UNIVERSAL, 9).is_err());
        assert_eq!(context.claimed_queue_count(), 0);
    }

    #[test]
    fn test_dropping_engine_frees_queue() {
        let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
        let engine = FramedEngine::create(&context, QueueCaps::UNIVERSAL, 2).unwrap();
        assert_eq!(context.claimed_queue_count(), 1);
        drop(engine);
        assert_eq!(context.claimed_queue_count(), 0);
    }
}
