//! Ready-made allocator policies for host-visible buffers holding one
//! plain-old-data value.

use std::marker::PhantomData;
use std::mem::size_of;
use std::sync::Arc;

use bytemuck::Pod;
use frameflow_rhi::{Backend, BufferUsage};

use crate::engine::EngineBase;
use crate::error::EngineResult;
use crate::frame::FrameSlot;
use crate::primitive::{Completion, CowAllocator, SwapAllocator};

/// A host-visible buffer sized for one `T`.
pub struct HostBuffer<B: Backend, T> {
    device: Arc<B>,
    buffer: B::Buffer,
    _value: PhantomData<fn(T)>,
}

impl<B: Backend, T: Pod> HostBuffer<B, T> {
    fn create(device: &Arc<B>, usage: BufferUsage, value: Option<&T>) -> EngineResult<Self> {
        let buffer = device.create_buffer(size_of::<T>() as u64, usage)?;
        if let Some(value) = value {
            device.write_buffer(&buffer, 0, bytemuck::bytes_of(value))?;
        }
        Ok(Self {
            device: device.clone(),
            buffer,
            _value: PhantomData,
        })
    }

    #[inline]
    pub fn buffer(&self) -> &B::Buffer {
        &self.buffer
    }

    /// Overwrites the whole buffer with `value`.
    pub fn write(&self, value: &T) -> EngineResult<()> {
        self.device
            .write_buffer(&self.buffer, 0, bytemuck::bytes_of(value))?;
        Ok(())
    }
}

/// Copy-on-write policy: every reset creates a new buffer initialized with
/// the given value.
pub struct HostBufferCow<T> {
    usage: BufferUsage,
    _value: PhantomData<fn(T)>,
}

impl<T> HostBufferCow<T> {
    pub fn new(usage: BufferUsage) -> Self {
        Self {
            usage,
            _value: PhantomData,
        }
    }
}

impl<B: Backend, T: Pod + Send + Sync> CowAllocator<B> for HostBufferCow<T> {
    type Object = HostBuffer<B, T>;
    type Args = T;

    fn allocate(&self, engine: &EngineBase<B>, args: T) -> EngineResult<(HostBuffer<B, T>, Completion)> {
        let buffer = HostBuffer::create(engine.device(), self.usage, Some(&args))?;
        Ok((buffer, Completion::ready()))
    }
}

/// Swap policy: one zeroed buffer per slot, written in place each frame.
pub struct HostBufferSwap<T> {
    usage: BufferUsage,
    _value: PhantomData<fn(T)>,
}

impl<T> HostBufferSwap<T> {
    pub fn new(usage: BufferUsage) -> Self {
        Self {
            usage,
            _value: PhantomData,
        }
    }
}

impl<B: Backend, T: Pod + Send + Sync> SwapAllocator<B> for HostBufferSwap<T> {
    type Object = HostBuffer<B, T>;
    type Args = ();
    type WriteArgs = T;

    fn allocate(&self, engine: &EngineBase<B>, _args: &()) -> EngineResult<HostBuffer<B, T>> {
        HostBuffer::create(engine.device(), self.usage, None)
    }

    fn write(
        &self,
        object: &HostBuffer<B, T>,
        _slot: &FrameSlot<B>,
        args: T,
    ) -> EngineResult<()> {
        object.write(&args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::engine::FramedEngine;
    use crate::primitive::{CowPrimitive, SwapPrimitive};
    use frameflow_rhi::QueueCaps;
    use frameflow_rhi::headless::HeadlessBackend;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Tint {
        rgba: [f32; 4],
    }

    fn engine() -> FramedEngine<HeadlessBackend> {
        let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
        FramedEngine::create(&context, QueueCaps::UNIVERSAL, 2).unwrap()
    }

    #[test]
    fn test_cow_buffer_holds_initial_value() {
        let engine = engine();
        let cow = CowPrimitive::new(
            engine.base().clone(),
            HostBufferCow::<Tint>::new(BufferUsage::Uniform),
        );
        let tint = Tint {
            rgba: [0.1, 0.2, 0.3, 1.0],
        };
        cow.reset(tint).run().unwrap();

        let cell = cow.get().unwrap();
        let contents = cell.buffer().contents();
        assert_eq!(contents.as_slice(), bytemuck::bytes_of(&tint));
    }

    #[test]
    fn test_swap_buffer_written_per_slot() {
        let mut engine = engine();
        let mut swap = SwapPrimitive::new(
            engine.base().clone(),
            HostBufferSwap::<u32>::new(BufferUsage::Uniform),
        );
        swap.reset_all(&()).unwrap();

        let slot = engine.begin_current_slot().unwrap();
        swap.write(slot, 0xdead_beef).unwrap();
        engine.end_and_advance().unwrap();

        let written = swap.get(0).unwrap().buffer().contents();
        let untouched = swap.get(1).unwrap().buffer().contents();
        assert_eq!(written, 0xdead_beef_u32.to_ne_bytes().to_vec());
        assert_eq!(untouched, vec![0; 4]);
    }
}
