//! Copy-on-write primitives.
//!
//! Every frame slot sees the same version. A reset is a three-stage pipeline
//! that does nothing until driven:
//!
//! ```text
//! CowReset::allocate()   -> construct the object, get its init completion
//! CowAwaitInit::wait()   -> wait for initialization
//! CowPublish::publish()  -> swap it in under the guard, then drop the old one
//! ```
//!
//! Stages may run on different threads. Only the swap holds the guard, so
//! concurrent resets never block each other while constructing, and the
//! published version is the one whose wait finished last, not the one issued
//! last.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frameflow_rhi::Backend;
use tracing::trace;

use crate::engine::EngineBase;
use crate::error::EngineResult;
use crate::executor::Executor;
use crate::primitive::{Completion, Primitive, PrimitiveCell, PrimitiveKind};

/// Builds new versions of a copy-on-write primitive.
pub trait CowAllocator<B: Backend>: Send + Sync + 'static {
    type Object: Send + Sync + 'static;
    type Args: Send + 'static;

    /// Constructs a new object. The completion covers any initialization the
    /// call started but did not finish; synchronous allocators return
    /// [`Completion::ready`].
    fn allocate(
        &self,
        engine: &EngineBase<B>,
        args: Self::Args,
    ) -> EngineResult<(Self::Object, Completion)>;
}

type Version<T> = Option<Arc<PrimitiveCell<T>>>;

struct Shared<B: Backend, A: CowAllocator<B>> {
    engine: Arc<EngineBase<B>>,
    allocator: A,
    current: Mutex<Version<A::Object>>,
}

impl<B: Backend, A: CowAllocator<B>> Shared<B, A> {
    fn current(&self) -> MutexGuard<'_, Version<A::Object>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swaps in `next` and hands back the previous version after the guard
    /// has been released.
    fn replace(&self, next: Version<A::Object>) -> Version<A::Object> {
        std::mem::replace(&mut *self.current(), next)
    }
}

/// One version shared by all frame slots.
pub struct CowPrimitive<B: Backend, A: CowAllocator<B>> {
    shared: Arc<Shared<B, A>>,
}

impl<B: Backend, A: CowAllocator<B>> Clone for CowPrimitive<B, A> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B: Backend, A: CowAllocator<B>> CowPrimitive<B, A> {
    /// Creates an empty primitive.
    pub fn new(engine: Arc<EngineBase<B>>, allocator: A) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                allocator,
                current: Mutex::new(None),
            }),
        }
    }

    #[inline]
    pub fn engine(&self) -> &Arc<EngineBase<B>> {
        &self.shared.engine
    }

    /// The published version, if any.
    pub fn get(&self) -> Option<Arc<PrimitiveCell<A::Object>>> {
        self.shared.current().clone()
    }

    /// Prepares a reset. Nothing runs until the returned pipeline is driven.
    pub fn reset(&self, args: A::Args) -> CowReset<B, A> {
        CowReset {
            shared: self.shared.clone(),
            args,
        }
    }

    /// Publishes "no object". The previous version is dropped after the guard
    /// is released.
    pub fn clear(&self) {
        let stale = self.shared.replace(None);
        drop(stale);
        trace!("Copy-on-write primitive cleared");
    }
}

impl<B: Backend, A: CowAllocator<B>> Primitive for CowPrimitive<B, A> {
    type Object = A::Object;

    const KIND: PrimitiveKind = PrimitiveKind::CopyOnWrite;

    fn get(&self, _slot: usize) -> Option<Arc<PrimitiveCell<A::Object>>> {
        CowPrimitive::get(self)
    }
}

/// Stage 1 of a reset: allocation.
#[must_use = "a reset does nothing until it is driven"]
pub struct CowReset<B: Backend, A: CowAllocator<B>> {
    shared: Arc<Shared<B, A>>,
    args: A::Args,
}

impl<B: Backend, A: CowAllocator<B>> CowReset<B, A> {
    pub fn allocate(self) -> EngineResult<CowAwaitInit<B, A>> {
        let (object, completion) = self.shared.allocator.allocate(&self.shared.engine, self.args)?;
        Ok(CowAwaitInit {
            shared: self.shared,
            object,
            completion,
        })
    }

    /// Drives all three stages on the calling thread.
    pub fn run(self) -> EngineResult<()> {
        self.allocate()?.wait()?.publish();
        Ok(())
    }

    /// Drives all three stages as one job on `executor`.
    pub fn spawn_on<E: Executor>(self, executor: &E) -> Completion {
        let (signal, completion) = Completion::channel();
        executor.execute(move || signal.finish(self.run()));
        completion
    }
}

/// Stage 2 of a reset: waiting for initialization.
#[must_use = "a reset does nothing until it is driven"]
pub struct CowAwaitInit<B: Backend, A: CowAllocator<B>> {
    shared: Arc<Shared<B, A>>,
    object: A::Object,
    completion: Completion,
}

impl<B: Backend, A: CowAllocator<B>> CowAwaitInit<B, A> {
    pub fn wait(self) -> EngineResult<CowPublish<B, A>> {
        self.completion.wait()?;
        Ok(CowPublish {
            shared: self.shared,
            object: self.object,
        })
    }
}

/// Stage 3 of a reset: publication.
#[must_use = "a reset does nothing until it is driven"]
pub struct CowPublish<B: Backend, A: CowAllocator<B>> {
    shared: Arc<Shared<B, A>>,
    object: A::Object,
}

impl<B: Backend, A: CowAllocator<B>> CowPublish<B, A> {
    pub fn publish(self) {
        let fresh = Arc::new(PrimitiveCell::new(self.object));
        let stale = self.shared.replace(Some(fresh));
        drop(stale);
        trace!("Copy-on-write primitive published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::error::EngineError;
    use crate::executor::Immediate;
    use frameflow_rhi::QueueCaps;
    use frameflow_rhi::headless::HeadlessBackend;

    struct Numbers;

    impl CowAllocator<HeadlessBackend> for Numbers {
        type Object = u32;
        type Args = u32;

        fn allocate(
            &self,
            _engine: &EngineBase<HeadlessBackend>,
            args: u32,
        ) -> EngineResult<(u32, Completion)> {
            if args == 0 {
                return Err(EngineError::Primitive("zero".to_string()));
            }
            Ok((args, Completion::ready()))
        }
    }

    fn primitive() -> CowPrimitive<HeadlessBackend, Numbers> {
        let context = Context::new(Arc::new(HeadlessBackend::universal(1)));
        let engine = Arc::new(EngineBase::new(&context, QueueCaps::UNIVERSAL, 2).unwrap());
        CowPrimitive::new(engine, Numbers)
    }

    #[test]
    fn test_reset_is_lazy() {
        let cow = primitive();
        let pending = cow.reset(5);
        assert!(cow.get().is_none());
        pending.run().unwrap();
        assert_eq!(cow.get().as_deref().map(|c| **c), Some(5));
    }

    #[test]
    fn test_stages_publish_in_completion_order() {
        let cow = primitive();
        let first = cow.reset(1).allocate().unwrap();
        let second = cow.reset(2).allocate().unwrap();
        second.wait().unwrap().publish();
        first.wait().unwrap().publish();
        assert_eq!(cow.get().as_deref().map(|c| **c), Some(1));
    }

    #[test]
    fn test_stale_version_outlives_publish_while_held() {
        let cow = primitive();
        cow.reset(1).run().unwrap();
        let held = cow.get().unwrap();
        cow.reset(2).run().unwrap();
        assert_eq!(**held, 1);
        assert_eq!(Arc::strong_count(&held), 1);
    }

    #[test]
    fn test_clear_and_failed_allocation() {
        let cow = primitive();
        cow.reset(3).spawn_on(&Immediate).wait().unwrap();
        assert!(cow.reset(0).spawn_on(&Immediate).wait().is_err());
        assert_eq!(cow.get().as_deref().map(|c| **c), Some(3));
        cow.clear();
        assert!(cow.get().is_none());
    }
}
