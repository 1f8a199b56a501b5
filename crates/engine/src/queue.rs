//! Shared hardware queues.
//!
//! A [`Queue`] is handed out by the registry to every engine that needs one.
//! While a single consumer holds it, access is unguarded. Once a second
//! consumer is admitted, every access goes through the queue's mutex.
//! Admission waits out unguarded holders, so a guard handed out before the
//! queue became shared never overlaps one handed out after.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use frameflow_rhi::{Backend, QueueCaps};

/// How many consumers currently share a queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueSharing {
    /// One consumer, no guard.
    Exclusive,
    /// Two or more consumers, guarded.
    Shared(u32),
}

impl QueueSharing {
    /// Number of live consumers.
    pub fn count(self) -> u32 {
        match self {
            QueueSharing::Exclusive => 1,
            QueueSharing::Shared(n) => n,
        }
    }

    /// Returns true if access must go through the queue's mutex.
    pub fn is_guarded(self) -> bool {
        matches!(self, QueueSharing::Shared(_))
    }

    /// State after admitting one more consumer.
    pub fn admit(self) -> Self {
        QueueSharing::Shared(self.count() + 1)
    }

    /// State after one consumer leaves, or `None` when the last one does.
    pub fn release(self) -> Option<Self> {
        match self {
            QueueSharing::Exclusive => None,
            QueueSharing::Shared(n) if n <= 2 => Some(QueueSharing::Exclusive),
            QueueSharing::Shared(n) => Some(QueueSharing::Shared(n - 1)),
        }
    }
}

/// One native queue as lent out by the registry.
pub struct Queue<B: Backend> {
    handle: B::Queue,
    family: u32,
    index: u32,
    caps: QueueCaps,
    guarded: AtomicBool,
    /// Live guards taken without the lock.
    unguarded: AtomicUsize,
    lock: Mutex<()>,
}

impl<B: Backend> Queue<B> {
    pub(crate) fn new(handle: B::Queue, family: u32, index: u32, caps: QueueCaps) -> Self {
        Self {
            handle,
            family,
            index,
            caps,
            guarded: AtomicBool::new(false),
            unguarded: AtomicUsize::new(0),
            lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn family(&self) -> u32 {
        self.family
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Capabilities of the family this queue belongs to.
    #[inline]
    pub fn caps(&self) -> QueueCaps {
        self.caps
    }

    /// Returns true while the queue is shared by more than one consumer.
    #[inline]
    pub fn is_guarded(&self) -> bool {
        self.guarded.load(Ordering::Acquire)
    }

    /// Switches guarding on or off. Turning it on holds the lock until every
    /// unguarded holder has dropped its guard, so the calling thread must not
    /// hold one itself.
    pub(crate) fn set_guarded(&self, guarded: bool) {
        let _held = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.guarded.store(guarded, Ordering::SeqCst);
        if guarded {
            while self.unguarded.load(Ordering::SeqCst) > 0 {
                std::thread::yield_now();
            }
        }
    }

    /// Claims an unguarded handle, or returns `None` if the queue is shared.
    fn enter_unguarded(&self) -> Option<QueueGuard<'_, B>> {
        self.unguarded.fetch_add(1, Ordering::SeqCst);
        if self.guarded.load(Ordering::SeqCst) {
            self.unguarded.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(QueueGuard {
            queue: self,
            lock: None,
        })
    }

    /// Blocks until the queue may be used, then returns a scoped handle.
    pub fn acquire(&self) -> QueueGuard<'_, B> {
        if let Some(guard) = self.enter_unguarded() {
            return guard;
        }
        let lock = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        QueueGuard {
            queue: self,
            lock: Some(lock),
        }
    }

    /// Returns a scoped handle if the queue can be used without blocking.
    pub fn try_acquire(&self) -> Option<QueueGuard<'_, B>> {
        if let Some(guard) = self.enter_unguarded() {
            return Some(guard);
        }
        let lock = match self.lock.try_lock() {
            Ok(lock) => lock,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        Some(QueueGuard {
            queue: self,
            lock: Some(lock),
        })
    }
}

impl<B: Backend> fmt::Debug for Queue<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("family", &self.family)
            .field("index", &self.index)
            .field("caps", &self.caps)
            .field("guarded", &self.is_guarded())
            .finish()
    }
}

/// Scoped access to a native queue. Releases the queue's lock, if one was
/// taken, when dropped.
pub struct QueueGuard<'a, B: Backend> {
    queue: &'a Queue<B>,
    lock: Option<MutexGuard<'a, ()>>,
}

impl<B: Backend> Drop for QueueGuard<'_, B> {
    fn drop(&mut self) {
        if self.lock.is_none() {
            self.queue.unguarded.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl<B: Backend> Deref for QueueGuard<'_, B> {
    type Target = B::Queue;

    fn deref(&self) -> &B::Queue {
        &self.queue.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use frameflow_rhi::headless::{HeadlessBackend, HeadlessQueue};

    fn queue() -> Queue<HeadlessBackend> {
        Queue::new(
            HeadlessQueue { family: 0, index: 0 },
            0,
            0,
            QueueCaps::PRESENT_GRAPHICS,
        )
    }

    #[test]
    fn test_sharing_transitions() {
        let shared = QueueSharing::Exclusive.admit();
        assert_eq!(shared, QueueSharing::Shared(2));
        assert_eq!(shared.admit(), QueueSharing::Shared(3));
        assert_eq!(QueueSharing::Shared(3).release(), Some(QueueSharing::Shared(2)));
        assert_eq!(shared.release(), Some(QueueSharing::Exclusive));
        assert_eq!(QueueSharing::Exclusive.release(), None);
        assert!(!QueueSharing::Exclusive.is_guarded());
        assert!(shared.is_guarded());
    }

    #[test]
    fn test_unguarded_access_never_blocks() {
        let queue = queue();
        let first = queue.acquire();
        let second = queue.try_acquire();
        assert!(second.is_some());
        assert_eq!(*first, HeadlessQueue { family: 0, index: 0 });
    }

    #[test]
    fn test_guarded_try_acquire_fails_while_held() {
        let queue = queue();
        queue.set_guarded(true);
        let held = queue.acquire();
        assert!(queue.try_acquire().is_none());
        drop(held);
        assert!(queue.try_acquire().is_some());
    }

    #[test]
    fn test_sharing_waits_for_unguarded_holder() {
        let queue = Arc::new(queue());
        let held = queue.acquire();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let sharer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.set_guarded(true);
                done_tx.send(()).unwrap();
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_millis(50)).is_err());

        drop(held);
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        sharer.join().unwrap();
        assert!(queue.is_guarded());
        assert!(queue.acquire().lock.is_some());
    }

    #[test]
    fn test_queue_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Queue<HeadlessBackend>>();
    }
}
