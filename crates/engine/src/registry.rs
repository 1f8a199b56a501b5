//! Queue registry.
//!
//! The registry owns every queue handed out to engines. Allocation prefers an
//! unclaimed queue from a family whose capabilities match the request
//! exactly, then an unclaimed queue from any family that is a superset of the
//! request, and finally shares the least-used claimed queue of a viable
//! family. Calls are expected at engine construction and teardown only, so
//! the registry does no locking of its own.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use frameflow_rhi::{Backend, QueueCaps, QueueFamily};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::queue::{Queue, QueueSharing};

struct Entry<B: Backend> {
    queue: Arc<Queue<B>>,
    sharing: QueueSharing,
}

/// Owner of all claimed queues, keyed by `(family, index)`.
pub struct QueueRegistry<B: Backend> {
    families: Vec<QueueFamily>,
    entries: BTreeMap<(u32, u32), Entry<B>>,
    native: HashMap<(u32, u32), B::Queue>,
}

impl<B: Backend> QueueRegistry<B> {
    pub fn new(families: Vec<QueueFamily>) -> Self {
        Self {
            families,
            entries: BTreeMap::new(),
            native: HashMap::new(),
        }
    }

    /// Claims or shares a queue whose family satisfies `request`.
    pub fn allocate(&mut self, backend: &B, request: QueueCaps) -> EngineResult<Arc<Queue<B>>> {
        let exact = self.find_unclaimed(|caps| caps == request);
        let unclaimed = exact.or_else(|| self.find_unclaimed(|caps| caps.is_superset_of(&request)));

        if let Some((family, index)) = unclaimed {
            return self.claim(backend, family, index);
        }

        let viable: Vec<u32> = self
            .families
            .iter()
            .filter(|f| f.caps.is_superset_of(&request))
            .map(|f| f.index)
            .collect();

        // BTreeMap order is enumeration order; min_by_key keeps the first minimum.
        let shared = self
            .entries
            .iter_mut()
            .filter(|((family, _), _)| viable.contains(family))
            .min_by_key(|(_, entry)| entry.sharing.count());

        match shared {
            Some((&(family, index), entry)) => {
                entry.queue.set_guarded(true);
                entry.sharing = entry.sharing.admit();
                debug!(
                    "Sharing queue {}:{} ({} consumers)",
                    family,
                    index,
                    entry.sharing.count()
                );
                Ok(entry.queue.clone())
            }
            None => Err(EngineError::ResourceExhaustion(format!(
                "no queue family satisfies {:?}",
                request
            ))),
        }
    }

    /// Releases one reference to `queue`. The last release removes it and
    /// makes its slot available again.
    pub fn free(&mut self, queue: &Arc<Queue<B>>) {
        let key = (queue.family(), queue.index());
        let Some(entry) = self.entries.get_mut(&key) else {
            warn!("Freeing queue {}:{} that is not registered", key.0, key.1);
            return;
        };
        if !Arc::ptr_eq(&entry.queue, queue) {
            warn!("Freeing stale handle for queue {}:{}", key.0, key.1);
            return;
        }

        match entry.sharing.release() {
            Some(sharing) => {
                if !sharing.is_guarded() {
                    entry.queue.set_guarded(false);
                }
                entry.sharing = sharing;
                debug!(
                    "Released queue {}:{} ({} consumers left)",
                    key.0,
                    key.1,
                    sharing.count()
                );
            }
            None => {
                self.entries.remove(&key);
                debug!("Queue {}:{} returned to the registry", key.0, key.1);
            }
        }
    }

    /// Sharing state of a claimed queue.
    pub fn sharing(&self, family: u32, index: u32) -> Option<QueueSharing> {
        self.entries.get(&(family, index)).map(|e| e.sharing)
    }

    /// Number of claimed queues.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn find_unclaimed(&self, matches: impl Fn(QueueCaps) -> bool) -> Option<(u32, u32)> {
        self.families
            .iter()
            .filter(|f| matches(f.caps))
            .find_map(|f| {
                (0..f.queue_count)
                    .find(|i| !self.entries.contains_key(&(f.index, *i)))
                    .map(|i| (f.index, i))
            })
    }

    fn claim(&mut self, backend: &B, family: u32, index: u32) -> EngineResult<Arc<Queue<B>>> {
        let key = (family, index);
        let handle = match self.native.get(&key) {
            Some(handle) => handle.clone(),
            None => {
                let handle = backend.get_queue(family, index)?;
                self.native.insert(key, handle.clone());
                handle
            }
        };

        let caps = self
            .families
            .iter()
            .find(|f| f.index == family)
            .map(|f| f.caps)
            .unwrap_or_default();

        let queue = Arc::new(Queue::new(handle, family, index, caps));
        self.entries.insert(
            key,
            Entry {
                queue: queue.clone(),
                sharing: QueueSharing::Exclusive,
            },
        );
        debug!("Claimed queue {}:{} ({:?})", family, index, caps);
        Ok(queue)
    }
}
