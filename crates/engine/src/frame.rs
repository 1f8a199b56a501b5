//! Frame slots and their primitive registries.

use std::sync::Arc;

use frameflow_rhi::Backend;
use tracing::trace;

use crate::primitive::{AnyPrimitive, PrimitiveHandle};

/// Dense table with stable `u32` ids. Id 0 is never handed out.
#[derive(Debug)]
pub(crate) struct SlotTable<T> {
    entries: Vec<Option<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> SlotTable<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: vec![None],
            free: Vec::new(),
            len: 0,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> u32 {
        self.len += 1;
        match self.free.pop() {
            Some(id) => {
                self.entries[id as usize] = Some(value);
                id
            }
            None => {
                self.entries.push(Some(value));
                (self.entries.len() - 1) as u32
            }
        }
    }

    pub(crate) fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        if id == 0 {
            return None;
        }
        self.entries.get_mut(id as usize)?.as_mut()
    }

    /// Keeps entries for which `keep` returns true. Returns how many were removed.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(u32, &mut T) -> bool) -> usize {
        let mut removed = 0;
        for (id, slot) in self.entries.iter_mut().enumerate().skip(1) {
            if let Some(value) = slot
                && !keep(id as u32, value)
            {
                *slot = None;
                self.free.push(id as u32);
                removed += 1;
            }
        }
        self.len -= removed;
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}

struct Registration {
    handle: PrimitiveHandle,
    used: bool,
}

/// One reusable recording context of a framed engine.
///
/// Besides its command buffer, a slot keeps every primitive version that work
/// recorded into it reads, so those versions outlive the GPU work even if they
/// are replaced in the meantime.
pub struct FrameSlot<B: Backend> {
    index: usize,
    commands: B::CommandBuffer,
    registered: SlotTable<Registration>,
    active: bool,
}

impl<B: Backend> FrameSlot<B> {
    pub(crate) fn new(index: usize, commands: B::CommandBuffer) -> Self {
        Self {
            index,
            commands,
            registered: SlotTable::new(),
            active: false,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn commands(&self) -> &B::CommandBuffer {
        &self.commands
    }

    /// Returns true between begin and end of this slot's current occupancy.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Number of primitives currently registered.
    pub fn registered_count(&self) -> usize {
        self.registered.len()
    }

    /// Marks `primitive` as read by work recorded this occupancy.
    pub fn use_primitive<P: AnyPrimitive>(&mut self, primitive: &Arc<P>) {
        let handle: PrimitiveHandle = primitive.clone();
        self.use_handle(&handle);
    }

    /// Type-erased form of [`use_primitive`](Self::use_primitive).
    pub fn use_handle(&mut self, handle: &PrimitiveHandle) {
        let ids = handle.slot_ids();
        let id = ids.get(self.index);
        if let Some(registration) = self.registered.get_mut(id)
            && Arc::ptr_eq(&registration.handle, handle)
        {
            registration.used = true;
            return;
        }

        let id = self.registered.insert(Registration {
            handle: handle.clone(),
            used: true,
        });
        ids.set(self.index, id);
    }

    /// Drops registrations not used since the previous visit and clears the
    /// used mark on the rest. Returns how many were dropped.
    pub(crate) fn collect_garbage(&mut self) -> usize {
        let index = self.index;
        let removed = self.registered.retain(|id, registration| {
            if registration.used {
                registration.used = false;
                true
            } else {
                registration.handle.slot_ids().clear(index, id);
                false
            }
        });
        if removed > 0 {
            trace!("Slot {} collected {} primitive(s)", index, removed);
        }
        removed
    }
}
