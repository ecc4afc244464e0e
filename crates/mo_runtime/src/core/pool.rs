//! Managed object pool.
//!
//! Maps small integer handles to native objects and their type managers. Objects are
//! reference counted by the interpreter; a periodic linear sweep reclaims anything whose
//! count has dropped below one without being noticed. Handles are recycled FIFO, and every
//! slot carries a generation so [`ObjectRef`]s to disposed objects stay dead.

use std::collections::VecDeque;
use std::rc::Rc;

use mo_core::{FastHashMap, Handle, NativeAddress, ObjectKind, ObjectRef, fast_map_with_capacity};

use super::manager::TypeManager;
use crate::config::PoolConfig;
use crate::errors::PoolError;

/// One registered object.
pub struct ManagedObject {
    pub handle: Handle,
    pub address: NativeAddress,
    pub manager: Rc<dyn TypeManager>,
    pub kind: ObjectKind,
    pub ref_count: i32,
    disposing: bool,
}

#[derive(Default)]
pub(crate) struct Slot {
    generation: u32,
    object: Option<ManagedObject>,
}

pub struct ManagedObjectPool {
    slots: Vec<Slot>,
    available: VecDeque<Handle>,
    by_address: FastHashMap<NativeAddress, Handle>,
    next_handle: i32,
    created_since_gc: usize,
    disposals: usize,
    protected: Option<NativeAddress>,
    pub(crate) serialize_buffer: Vec<u8>,
    config: PoolConfig,
}

impl ManagedObjectPool {
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    pub fn with_config(config: PoolConfig) -> Self {
        let mut pool = Self {
            slots: Vec::new(),
            available: VecDeque::new(),
            by_address: fast_map_with_capacity(config.chunk_size),
            next_handle: 1,
            created_since_gc: 0,
            disposals: 0,
            protected: None,
            serialize_buffer: vec![0; config.serialize_buffer_size],
            config,
        };
        pool.reserve_through(1);
        pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Grows the slot table in whole chunks until `index` fits.
    fn reserve_through(&mut self, index: usize) {
        if index < self.slots.len() {
            return;
        }
        let chunk = self.config.chunk_size.max(1);
        let needed = index + 1 - self.slots.len();
        let grow = needed.div_ceil(chunk) * chunk;
        self.slots.resize_with(self.slots.len() + grow, Slot::default);
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn live(&self, handle: Handle) -> Option<&ManagedObject> {
        if handle.get() >= self.next_handle {
            return None;
        }
        self.slots.get(handle.index()?)?.object.as_ref()
    }

    fn live_mut(&mut self, handle: Handle) -> Option<&mut ManagedObject> {
        if handle.get() >= self.next_handle {
            return None;
        }
        self.slots.get_mut(handle.index()?)?.object.as_mut()
    }

    /// Registers a native object and returns its new handle.
    ///
    /// The address must not already be registered. The new object starts with a reference
    /// count of zero; the caller is expected to take a reference right away.
    pub fn allocate(
        &mut self,
        address: NativeAddress,
        manager: Rc<dyn TypeManager>,
        kind: ObjectKind,
    ) -> Handle {
        let handle = match self.available.pop_front() {
            Some(handle) => handle,
            None => {
                let handle = Handle(self.next_handle);
                self.next_handle += 1;
                handle
            }
        };
        self.install(handle, address, manager, kind);
        handle
    }

    /// Registers a native object under a handle chosen by the caller (restore path).
    pub fn allocate_with_handle(
        &mut self,
        address: NativeAddress,
        manager: Rc<dyn TypeManager>,
        kind: ObjectKind,
        handle: Handle,
    ) -> Result<Handle, PoolError> {
        if handle.get() < 1 || handle.get() as usize > self.config.max_handles {
            log::error!("attempt to assign invalid handle {}", handle.get());
            return Err(PoolError::InvalidHandle(handle.get()));
        }
        self.available.retain(|h| *h != handle);
        if handle.get() >= self.next_handle {
            for skipped in self.next_handle..handle.get() {
                self.available.push_back(Handle(skipped));
            }
            self.next_handle = handle.get().saturating_add(1);
        }
        self.install(handle, address, manager, kind);
        Ok(handle)
    }

    fn install(
        &mut self,
        handle: Handle,
        address: NativeAddress,
        manager: Rc<dyn TypeManager>,
        kind: ObjectKind,
    ) {
        let index = handle.get() as usize;
        self.reserve_through(index);
        let slot = &mut self.slots[index];
        if let Some(old) = slot.object.take() {
            log::warn!(
                "handle {handle} reassigned from {} at {} to {} at {address}",
                old.manager.type_name(),
                old.address,
                manager.type_name()
            );
            if self.by_address.get(&old.address) == Some(&handle) {
                self.by_address.remove(&old.address);
            }
            slot.generation = slot.generation.wrapping_add(1);
        }
        log::trace!("allocate: {handle} -> {} at {address}", manager.type_name());
        slot.object = Some(ManagedObject {
            handle,
            address,
            manager,
            kind,
            ref_count: 0,
            disposing: false,
        });
        self.by_address.insert(address, handle);
        self.created_since_gc += 1;
    }

    pub fn add_ref(&mut self, handle: Handle) -> i32 {
        match self.live_mut(handle) {
            Some(object) => {
                object.ref_count += 1;
                log::trace!("add_ref: {handle} refcount -> {}", object.ref_count);
                object.ref_count
            }
            None => {
                log::trace!("add_ref: stale handle {handle}");
                0
            }
        }
    }

    /// Drops one reference and disposes the object once nothing refers to it.
    ///
    /// Returns the decremented count even when the object was disposed by this call.
    pub fn sub_ref(&mut self, handle: Handle) -> i32 {
        let protected = self.protected;
        let Some(object) = self.live_mut(handle) else {
            log::trace!("sub_ref: stale handle {handle}");
            return 0;
        };
        object.ref_count -= 1;
        let count = object.ref_count;
        log::trace!("sub_ref: {handle} refcount -> {count}");
        if count <= 0 && !object.disposing && Some(object.address) != protected {
            self.dispose(handle, false);
        }
        count
    }

    /// Disposes an unreferenced object. Returns `true` if the handle no longer names a
    /// live object.
    pub fn check_dispose(&mut self, handle: Handle) -> bool {
        let Some(object) = self.live(handle) else {
            return true;
        };
        if object.ref_count >= 1 || object.disposing || Some(object.address) == self.protected {
            return false;
        }
        self.dispose(handle, false)
    }

    /// Removes the object from the table once its manager agrees (or `force` is set).
    fn dispose(&mut self, handle: Handle, force: bool) -> bool {
        let Some(index) = handle.index() else {
            return false;
        };
        let (address, manager, generation) = match self.slots.get_mut(index) {
            Some(Slot {
                generation,
                object: Some(object),
            }) => {
                object.disposing = true;
                (object.address, Rc::clone(&object.manager), *generation)
            }
            _ => return false,
        };

        let agreed = manager.dispose(address, force, self);

        let Some(slot) = self.slots.get_mut(index) else {
            return true;
        };
        if slot.generation != generation || slot.object.is_none() {
            // The callback already removed it.
            return true;
        }
        if !agreed && !force {
            if let Some(object) = slot.object.as_mut() {
                object.disposing = false;
            }
            log::debug!("dispose: {} vetoed disposal of {handle}", manager.type_name());
            return false;
        }
        slot.object = None;
        slot.generation = generation.wrapping_add(1);
        if self.by_address.get(&address) == Some(&handle) {
            self.by_address.remove(&address);
        }
        self.available.push_back(handle);
        self.disposals += 1;
        log::trace!("dispose: freed {handle} ({})", manager.type_name());
        true
    }

    /// Force-disposes the object registered at `address`, whatever its reference count.
    pub fn remove_by_address(&mut self, address: NativeAddress) -> bool {
        match self.by_address.get(&address).copied() {
            Some(handle) => self.dispose(handle, true),
            None => false,
        }
    }

    /// Sweeps once enough objects were created since the previous automatic sweep.
    pub fn run_gc_if_appropriate(&mut self) -> bool {
        if self.created_since_gc < self.config.gc_interval {
            return false;
        }
        self.run_gc();
        self.created_since_gc = 0;
        true
    }

    /// Disposes every object whose reference count is below one. Returns how many went,
    /// including objects released by other objects' disposal.
    pub fn run_gc(&mut self) -> usize {
        let before = self.disposals;
        // `next_handle` is reread every step: disposal may register new objects.
        let mut next = 1;
        while next < self.next_handle {
            let handle = Handle(next);
            next += 1;
            let collectable = match self.live(handle) {
                Some(object) => {
                    object.ref_count < 1
                        && !object.disposing
                        && Some(object.address) != self.protected
                }
                None => false,
            };
            if collectable {
                self.dispose(handle, false);
            }
        }
        let disposed = self.disposals - before;
        log::debug!("gc: disposed {disposed} objects, {} live", self.live_count());
        disposed
    }

    /// Force-disposes everything and starts handle numbering over.
    ///
    /// Disposal callbacks may register new objects while this runs. Passes repeat until a
    /// pass finds the table empty, so an object registered behind the cursor is still
    /// disposed.
    pub fn reset(&mut self) {
        loop {
            self.available.clear();
            let mut found = false;
            let mut next = 1;
            while next < self.next_handle {
                let handle = Handle(next);
                next += 1;
                if self.live(handle).is_some() {
                    found = true;
                    self.dispose(handle, true);
                }
            }
            if !found {
                break;
            }
        }
        self.available.clear();
        self.by_address.clear();
        self.next_handle = 1;
        self.created_since_gc = 0;
        log::debug!("reset: pool cleared");
    }

    /// Sets the object exempt from disposal, returning the previous one.
    pub fn protect(&mut self, address: Option<NativeAddress>) -> Option<NativeAddress> {
        std::mem::replace(&mut self.protected, address)
    }

    pub fn protected(&self) -> Option<NativeAddress> {
        self.protected
    }

    /// Runs `f` with `address` exempt from disposal, e.g. while it is the receiver of a
    /// native call that may call back into scripts.
    pub fn with_protected<R>(
        &mut self,
        address: NativeAddress,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.protected.replace(address);
        let result = f(self);
        self.protected = previous;
        result
    }

    pub fn is_valid(&self, handle: Handle) -> bool {
        self.live(handle).is_some()
    }

    pub fn handle_to_address(&self, handle: Handle) -> Option<NativeAddress> {
        self.live(handle).map(|object| object.address)
    }

    pub fn handle_to_object(&self, handle: Handle) -> Option<&ManagedObject> {
        self.live(handle)
    }

    pub fn address_to_handle(&self, address: NativeAddress) -> Handle {
        if address.is_null() {
            return Handle::NULL;
        }
        self.by_address.get(&address).copied().unwrap_or(Handle::NULL)
    }

    pub fn ref_count(&self, handle: Handle) -> Option<i32> {
        self.live(handle).map(|object| object.ref_count)
    }

    /// Generation-checked reference to a live handle.
    pub fn object_ref(&self, handle: Handle) -> Option<ObjectRef> {
        self.live(handle)?;
        let index = handle.index()?;
        Some(ObjectRef::new(handle, self.slots[index].generation))
    }

    pub fn resolve(&self, object: ObjectRef) -> Option<&ManagedObject> {
        let index = object.handle.index()?;
        let slot = self.slots.get(index)?;
        if slot.generation != object.generation {
            return None;
        }
        self.live(object.handle)
    }

    /// The handle the next fresh allocation would get if the recycle queue were empty.
    pub fn next_handle(&self) -> Handle {
        Handle(self.next_handle)
    }

    pub fn live_handles(&self) -> impl Iterator<Item = Handle> + '_ {
        (1..self.next_handle)
            .map(Handle)
            .filter(|handle| self.live(*handle).is_some())
    }

    pub fn live_count(&self) -> usize {
        self.live_handles().count()
    }

    pub(crate) fn set_ref_count(&mut self, handle: Handle, count: i32) -> bool {
        match self.live_mut(handle) {
            Some(object) => {
                object.ref_count = count;
                true
            }
            None => false,
        }
    }

    /// Recomputes the high-water mark and the recycle queue from slot occupancy.
    pub(crate) fn rebuild_free_handles(&mut self) {
        self.available.clear();
        let highest = self
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, slot)| slot.object.is_some())
            .map(|(index, _)| index as i32)
            .max()
            .unwrap_or(0);
        self.next_handle = highest + 1;
        for index in 1..self.next_handle {
            if self.slots[index as usize].object.is_none() {
                self.available.push_back(Handle(index));
            }
        }
    }
}

impl Default for ManagedObjectPool {
    fn default() -> Self {
        Self::new()
    }
}
