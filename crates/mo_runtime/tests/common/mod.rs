#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use mo_runtime::{
    Handle, ManagedObjectPool, NativeAddress, ObjectKind, PoolError, SerializeOutcome,
    TypeManager,
};

/// Fixed-size byte objects laid out back to back in one arena, so that consecutive
/// objects also work as the elements of a static array.
pub struct ByteObjects {
    name: String,
    size: usize,
    arena: RefCell<Vec<u8>>,
    vetoed: RefCell<HashSet<NativeAddress>>,
    pub disposed: RefCell<Vec<NativeAddress>>,
    pub serialize_calls: Cell<usize>,
}

impl ByteObjects {
    pub fn new(name: &str, size: usize) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_string(),
            size,
            // Byte 0 is never handed out so no object sits at the null address.
            arena: RefCell::new(vec![0]),
            vetoed: RefCell::new(HashSet::new()),
            disposed: RefCell::new(Vec::new()),
            serialize_calls: Cell::new(0),
        })
    }

    pub fn create(&self) -> NativeAddress {
        self.create_with(&[])
    }

    pub fn create_with(&self, bytes: &[u8]) -> NativeAddress {
        let mut arena = self.arena.borrow_mut();
        let address = NativeAddress(arena.len() as u64);
        let mut object = vec![0u8; self.size];
        let n = bytes.len().min(self.size);
        object[..n].copy_from_slice(&bytes[..n]);
        arena.extend_from_slice(&object);
        address
    }

    pub fn bytes(&self, address: NativeAddress) -> Vec<u8> {
        let arena = self.arena.borrow();
        let start = address.0 as usize;
        arena[start..start + self.size].to_vec()
    }

    pub fn veto(&self, address: NativeAddress) {
        self.vetoed.borrow_mut().insert(address);
    }

    pub fn was_disposed(&self, address: NativeAddress) -> bool {
        self.disposed.borrow().contains(&address)
    }

    fn read<const N: usize>(&self, address: NativeAddress, offset: i32) -> [u8; N] {
        let mut buf = [0u8; N];
        let arena = self.arena.borrow();
        let start = address.0 as i64 + offset as i64;
        if start >= 0 && (start as usize) + N <= arena.len() {
            buf.copy_from_slice(&arena[start as usize..start as usize + N]);
        }
        buf
    }

    fn write(&self, address: NativeAddress, offset: i32, bytes: &[u8]) {
        let mut arena = self.arena.borrow_mut();
        let start = address.0 as i64 + offset as i64;
        if start >= 0 && (start as usize) + bytes.len() <= arena.len() {
            arena[start as usize..start as usize + bytes.len()].copy_from_slice(bytes);
        }
    }
}

impl TypeManager for ByteObjects {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn serialize(&self, address: NativeAddress, buf: &mut [u8]) -> SerializeOutcome {
        self.serialize_calls.set(self.serialize_calls.get() + 1);
        if buf.len() < self.size {
            return SerializeOutcome::NeedsAtLeast(self.size);
        }
        buf[..self.size].copy_from_slice(&self.bytes(address));
        SerializeOutcome::Written(self.size)
    }

    fn unserialize(&self, blob: &[u8]) -> Result<(NativeAddress, ObjectKind), PoolError> {
        if blob.len() > self.size {
            return Err(PoolError::Unserialize {
                type_name: self.name.clone(),
                reason: format!("{} bytes for a {}-byte object", blob.len(), self.size),
            });
        }
        Ok((self.create_with(blob), ObjectKind::Dynamic))
    }

    fn dispose(&self, address: NativeAddress, forced: bool, _pool: &mut ManagedObjectPool) -> bool {
        if !forced && self.vetoed.borrow().contains(&address) {
            return false;
        }
        self.disposed.borrow_mut().push(address);
        true
    }

    fn read_u8(&self, address: NativeAddress, offset: i32) -> u8 {
        self.read::<1>(address, offset)[0]
    }

    fn read_i16(&self, address: NativeAddress, offset: i32) -> i16 {
        i16::from_le_bytes(self.read(address, offset))
    }

    fn read_i32(&self, address: NativeAddress, offset: i32) -> i32 {
        i32::from_le_bytes(self.read(address, offset))
    }

    fn read_f32(&self, address: NativeAddress, offset: i32) -> f32 {
        f32::from_le_bytes(self.read(address, offset))
    }

    fn write_u8(&self, address: NativeAddress, offset: i32, value: u8) {
        self.write(address, offset, &[value]);
    }

    fn write_i16(&self, address: NativeAddress, offset: i32, value: i16) {
        self.write(address, offset, &value.to_le_bytes());
    }

    fn write_i32(&self, address: NativeAddress, offset: i32, value: i32) {
        self.write(address, offset, &value.to_le_bytes());
    }

    fn write_f32(&self, address: NativeAddress, offset: i32, value: f32) {
        self.write(address, offset, &value.to_le_bytes());
    }
}

/// Managed arrays of handles. Disposing one releases every element.
pub struct HandleArrays {
    arrays: RefCell<Vec<Vec<Handle>>>,
}

impl HandleArrays {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            arrays: RefCell::new(vec![Vec::new()]),
        })
    }

    pub fn create(&self, elements: Vec<Handle>) -> NativeAddress {
        let mut arrays = self.arrays.borrow_mut();
        arrays.push(elements);
        NativeAddress(arrays.len() as u64 - 1)
    }
}

impl TypeManager for HandleArrays {
    fn type_name(&self) -> &str {
        "HandleArray"
    }

    fn serialize(&self, address: NativeAddress, buf: &mut [u8]) -> SerializeOutcome {
        let arrays = self.arrays.borrow();
        let elements = &arrays[address.0 as usize];
        let needed = elements.len() * 4;
        if buf.len() < needed {
            return SerializeOutcome::NeedsAtLeast(needed);
        }
        for (i, handle) in elements.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&handle.get().to_le_bytes());
        }
        SerializeOutcome::Written(needed)
    }

    fn unserialize(&self, blob: &[u8]) -> Result<(NativeAddress, ObjectKind), PoolError> {
        let elements = blob
            .chunks_exact(4)
            .map(|c| Handle(i32::from_le_bytes([c[0], c[1], c[2], c[3]])))
            .collect();
        Ok((self.create(elements), ObjectKind::Dynamic))
    }

    fn dispose(&self, address: NativeAddress, _forced: bool, pool: &mut ManagedObjectPool) -> bool {
        let elements = std::mem::take(&mut self.arrays.borrow_mut()[address.0 as usize]);
        for handle in elements {
            pool.sub_ref(handle);
        }
        true
    }
}

/// Objects whose disposal registers a replacement object, growing the pool mid-sweep.
pub struct Respawning {
    pub target: Rc<ByteObjects>,
    pub spawned: RefCell<Vec<Spawn>>,
    next: Cell<u64>,
}

pub struct Spawn {
    pub handle: Handle,
    pub address: NativeAddress,
}

impl Respawning {
    pub fn new(target: Rc<ByteObjects>) -> Rc<Self> {
        Rc::new(Self {
            target,
            spawned: RefCell::new(Vec::new()),
            next: Cell::new(1),
        })
    }

    pub fn create(&self) -> NativeAddress {
        let address = NativeAddress(0x1000_0000 + self.next.get());
        self.next.set(self.next.get() + 1);
        address
    }
}

impl TypeManager for Respawning {
    fn type_name(&self) -> &str {
        "Respawning"
    }

    fn serialize(&self, _address: NativeAddress, _buf: &mut [u8]) -> SerializeOutcome {
        SerializeOutcome::Written(0)
    }

    fn unserialize(&self, _blob: &[u8]) -> Result<(NativeAddress, ObjectKind), PoolError> {
        Ok((self.create(), ObjectKind::Pointer))
    }

    fn dispose(&self, _address: NativeAddress, _forced: bool, pool: &mut ManagedObjectPool) -> bool {
        let address = self.target.create();
        let target: Rc<dyn TypeManager> = self.target.clone();
        let handle = pool.allocate(address, target, ObjectKind::Dynamic);
        pool.add_ref(handle);
        self.spawned.borrow_mut().push(Spawn { handle, address });
        true
    }
}

pub fn manager<T: TypeManager + 'static>(m: &Rc<T>) -> Rc<dyn TypeManager> {
    m.clone()
}

/// Allocates a fresh byte object and takes one reference to it.
pub fn alloc_ref(pool: &mut ManagedObjectPool, objects: &Rc<ByteObjects>) -> (Handle, NativeAddress) {
    let address = objects.create();
    let handle = pool.allocate(address, manager(objects), ObjectKind::Dynamic);
    pool.add_ref(handle);
    (handle, address)
}
