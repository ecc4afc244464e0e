//! Type managers: the per-kind capability behind every managed object.
//!
//! A type manager is implemented once per native object kind. The pool only calls it to
//! name, save, restore and dispose instances; the value layer calls it for byte-level field
//! access. Managers are shared as `Rc<dyn TypeManager>` and keep their own storage behind
//! interior mutability.

use std::fmt;
use std::rc::Rc;

use ahash::RandomState;
use indexmap::IndexMap;
use mo_core::{Handle, NativeAddress, ObjectKind};

use super::pool::ManagedObjectPool;
use crate::errors::PoolError;

/// Result of asking a manager to save one object into a scratch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeOutcome {
    /// The object was written into the first `n` bytes of the buffer.
    Written(usize),
    /// The buffer was too small; retry with at least this many bytes.
    NeedsAtLeast(usize),
}

/// Flat location of a field, as answered by [`TypeManager::field_ref`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLocation {
    pub address: NativeAddress,
    pub offset: i32,
}

pub trait TypeManager {
    fn type_name(&self) -> &str;

    fn serialize(&self, address: NativeAddress, buf: &mut [u8]) -> SerializeOutcome;

    /// Creates a fresh instance from a saved blob and returns its address.
    fn unserialize(&self, blob: &[u8]) -> Result<(NativeAddress, ObjectKind), PoolError>;

    /// Asked before an object leaves the pool. Returning `false` vetoes the disposal unless
    /// `forced` is set. The pool is handed back so that containers can release the handles
    /// they hold.
    fn dispose(&self, address: NativeAddress, forced: bool, pool: &mut ManagedObjectPool) -> bool;

    // Field access. Kinds without script-visible fields keep the defaults.

    fn read_u8(&self, _address: NativeAddress, _offset: i32) -> u8 {
        0
    }

    fn read_i16(&self, _address: NativeAddress, _offset: i32) -> i16 {
        0
    }

    fn read_i32(&self, _address: NativeAddress, _offset: i32) -> i32 {
        0
    }

    fn read_f32(&self, _address: NativeAddress, _offset: i32) -> f32 {
        0.0
    }

    fn write_u8(&self, _address: NativeAddress, _offset: i32, _value: u8) {}

    fn write_i16(&self, _address: NativeAddress, _offset: i32, _value: i16) {}

    fn write_i32(&self, _address: NativeAddress, _offset: i32, _value: i32) {}

    fn write_f32(&self, _address: NativeAddress, _offset: i32, _value: f32) {}

    fn field_ref(&self, address: NativeAddress, offset: i32) -> FieldLocation {
        FieldLocation { address, offset }
    }
}

impl fmt::Debug for dyn TypeManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeManager({})", self.type_name())
    }
}

/// A fixed-size array of native objects that are not themselves managed.
///
/// Scripts address elements with their compiled element size; native storage may use a
/// different stride. Any byte offset into the array splits into an element and an offset
/// inside that element, so one cursor can walk elements without knowing their layout.
pub struct StaticArray {
    element: Rc<dyn TypeManager>,
    script_size: i32,
    native_size: i32,
    count: i32,
}

impl StaticArray {
    pub fn new(element: Rc<dyn TypeManager>, script_size: i32, native_size: i32, count: i32) -> Self {
        Self {
            element,
            script_size: script_size.max(1),
            native_size: native_size.max(1),
            count: count.max(0),
        }
    }

    pub fn element_manager(&self) -> &Rc<dyn TypeManager> {
        &self.element
    }

    pub fn script_size(&self) -> i32 {
        self.script_size
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    #[inline]
    pub fn element_index(&self, offset: i32) -> i32 {
        offset.div_euclid(self.script_size)
    }

    /// Native address of the element containing `offset`.
    pub fn element_address(&self, base: NativeAddress, offset: i32) -> NativeAddress {
        base.offset(self.element_index(offset) as i64 * self.native_size as i64)
    }

    /// Element address and the offset inside that element.
    pub fn locate(&self, base: NativeAddress, offset: i32) -> (NativeAddress, i32) {
        (self.element_address(base, offset), offset.rem_euclid(self.script_size))
    }
}

impl fmt::Debug for StaticArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticArray")
            .field("element", &self.element.type_name())
            .field("script_size", &self.script_size)
            .field("native_size", &self.native_size)
            .field("count", &self.count)
            .finish()
    }
}

/// Restore-side collaborator of [`ManagedObjectPool::deserialize`].
///
/// Implementations re-create the native instance for each saved entry and register it back
/// under the saved handle with [`ManagedObjectPool::allocate_with_handle`].
pub trait ObjectReader {
    fn reconstruct(
        &mut self,
        pool: &mut ManagedObjectPool,
        handle: Handle,
        type_name: &str,
        blob: &[u8],
    ) -> Result<(), PoolError>;
}

/// Managers by type name, in registration order.
pub struct TypeRegistry {
    managers: IndexMap<String, Rc<dyn TypeManager>, RandomState>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            managers: IndexMap::with_hasher(RandomState::new()),
        }
    }

    /// Registers `manager` under its own type name, replacing an earlier one.
    pub fn register(&mut self, manager: Rc<dyn TypeManager>) -> Option<Rc<dyn TypeManager>> {
        let name = manager.type_name().to_string();
        self.managers.insert(name, manager)
    }

    pub fn get(&self, type_name: &str) -> Option<&Rc<dyn TypeManager>> {
        self.managers.get(type_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.managers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

impl ObjectReader for TypeRegistry {
    fn reconstruct(
        &mut self,
        pool: &mut ManagedObjectPool,
        handle: Handle,
        type_name: &str,
        blob: &[u8],
    ) -> Result<(), PoolError> {
        let manager = self
            .managers
            .get(type_name)
            .cloned()
            .ok_or_else(|| PoolError::UnknownType(type_name.to_string()))?;
        let (address, kind) = manager.unserialize(blob)?;
        pool.allocate_with_handle(address, manager, kind, handle)?;
        Ok(())
    }
}
