//! Object handles and native addresses.

use std::fmt;

/// Handle to a managed object, as stored in script memory.
///
/// Handles are plain 32-bit integers so they can live in script variables and in
/// saved games. `Handle::NULL` is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(pub i32);

impl Handle {
    pub const NULL: Handle = Handle(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn get(self) -> i32 {
        self.0
    }

    /// Slot index for this handle, or `None` for null and negative handles.
    #[inline]
    pub fn index(self) -> Option<usize> {
        if self.0 >= 1 { Some(self.0 as usize) } else { None }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque key of a native object instance.
///
/// Addresses are minted by type managers. The pool only compares and hashes them; managers
/// that lay objects out contiguously may use [`NativeAddress::offset`] to reach elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NativeAddress(pub u64);

impl NativeAddress {
    pub const NULL: NativeAddress = NativeAddress(0);

    #[inline]
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn offset(self, bytes: i64) -> NativeAddress {
        NativeAddress(self.0.wrapping_add_signed(bytes))
    }
}

impl fmt::Display for NativeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A handle paired with the generation of the slot it was taken from.
///
/// The slot generation is bumped whenever the object in it is disposed, so an `ObjectRef`
/// to a disposed object never resolves to whatever reuses the handle afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub handle: Handle,
    pub generation: u32,
}

impl ObjectRef {
    pub fn new(handle: Handle, generation: u32) -> Self {
        Self { handle, generation }
    }
}

/// Kind tag of a registered object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Value-like object with no identity of its own (boxed scalars, strings).
    Plain,
    /// Engine object exposed by pointer (characters, GUI controls).
    Pointer,
    /// Object created by the script at runtime (dynamic arrays, user structs).
    Dynamic,
}
