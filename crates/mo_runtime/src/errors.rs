//! Error types for the pool, the value layer and the symbol table.
//!
//! `PoolError` is the fatal class: a snapshot that fails to load is never retried. Stale
//! handles on pool operations are not errors at all, they answer with sentinels.

use crate::core::memory::Region;
use mo_core::Handle;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("bad object pool signature: {0:#x}")]
    BadMagic(i32),

    #[error("unsupported object pool format version: {0}")]
    UnsupportedVersion(i32),

    #[error("attempt to assign invalid handle: {0}")]
    InvalidHandle(i32),

    #[error("unknown managed type `{0}`")]
    UnknownType(String),

    #[error("object {handle} of type `{type_name}` was not registered by the reader")]
    NotReconstructed { handle: Handle, type_name: String },

    #[error("type `{type_name}` rejected a serialize buffer of {needed} bytes")]
    SerializeBufferRejected { type_name: String, needed: usize },

    #[error("managed type of object {0} reports an empty type name")]
    EmptyTypeName(Handle),

    #[error("failed to restore `{type_name}`: {reason}")]
    Unserialize { type_name: String, reason: String },

    #[error("corrupt object pool data: {0}")]
    Corrupt(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from reading or writing through a [`Value`](crate::Value).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("object {0} is no longer alive")]
    StaleObject(Handle),

    #[error("slot {slot} is out of range for the {region} region")]
    NoSuchSlot { region: Region, slot: u32 },

    #[error("{width}-byte access at {at} is outside the {region} data")]
    OutOfBounds { region: Region, at: i64, width: usize },

    #[error("element {index} is outside a static array of {count}")]
    ElementOutOfRange { index: i32, count: i32 },

    #[error("value is undefined")]
    Undefined,

    #[error("slot does not hold a scalar")]
    NotScalar,

    #[error("value is not addressable")]
    NotAddressable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    #[error("symbol `{0}` is already exported")]
    AlreadyExported(String),

    #[error("empty symbol name")]
    EmptyName,
}
