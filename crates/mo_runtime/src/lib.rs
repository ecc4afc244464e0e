//! Managed object runtime: handle table, value/address layer and symbol table.

#![allow(clippy::new_without_default)]
#![allow(clippy::len_without_is_empty)]

pub mod config;
pub mod core;
pub mod errors;

// Re-exports from core/
pub use crate::core::manager;
pub use crate::core::memory;
pub use crate::core::pool;
pub use crate::core::snapshot;
pub use crate::core::symbols;
pub use crate::core::{
    Direct, FieldLocation, FieldRef, InstanceId, ManagedObject, ManagedObjectPool, ObjectReader,
    Region, ScriptImport, ScriptMemory, SerializeOutcome, SlotStore, SnapshotSummary,
    StaticArray, SymbolTable, TypeManager, TypeRegistry, Value,
};

pub use config::PoolConfig;
pub use errors::{AccessError, PoolError, SymbolError};

pub use mo_core::{Handle, NativeAddress, ObjectKind, ObjectRef, Scalar};
