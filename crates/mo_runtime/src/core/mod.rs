//! Core runtime infrastructure.
//!
//! - `ManagedObjectPool` - Handle table, reference counting and sweeps
//! - `TypeManager` - Per-kind capability behind managed objects
//! - `Value` - Uniform read/write over every kind of script-addressable place
//! - `ScriptMemory` - Stack and global slot regions
//! - `SymbolTable` - Export/import names

pub mod manager;
pub mod memory;
pub mod pool;
pub mod snapshot;
pub mod symbols;
pub mod value;

pub use manager::{
    FieldLocation, ObjectReader, SerializeOutcome, StaticArray, TypeManager, TypeRegistry,
};
pub use memory::{Region, ScriptMemory, SlotStore};
pub use pool::{ManagedObject, ManagedObjectPool};
pub use snapshot::{LEGACY_SNAPSHOT_VERSION, SNAPSHOT_MAGIC, SNAPSHOT_VERSION, SnapshotSummary};
pub use symbols::{InstanceId, MANGLE_MARKER, ScriptImport, SymbolTable};
pub use value::{Direct, FieldRef, Value};
