//! Core types for the managed object runtime.
//!
//! This crate contains the leaf types shared by the pool, the value layer and tooling:
//! - `Handle` - Script-visible 32-bit object handle
//! - `NativeAddress` - Opaque key of a native object instance
//! - `ObjectRef` - Generation-checked handle held by native code
//! - `ObjectKind` - Kind tag of a registered object
//! - `Scalar` - 32-bit immediate (int or float sharing the same bits)

pub mod handle;
pub mod scalar;

pub use handle::{Handle, NativeAddress, ObjectKind, ObjectRef};
pub use scalar::Scalar;

use ahash::RandomState;
use hashbrown::HashMap;
use std::hash::Hash;

pub type FastHashMap<K, V> = HashMap<K, V, RandomState>;

pub fn fast_hasher() -> RandomState {
    RandomState::with_seeds(0, 0, 0, 0)
}

pub fn fast_map_new<K: Eq + Hash, V>() -> FastHashMap<K, V> {
    HashMap::with_hasher(fast_hasher())
}

pub fn fast_map_with_capacity<K: Eq + Hash, V>(cap: usize) -> FastHashMap<K, V> {
    HashMap::with_capacity_and_hasher(cap, fast_hasher())
}
