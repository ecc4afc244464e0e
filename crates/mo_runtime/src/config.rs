//! Pool configuration.

/// Tuning knobs for [`ManagedObjectPool`](crate::ManagedObjectPool).
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Allocations between two automatic sweeps.
    pub gc_interval: usize,
    /// Number of slots the handle table grows by.
    pub chunk_size: usize,
    /// Initial size of the scratch buffer used when saving objects.
    pub serialize_buffer_size: usize,
    /// Highest handle a caller may choose when restoring. Larger handles in a snapshot are
    /// treated as corrupt rather than grown into.
    pub max_handles: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            gc_interval: 1024,
            chunk_size: 1024,
            serialize_buffer_size: 10240,
            max_handles: 1 << 20,
        }
    }
}
