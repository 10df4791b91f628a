//! GC configuration and stats.

/// Configuration passed to [`crate::Heap::with_config`].
#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    /// Initial heap size in bytes.
    pub initial_heap_size: usize,
    /// Ceiling the heap will grow to under pressure.
    pub max_heap_size: usize,
    /// Multiplier applied to the heap size when growing under pressure.
    pub growth_factor: f64,
    /// `used / heap_size` ratio that triggers a collection.
    pub gc_threshold: f64,
    /// Force a collection after this many allocations, regardless of
    /// occupancy.
    pub max_alloc_before_gc: usize,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_heap_size: 1024 * 1024,
            max_heap_size: 1024 * 1024 * 1024,
            growth_factor: 1.5,
            gc_threshold: 0.7,
            max_alloc_before_gc: 10_000,
        }
    }
}

/// Point-in-time GC statistics, returned by [`crate::Collector::stats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Current heap size (capacity) in bytes.
    pub heap_size: usize,
    /// Bytes currently in use by live objects.
    pub used_memory: usize,
    /// Cumulative objects allocated since startup.
    pub total_allocated: u64,
    /// Cumulative objects freed since startup.
    pub total_freed: u64,
    /// Number of completed collection cycles.
    pub gc_cycles: u64,
    /// Rolling average pause time across all cycles, in milliseconds.
    pub avg_pause_time_ms: f64,
    /// Pause time of the most recent cycle, in milliseconds.
    pub last_pause_time_ms: f64,
}
