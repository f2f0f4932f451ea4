//! GC statistics counters.

/// Counters accumulated over a heap's lifetime.
#[derive(Clone, Debug, Default)]
pub struct GcStats {
    /// Completed collection cycles.
    pub collections: u64,
    /// Series allocated, ever.
    pub allocated_total: u64,
    /// Series freed by sweeps, ever.
    pub freed_total: u64,
    /// Series marked in the most recent cycle.
    pub last_marked: usize,
    /// Series freed in the most recent cycle.
    pub last_freed: usize,
}
