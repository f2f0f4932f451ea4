//! GC configuration.

/// Tunables for the collector.
#[derive(Clone, Debug)]
pub struct GcConfig {
    /// Initial arena capacity hint (array arena).
    pub initial_capacity: usize,
    /// How many allocations may happen between collection polls before the
    /// trampoline triggers a cycle.
    pub collect_threshold: usize,
    /// Collect at every poll point, regardless of the threshold.  Used by
    /// tests to surface missing roots immediately.
    pub stress: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            initial_capacity: 256,
            collect_threshold: 4096,
            stress: false,
        }
    }
}

impl GcConfig {
    /// A configuration that collects at every opportunity.
    pub fn stress() -> GcConfig {
        GcConfig { stress: true, ..GcConfig::default() }
    }
}
