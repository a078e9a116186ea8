/// Creation-time configuration, mirroring the `HubConfig` pattern: a plain
/// struct with a `Default` impl, overridable by environment variables read
/// once at `create()` time.
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    pub directory_capacity: u32,
    pub lock_staleness_ns: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        let directory_capacity = std::env::var("ZEROIPC_DIRECTORY_CAPACITY")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(64);
        Self {
            directory_capacity,
            lock_staleness_ns: 5_000_000_000,
        }
    }
}

/// Scales timeouts in integration tests; never read on any hot path.
pub fn test_timing_multiplier() -> f64 {
    std::env::var("ZEROIPC_TEST_TIMING_MULTIPLIER")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1.0)
}
