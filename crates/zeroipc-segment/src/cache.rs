//! Optional process-local cache of open segment handles, keyed by name.
//!
//! Library consumers are never required to use this: every `Segment` method
//! works standalone. It exists so a process that repeatedly opens the same
//! segment by name (the inspector polling a `watch` target, a long-running
//! service revisiting segments across requests) doesn't re-`mmap` on every
//! call. `Segment` is `Clone` (an `Arc` around the mapping), so a cache hit
//! is just a clone of the existing handle.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::config::SegmentConfig;
use crate::error::SegmentError;
use crate::segment::Segment;

#[derive(Default)]
pub struct SegmentCache {
    read_write: Mutex<HashMap<String, Segment>>,
    read_only: Mutex<HashMap<String, Segment>>,
}

impl SegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cached handle for `name`, opening (read-write) and caching
    /// it on first use.
    pub fn get_or_open(&self, name: &str, config: SegmentConfig) -> Result<Segment, SegmentError> {
        if let Some(seg) = self.read_write.lock().get(name) {
            return Ok(seg.clone());
        }
        let seg = Segment::open(name, config)?;
        self.read_write.lock().insert(name.to_string(), seg.clone());
        Ok(seg)
    }

    /// Same as [`get_or_open`](Self::get_or_open), but via
    /// [`Segment::open_readonly`] — used by the inspector, which never
    /// wants write access.
    pub fn get_or_open_readonly(&self, name: &str, config: SegmentConfig) -> Result<Segment, SegmentError> {
        if let Some(seg) = self.read_only.lock().get(name) {
            return Ok(seg.clone());
        }
        let seg = Segment::open_readonly(name, config)?;
        self.read_only.lock().insert(name.to_string(), seg.clone());
        Ok(seg)
    }

    /// Drops a cached handle so the next `get_or_open*` call remaps fresh
    /// (e.g. after the caller learns the segment was unlinked and recreated).
    pub fn evict(&self, name: &str) {
        self.read_write.lock().remove(name);
        self.read_only.lock().remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_name(tag: &str) -> String {
        format!(
            "/zeroipc_test_cache_{tag}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        )
    }

    #[test]
    fn repeated_lookup_reuses_the_same_mapping() {
        let name = unique_name("reuse");
        let created = Segment::create(&name, 1 << 16, SegmentConfig::default()).unwrap();
        drop(created);

        let cache = SegmentCache::new();
        let a = cache.get_or_open(&name, SegmentConfig::default()).unwrap();
        let b = cache.get_or_open(&name, SegmentConfig::default()).unwrap();
        assert_eq!(a.size(), b.size());

        drop(a);
        drop(b);
        Segment::unlink(&name).unwrap();
    }

    #[test]
    fn evict_forces_a_fresh_open() {
        let name = unique_name("evict");
        let created = Segment::create(&name, 1 << 16, SegmentConfig::default()).unwrap();
        drop(created);

        let cache = SegmentCache::new();
        let _a = cache.get_or_open_readonly(&name, SegmentConfig::default()).unwrap();
        cache.evict(&name);
        let _b = cache.get_or_open_readonly(&name, SegmentConfig::default()).unwrap();

        Segment::unlink(&name).unwrap();
    }
}
