// src/pipeline/cache.rs - Bounded cache for name decompositions
//
// Target-side names recur across every source record in a batch; parsing
// them once is enough. LRU with a fixed capacity, never unbounded.
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::normalize::decompose::{parse_name, NameStructure};

const MIN_CAPACITY: usize = 16;

pub struct PipelineCache {
    entries: Mutex<LruCache<String, Arc<NameStructure>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl PipelineCache {
    pub fn new(capacity: usize) -> PipelineCache {
        let cap = NonZeroUsize::new(capacity.max(MIN_CAPACITY)).unwrap_or(NonZeroUsize::MIN);
        PipelineCache {
            entries: Mutex::new(LruCache::new(cap)),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Parsed structure for a raw name, decomposing on miss.
    pub fn decompose(&self, name: &str) -> Arc<NameStructure> {
        let mut guard = match self.entries.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(hit) = guard.get(name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let parsed = Arc::new(parse_name(name));
        guard.put(name.to_string(), Arc::clone(&parsed));
        parsed
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let total = hits + self.misses.load(Ordering::Relaxed);
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_hits_on_repeat() {
        let cache = PipelineCache::new(64);
        let first = cache.decompose("上海为民食品厂");
        let second = cache.decompose("上海为民食品厂");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(cache.hit_rate() > 0.0);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = PipelineCache::new(16);
        for i in 0..100 {
            cache.decompose(&format!("单位{}", i));
        }
        let guard = cache.entries.lock().unwrap();
        assert!(guard.len() <= 16);
    }
}
