//! Time-bounded cache of the fetched dataset.
//!
//! Every [`TtlCache::invalidate`] bumps a generation counter. A reader
//! captures the generation before it starts loading and hands it back to
//! [`TtlCache::put`], which discards the value if a write invalidated the
//! cache in the meantime.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    entry: Option<(Instant, Arc<T>)>,
}

/// Holds one value for at most `ttl`, or until [`TtlCache::invalidate`].
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: Duration,
    slot: Mutex<Slot<T>>,
}

impl<T> TtlCache<T> {
    /// Creates an empty cache.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(Slot {
                generation: 0,
                entry: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached value if it is younger than the TTL.
    #[must_use]
    pub fn get(&self) -> Option<Arc<T>> {
        let mut slot = self.lock();
        match slot.entry.as_ref() {
            Some((stored_at, value)) if stored_at.elapsed() < self.ttl => Some(Arc::clone(value)),
            Some(_) => {
                slot.entry = None;
                None
            }
            None => None,
        }
    }

    /// Returns the current generation. Capture it before loading a value.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Stores a value loaded since `generation` was captured.
    ///
    /// The value is always returned, but it is only cached if nothing
    /// invalidated the cache after the capture.
    pub fn put(&self, generation: u64, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let mut slot = self.lock();
        if slot.generation == generation {
            slot.entry = Some((Instant::now(), Arc::clone(&value)));
        } else {
            log::debug!("Discarding dataset loaded before the last write");
        }
        value
    }

    /// Drops the cached value and starts a new generation.
    pub fn invalidate(&self) {
        let mut slot = self.lock();
        slot.generation = slot.generation.wrapping_add(1);
        slot.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serves_fresh_values() {
        let cache = TtlCache::new(Duration::from_secs(60));
        assert!(cache.get().is_none());
        cache.put(cache.generation(), vec![1, 2]);
        assert_eq!(*cache.get().unwrap(), vec![1, 2]);
    }

    #[test]
    fn invalidate_clears() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put(cache.generation(), "x");
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[test]
    fn load_overtaken_by_a_write_is_not_cached() {
        let cache = TtlCache::new(Duration::from_secs(60));
        let before_read = cache.generation();
        cache.invalidate();

        let stale = cache.put(before_read, vec!["old"]);
        assert_eq!(*stale, vec!["old"]);
        assert!(cache.get().is_none());

        cache.put(cache.generation(), vec!["new"]);
        assert_eq!(*cache.get().unwrap(), vec!["new"]);
    }

    #[test]
    fn zero_ttl_never_serves() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.put(cache.generation(), 1);
        assert!(cache.get().is_none());
    }
}
