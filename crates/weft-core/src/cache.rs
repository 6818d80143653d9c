use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::context::Context;
use crate::graph::GraphComponent;
use crate::hash::Fingerprint;
use crate::process::{Process, ProcessType};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(capacity) => capacity,
    None => panic!("default cache capacity must be > 0"),
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheConfig {
    pub capacity: NonZeroUsize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Least-recently-used cache of computed values, keyed by the fingerprint of
/// everything that went into computing them. Shareable between threads.
pub struct HashCache<V> {
    entries: Mutex<LruCache<Fingerprint, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> Default for HashCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<V: Clone> HashCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, key: Fingerprint, value: V) {
        self.entries.lock().put(key, value);
    }

    /// Returns the cached value for `key`, or computes and caches it.
    ///
    /// The lock is not held while `compute` runs, so two threads missing on
    /// the same key may both compute it; the last one to finish wins.
    pub fn get_or_compute(&self, key: Fingerprint, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.entries.lock().cap()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        log::debug!("hash cache cleared");
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// A unit of work whose result depends only on its inputs and the context,
/// and can therefore be cached by fingerprint.
pub trait ComputeUnit {
    type Output: Clone;

    /// Stable name of the kind of unit, hashed ahead of its inputs. Part of
    /// every fingerprint the unit produces, so changing it invalidates
    /// fingerprints stored elsewhere.
    const TYPE_NAME: &'static str;

    fn component(&self) -> &Arc<GraphComponent>;

    /// Appends everything `compute` depends on for this context.
    fn hash(&self, context: &Context, h: &mut Fingerprint);

    fn compute(&self, context: &Context) -> Self::Output;
}

/// Fingerprints `unit` in `context` inside a hash process. Units with
/// different type names never share a fingerprint for the same inputs.
pub fn hash_unit<U: ComputeUnit + ?Sized>(unit: &U, context: &Context) -> Fingerprint {
    let _process = Process::new(ProcessType::Hash, unit.component(), context);
    let mut h = Fingerprint::new();
    h.append(U::TYPE_NAME);
    unit.hash(context, &mut h);
    h
}

/// Hashes `unit`, then computes it inside a compute process unless `cache`
/// already holds the result.
pub fn evaluate<U: ComputeUnit + ?Sized>(
    unit: &U,
    context: &Context,
    cache: &HashCache<U::Output>,
) -> U::Output {
    let key = hash_unit(unit, context);
    cache.get_or_compute(key, || {
        log::trace!("computing {} ({key})", unit.component().full_name());
        let _process = Process::new(ProcessType::Compute, unit.component(), context);
        unit.compute(context)
    })
}
