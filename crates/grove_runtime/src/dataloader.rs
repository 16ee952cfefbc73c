//! Batch loading for grove.
//!
//! Provides batching and caching to prevent N+1 queries. Keys requested
//! through [`BatchLoader::load`] are queued; the first time any of the
//! returned lazy values is forced, every queued key is fetched in one call to
//! the batch function.

use crate::lazy::LazyValue;
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

/// A source of batched, cached data that the scheduler can reset.
pub trait BatchSource {
    /// Drops every cached result.
    fn clear_cache(&self);

    /// Number of keys waiting for the next batch.
    fn pending(&self) -> usize;
}

type BatchFn<K, V> = dyn Fn(&[K]) -> HashMap<K, V>;

struct LoaderState<K, V> {
    cache: FxHashMap<K, Option<V>>,
    queue: Vec<K>,
    batches: usize,
}

/// A loader that batches and caches loads.
///
/// Handles are cheap to clone and share one queue and cache.
pub struct BatchLoader<K, V> {
    batch_fn: Rc<BatchFn<K, V>>,
    state: Rc<RefCell<LoaderState<K, V>>>,
    max_batch_size: Option<usize>,
}

impl<K, V> Clone for BatchLoader<K, V> {
    fn clone(&self) -> Self {
        Self {
            batch_fn: Rc::clone(&self.batch_fn),
            state: Rc::clone(&self.state),
            max_batch_size: self.max_batch_size,
        }
    }
}

impl<K, V> BatchLoader<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    /// Creates a new loader. The batch function receives the queued keys in
    /// request order; keys missing from its result load as `None`.
    pub fn new(batch_fn: impl Fn(&[K]) -> HashMap<K, V> + 'static) -> Self {
        Self {
            batch_fn: Rc::new(batch_fn),
            state: Rc::new(RefCell::new(LoaderState {
                cache: FxHashMap::default(),
                queue: Vec::new(),
                batches: 0,
            })),
            max_batch_size: None,
        }
    }

    /// Splits dispatches into batches of at most `size` keys.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Some(size.max(1));
        self
    }

    /// Loads a value by key.
    pub fn load(&self, key: K) -> LazyValue<Option<V>> {
        {
            let mut state = self.state.borrow_mut();
            if let Some(value) = state.cache.get(&key) {
                return LazyValue::ready(value.clone());
            }
            if !state.queue.contains(&key) {
                state.queue.push(key.clone());
            }
        }
        let loader = self.clone();
        LazyValue::new(move || loader.resolve(&key))
    }

    /// Loads several values; forcing the result dispatches them together.
    pub fn load_many(&self, keys: Vec<K>) -> LazyValue<Vec<Option<V>>> {
        let lazies: Vec<_> = keys.into_iter().map(|key| self.load(key)).collect();
        LazyValue::new(move || lazies.iter().map(LazyValue::force).collect())
    }

    /// Primes the cache with a value.
    pub fn prime(&self, key: K, value: V) {
        self.state.borrow_mut().cache.insert(key, Some(value));
    }

    /// Clears the cache.
    pub fn clear(&self) {
        self.state.borrow_mut().cache.clear();
    }

    /// Clears a specific key from the cache.
    pub fn clear_key(&self, key: &K) {
        self.state.borrow_mut().cache.remove(key);
    }

    /// Number of times the batch function has been called.
    pub fn batch_count(&self) -> usize {
        self.state.borrow().batches
    }

    fn resolve(&self, key: &K) -> Option<V> {
        let cached = self.state.borrow().cache.get(key).cloned();
        if let Some(value) = cached {
            return value;
        }
        self.dispatch();
        let mut state = self.state.borrow_mut();
        // A key cleared between queueing and forcing is fetched on its own.
        if !state.cache.contains_key(key) {
            drop(state);
            self.fetch(std::slice::from_ref(key));
            state = self.state.borrow_mut();
        }
        state.cache.get(key).cloned().flatten()
    }

    /// Fetches every queued key.
    fn dispatch(&self) {
        let queue = std::mem::take(&mut self.state.borrow_mut().queue);
        if queue.is_empty() {
            return;
        }
        let size = self.max_batch_size.unwrap_or(queue.len());
        for chunk in queue.chunks(size) {
            self.fetch(chunk);
        }
    }

    fn fetch(&self, keys: &[K]) {
        tracing::trace!(keys = keys.len(), "dispatching batch");
        // The state is not borrowed while the batch function runs, so it may
        // queue further loads.
        let mut results = (self.batch_fn)(keys);
        let mut state = self.state.borrow_mut();
        state.batches += 1;
        for key in keys {
            let value = results.remove(key);
            state.cache.insert(key.clone(), value);
        }
    }
}

impl<K, V> BatchSource for BatchLoader<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn clear_cache(&self) {
        self.clear();
    }

    fn pending(&self) -> usize {
        self.state.borrow().queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubling_loader(log: Rc<RefCell<Vec<Vec<i32>>>>) -> BatchLoader<i32, i32> {
        BatchLoader::new(move |keys: &[i32]| {
            log.borrow_mut().push(keys.to_vec());
            keys.iter().map(|k| (*k, k * 2)).collect()
        })
    }

    #[test]
    fn test_loads_are_batched() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let loader = doubling_loader(Rc::clone(&log));

        let a = loader.load(1);
        let b = loader.load(2);
        let c = loader.load(3);
        assert_eq!(loader.pending(), 3);
        assert!(log.borrow().is_empty());

        assert_eq!(b.force(), Some(4));
        assert_eq!(a.force(), Some(2));
        assert_eq!(c.force(), Some(6));
        assert_eq!(*log.borrow(), vec![vec![1, 2, 3]]);
        assert_eq!(loader.batch_count(), 1);
    }

    #[test]
    fn test_cached_keys_are_ready() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let loader = doubling_loader(Rc::clone(&log));

        loader.load(5).force();
        let again = loader.load(5);
        assert!(again.is_resolved());
        assert_eq!(again.force(), Some(10));
        assert_eq!(loader.batch_count(), 1);

        loader.prime(7, 0);
        assert_eq!(loader.load(7).force(), Some(0));
        assert_eq!(loader.batch_count(), 1);
    }

    #[test]
    fn test_missing_keys_load_none() {
        let loader: BatchLoader<i32, i32> = BatchLoader::new(|keys: &[i32]| {
            keys.iter().filter(|k| **k > 0).map(|k| (*k, *k)).collect()
        });
        let missing = loader.load(-1);
        let present = loader.load(1);
        assert_eq!(missing.force(), None);
        assert_eq!(present.force(), Some(1));
    }

    #[test]
    fn test_batch_size_and_clear() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let loader = doubling_loader(Rc::clone(&log)).batch_size(2);

        let all = loader.load_many(vec![1, 2, 3]);
        assert_eq!(all.force(), vec![Some(2), Some(4), Some(6)]);
        assert_eq!(*log.borrow(), vec![vec![1, 2], vec![3]]);

        loader.clear_cache();
        loader.load(1).force();
        assert_eq!(loader.batch_count(), 3);

        loader.clear_key(&1);
        assert!(!loader.load(1).is_resolved());
    }
}
