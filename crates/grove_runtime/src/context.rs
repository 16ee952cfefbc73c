//! Request-scoped context passed to every hook and resolver.

use crate::dataloader::{BatchLoader, BatchSource};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::hash::Hash;
use std::rc::Rc;

/// Execution context.
#[derive(Default)]
pub struct Context {
    /// Request-scoped data. Custom field extras are read from here.
    pub data: IndexMap<String, serde_json::Value>,
    extensions: FxHashMap<TypeId, Rc<dyn Any>>,
    loaders: Vec<Rc<dyn BatchSource>>,
}

impl Context {
    /// Creates a new context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value in the context.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        if let Ok(v) = serde_json::to_value(value) {
            self.data.insert(key.into(), v);
        }
    }

    /// Gets a value from the context.
    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Stores a typed value, replacing any previous value of that type.
    pub fn insert<T: Any>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Rc::new(value));
    }

    /// Gets a typed value stored with [`Context::insert`].
    pub fn get_ext<T: Any>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Registers a batch loader. It is found again by its key and value
    /// types, and its cache is cleared whenever the scheduler clears caches.
    pub fn register_loader<K, V>(&mut self, loader: BatchLoader<K, V>)
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        self.loaders.push(Rc::new(loader.clone()));
        self.insert(loader);
    }

    /// Gets a handle to a registered loader.
    pub fn loader<K, V>(&self) -> Option<BatchLoader<K, V>>
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        self.get_ext::<BatchLoader<K, V>>().cloned()
    }

    pub(crate) fn batch_sources(&self) -> Vec<Rc<dyn BatchSource>> {
        self.loaders.clone()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("data", &self.data)
            .field("extensions", &self.extensions.len())
            .field("loaders", &self.loaders.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_data_roundtrip() {
        let mut ctx = Context::new();
        ctx.set("viewer_id", 7);
        assert_eq!(ctx.get::<i32>("viewer_id"), Some(7));
        assert_eq!(ctx.get::<String>("viewer_id"), None);
        assert_eq!(ctx.get::<i32>("missing"), None);
    }

    #[test]
    fn test_typed_extensions() {
        struct Viewer {
            admin: bool,
        }
        let mut ctx = Context::new();
        assert!(ctx.get_ext::<Viewer>().is_none());
        ctx.insert(Viewer { admin: true });
        assert!(ctx.get_ext::<Viewer>().is_some_and(|v| v.admin));
    }

    #[test]
    fn test_loader_lookup_shares_state() {
        let mut ctx = Context::new();
        ctx.register_loader(BatchLoader::new(|keys: &[u32]| {
            keys.iter().map(|k| (*k, k.to_string())).collect::<HashMap<_, _>>()
        }));

        let Some(loader) = ctx.loader::<u32, String>() else {
            panic!("loader should be registered");
        };
        loader.load(1);
        let again = ctx.loader::<u32, String>().map(|l| l.pending());
        assert_eq!(again, Some(1));
        assert!(ctx.loader::<u32, u32>().is_none());
        assert_eq!(ctx.batch_sources().len(), 1);
    }
}
