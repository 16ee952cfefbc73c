//! Memoizing deferred values.
//!
//! A [`LazyValue`] wraps a computation that has not run yet. Resolvers,
//! argument `prepare` hooks, authorization hooks and type resolution hooks
//! return one to suspend; the runtime forces it later, grouped by result
//! depth, so that sibling fields get a chance to queue their batch loads
//! before any of them runs.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

enum LazyState<T> {
    Pending(Box<dyn FnOnce() -> T>),
    Forcing,
    Done(T),
}

/// A shared, memoizing deferred computation.
///
/// Clones share the same cell: forcing one forces all of them, and the
/// computation runs at most once.
pub struct LazyValue<T>(Rc<RefCell<LazyState<T>>>);

impl<T> Clone for LazyValue<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: Clone + 'static> LazyValue<T> {
    /// Creates a lazy value that runs `f` when first forced.
    pub fn new(f: impl FnOnce() -> T + 'static) -> Self {
        Self(Rc::new(RefCell::new(LazyState::Pending(Box::new(f)))))
    }

    /// Creates an already-resolved lazy value.
    pub fn ready(value: T) -> Self {
        Self(Rc::new(RefCell::new(LazyState::Done(value))))
    }

    /// Returns true once the computation has run.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.0.borrow(), LazyState::Done(_))
    }

    /// Runs the computation if needed and returns its result.
    ///
    /// # Panics
    ///
    /// Panics if the computation forces its own cell.
    pub fn force(&self) -> T {
        let state = std::mem::replace(&mut *self.0.borrow_mut(), LazyState::Forcing);
        match state {
            LazyState::Done(value) => {
                *self.0.borrow_mut() = LazyState::Done(value.clone());
                value
            }
            LazyState::Pending(f) => {
                let value = f();
                *self.0.borrow_mut() = LazyState::Done(value.clone());
                value
            }
            LazyState::Forcing => panic!("lazy value forced while it was being computed"),
        }
    }

    /// Returns a lazy value that applies `f` to this one's result.
    pub fn map<U: Clone + 'static>(&self, f: impl FnOnce(T) -> U + 'static) -> LazyValue<U> {
        let source = self.clone();
        LazyValue::new(move || f(source.force()))
    }

    /// Returns true if both handles share one cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> fmt::Debug for LazyValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.0.try_borrow().as_deref() {
            Ok(LazyState::Pending(_)) => "pending",
            Ok(LazyState::Done(_)) => "resolved",
            Ok(LazyState::Forcing) | Err(_) => "forcing",
        };
        write!(f, "LazyValue({state})")
    }
}

/// Either a value that is available now or one that must be forced later.
pub enum Settled<T> {
    Ready(T),
    Pending(LazyValue<T>),
}

/// Values that may carry a deferred computation.
///
/// The runtime's `after_lazy` step accepts any `Deferred` value: ready values
/// continue immediately, pending ones are queued by result depth.
pub trait Deferred: Clone + Sized + 'static {
    fn settle(self) -> Settled<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_force_runs_once() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let lazy = LazyValue::new(move || {
            counter.set(counter.get() + 1);
            42
        });
        let other = lazy.clone();

        assert!(!lazy.is_resolved());
        assert_eq!(lazy.force(), 42);
        assert_eq!(other.force(), 42);
        assert_eq!(calls.get(), 1);
        assert!(other.is_resolved());
        assert!(lazy.ptr_eq(&other));
    }

    #[test]
    fn test_map_is_deferred() {
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let base = LazyValue::new(move || {
            counter.set(counter.get() + 1);
            "grove".to_string()
        });
        let len = base.map(|s| s.len());

        assert_eq!(calls.get(), 0);
        assert_eq!(len.force(), 5);
        assert_eq!(calls.get(), 1);
        assert!(base.is_resolved());
    }

    #[test]
    fn test_ready() {
        let lazy = LazyValue::ready(vec![1, 2]);
        assert!(lazy.is_resolved());
        assert_eq!(lazy.force(), vec![1, 2]);
        assert_eq!(format!("{lazy:?}"), "LazyValue(resolved)");
    }

    #[test]
    #[should_panic(expected = "forced while it was being computed")]
    fn test_reentrant_force_panics() {
        let slot: Rc<RefCell<Option<LazyValue<i32>>>> = Rc::new(RefCell::new(None));
        let inner = Rc::clone(&slot);
        let lazy = LazyValue::new(move || {
            let this = inner.borrow().clone();
            this.map_or(0, |l| l.force())
        });
        *slot.borrow_mut() = Some(lazy.clone());
        lazy.force();
    }
}
