//! Foreign handles and their one-shot release guard
//!
//! A `ForeignHandle` owns exactly one origin-side reference. The reference
//! token lives in a `ReleaseGuard`, which hands it out at most once, so a
//! second release (explicit or from `Drop`) has nothing left to decrement.

use crate::error::BridgingFault;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifecycle of a guarded origin reference.
#[derive(Debug)]
pub enum HandleState<T> {
    Live(T),
    Released,
}

/// Holds an origin reference until it is taken exactly once.
pub struct ReleaseGuard<T> {
    state: Mutex<HandleState<T>>,
}

impl<T> ReleaseGuard<T> {
    pub fn new(token: T) -> Self {
        Self {
            state: Mutex::new(HandleState::Live(token)),
        }
    }

    fn state(&self) -> MutexGuard<'_, HandleState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the token out. Only the first caller gets `Some`.
    pub fn take(&self) -> Option<T> {
        match std::mem::replace(&mut *self.state(), HandleState::Released) {
            HandleState::Live(token) => Some(token),
            HandleState::Released => None,
        }
    }

    /// Run `f` against the token if it has not been released yet.
    pub fn with_live<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        match &*self.state() {
            HandleState::Live(token) => Some(f(token)),
            HandleState::Released => None,
        }
    }

    pub fn is_released(&self) -> bool {
        matches!(*self.state(), HandleState::Released)
    }
}

/// The runtime that owns the objects behind a family of handles.
pub trait RefOrigin: Send + Sync {
    /// Proof of one origin-side reference.
    type Token: Send;

    /// Give the reference behind `token` back to the origin runtime.
    fn release(&self, id: u64, token: Self::Token);
}

/// A destination-side proxy for one object native to `O`.
pub struct ForeignHandle<O: RefOrigin> {
    id: u64,
    origin: O,
    guard: ReleaseGuard<O::Token>,
}

impl<O: RefOrigin> ForeignHandle<O> {
    /// Adopt a token for which exactly one origin reference was just taken.
    pub fn wrap(id: u64, origin: O, token: O::Token) -> Self {
        tracing::debug!(id, "foreign handle wrapped");
        Self {
            id,
            origin,
            guard: ReleaseGuard::new(token),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn origin(&self) -> &O {
        &self.origin
    }

    /// Borrow the live token, failing once the handle has been released.
    pub fn token<R>(&self, f: impl FnOnce(&O::Token) -> R) -> Result<R, BridgingFault> {
        self.guard
            .with_live(f)
            .ok_or(BridgingFault::UseAfterRelease { id: self.id })
    }

    /// Return the origin reference. Returns `false` if it was already returned.
    pub fn release(&self) -> bool {
        match self.guard.take() {
            Some(token) => {
                self.origin.release(self.id, token);
                tracing::debug!(id = self.id, "foreign handle released");
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.guard.is_released()
    }
}

impl<O: RefOrigin> Drop for ForeignHandle<O> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<O: RefOrigin> fmt::Debug for ForeignHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignHandle")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Origin whose objects are plain reference counters.
    #[derive(Clone, Default)]
    struct CountingOrigin {
        refs: Arc<AtomicUsize>,
    }

    impl CountingOrigin {
        fn wrap(&self, id: u64) -> ForeignHandle<CountingOrigin> {
            self.refs.fetch_add(1, Ordering::SeqCst);
            ForeignHandle::wrap(id, self.clone(), id)
        }

        fn count(&self) -> usize {
            self.refs.load(Ordering::SeqCst)
        }
    }

    impl RefOrigin for CountingOrigin {
        type Token = u64;

        fn release(&self, _id: u64, _token: u64) {
            self.refs.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_release_guard_is_one_shot() {
        let guard = ReleaseGuard::new(7);
        assert_eq!(guard.with_live(|v| *v), Some(7));
        assert_eq!(guard.take(), Some(7));
        assert!(guard.is_released());
        assert_eq!(guard.take(), None);
        assert_eq!(guard.with_live(|v| *v), None);
    }

    #[test]
    fn test_wrap_then_release_balances() {
        let origin = CountingOrigin::default();
        let handle = origin.wrap(1);
        assert_eq!(origin.count(), 1);

        assert!(handle.release());
        assert_eq!(origin.count(), 0);
    }

    #[test]
    fn test_double_release_decrements_once() {
        let origin = CountingOrigin::default();
        let _other = origin.wrap(2);
        let handle = origin.wrap(1);
        assert_eq!(origin.count(), 2);

        assert!(handle.release());
        assert!(!handle.release());
        assert_eq!(origin.count(), 1);

        drop(handle);
        assert_eq!(origin.count(), 1);
    }

    #[test]
    fn test_drop_releases() {
        let origin = CountingOrigin::default();
        {
            let _handle = origin.wrap(3);
            assert_eq!(origin.count(), 1);
        }
        assert_eq!(origin.count(), 0);
    }

    #[test]
    fn test_token_after_release_is_fault() {
        let origin = CountingOrigin::default();
        let handle = origin.wrap(9);
        assert_eq!(handle.token(|t| *t), Ok(9));
        handle.release();
        assert_eq!(
            handle.token(|t| *t),
            Err(BridgingFault::UseAfterRelease { id: 9 })
        );
    }

    #[test]
    fn test_concurrent_release_races_decrement_once() {
        let origin = CountingOrigin::default();
        let handle = Arc::new(origin.wrap(4));
        let wins = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if handle.release() {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(origin.count(), 0);
    }
}
