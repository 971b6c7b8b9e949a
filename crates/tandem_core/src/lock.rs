//! Guest execution lock
//!
//! The guest runtime runs at most one thread at a time. `ExecutionLock` is
//! the single serialization point for every crossing into it:
//!
//! - **Idle**: nobody executes guest code.
//! - **Active**: one owner thread executes guest code, possibly through a
//!   chain of nested crossings (guest calls host calls guest...).
//!
//! Acquisition is depth-tracked. Only the outermost guard of the owning
//! thread actually flips Idle/Active; nested guards just count. Other
//! threads block until the owner drops back to Idle.

use crate::error::BridgingFault;
use std::marker::PhantomData;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tandem_metrics::{Counter, Gauge, GaugeGuard};

/// Externally visible lock phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    Idle,
    Active { depth: usize },
}

#[derive(Debug)]
enum LockState {
    Idle,
    Active { owner: ThreadId, depth: usize },
}

pub struct ExecutionLock {
    state: Mutex<LockState>,
    released: Condvar,
    occupancy: Gauge,
    events: Counter,
}

/// Proof that the current thread holds the lock. Not `Send`: it must be
/// dropped on the thread that acquired it.
pub struct ExecutionGuard<'a> {
    lock: &'a ExecutionLock,
    outermost: bool,
    occupancy: Option<GaugeGuard<'a>>,
    _not_send: PhantomData<*const ()>,
}

impl ExecutionLock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::Idle),
            released: Condvar::new(),
            occupancy: Gauge::new(),
            events: Counter::new(),
        }
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the current thread may execute guest code.
    ///
    /// Re-acquiring on the owning thread never blocks; it deepens the
    /// current hold instead.
    pub fn acquire(&self) -> ExecutionGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state();
        let outermost = loop {
            match *state {
                LockState::Idle => {
                    *state = LockState::Active {
                        owner: me,
                        depth: 1,
                    };
                    break true;
                }
                LockState::Active {
                    owner,
                    ref mut depth,
                } if owner == me => {
                    *depth += 1;
                    break false;
                }
                LockState::Active { .. } => {}
            }
            state = self
                .released
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        };
        drop(state);

        if outermost {
            tracing::trace!(thread = ?me, "guest lock active");
            self.events.increment("lock.acquire", 1);
        } else {
            self.events.increment("lock.reenter", 1);
        }
        self.guard(outermost)
    }

    /// Acquire without blocking. Fails only when another thread is Active.
    pub fn try_acquire(&self) -> Option<ExecutionGuard<'_>> {
        let me = thread::current().id();
        let mut state = self.state();
        let outermost = match *state {
            LockState::Idle => {
                *state = LockState::Active {
                    owner: me,
                    depth: 1,
                };
                true
            }
            LockState::Active {
                owner,
                ref mut depth,
            } if owner == me => {
                *depth += 1;
                false
            }
            LockState::Active { .. } => return None,
        };
        drop(state);
        Some(self.guard(outermost))
    }

    /// Deepen an existing hold of the current thread without blocking.
    pub fn reenter(&self) -> Result<ExecutionGuard<'_>, BridgingFault> {
        let me = thread::current().id();
        let mut state = self.state();
        match *state {
            LockState::Active {
                owner,
                ref mut depth,
            } if owner == me => {
                *depth += 1;
            }
            _ => {
                tracing::error!(thread = ?me, "re-entry attempted without holding the guest lock");
                return Err(BridgingFault::LockReentry);
            }
        }
        drop(state);
        self.events.increment("lock.reenter", 1);
        Ok(self.guard(false))
    }

    fn guard(&self, outermost: bool) -> ExecutionGuard<'_> {
        ExecutionGuard {
            lock: self,
            outermost,
            occupancy: outermost.then(|| self.occupancy.enter()),
            _not_send: PhantomData,
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        matches!(*self.state(), LockState::Active { owner, .. } if owner == thread::current().id())
    }

    pub fn phase(&self) -> LockPhase {
        match *self.state() {
            LockState::Idle => LockPhase::Idle,
            LockState::Active { depth, .. } => LockPhase::Active { depth },
        }
    }

    /// Most threads ever observed inside the lock at once.
    pub fn peak_occupancy(&self) -> usize {
        self.occupancy.peak()
    }

    pub fn events(&self) -> &Counter {
        &self.events
    }
}

impl Default for ExecutionLock {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExecutionLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLock")
            .field("phase", &self.phase())
            .finish()
    }
}

impl ExecutionGuard<'_> {
    /// True for the guard that moved the lock from Idle to Active.
    pub fn is_outermost(&self) -> bool {
        self.outermost
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        // Leave the gauge before another thread can become Active.
        drop(self.occupancy.take());

        let mut state = self.lock.state();
        let now_idle = match *state {
            LockState::Active { ref mut depth, .. } if *depth > 1 => {
                *depth -= 1;
                false
            }
            _ => true,
        };
        if now_idle {
            *state = LockState::Idle;
            drop(state);
            self.lock.released.notify_one();
            tracing::trace!("guest lock idle");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn test_idle_active_transitions() {
        let lock = ExecutionLock::new();
        assert_eq!(lock.phase(), LockPhase::Idle);
        {
            let guard = lock.acquire();
            assert!(guard.is_outermost());
            assert_eq!(lock.phase(), LockPhase::Active { depth: 1 });
            assert!(lock.is_held_by_current_thread());
        }
        assert_eq!(lock.phase(), LockPhase::Idle);
        assert!(!lock.is_held_by_current_thread());
    }

    #[test]
    fn test_reentrant_acquire_tracks_depth() {
        let lock = ExecutionLock::new();
        let outer = lock.acquire();
        {
            let inner = lock.acquire();
            assert!(!inner.is_outermost());
            let innermost = lock.reenter().unwrap();
            assert!(!innermost.is_outermost());
            assert_eq!(lock.phase(), LockPhase::Active { depth: 3 });
        }
        assert_eq!(lock.phase(), LockPhase::Active { depth: 1 });
        drop(outer);
        assert_eq!(lock.phase(), LockPhase::Idle);
        assert_eq!(lock.events().get("lock.acquire"), 1);
        assert_eq!(lock.events().get("lock.reenter"), 2);
    }

    #[test]
    fn test_reenter_without_hold_is_fault() {
        let lock = ExecutionLock::new();
        assert_eq!(lock.reenter().err(), Some(BridgingFault::LockReentry));

        let _held = lock.acquire();
        thread::scope(|scope| {
            scope.spawn(|| {
                assert_eq!(lock.reenter().err(), Some(BridgingFault::LockReentry));
                assert!(!lock.is_held_by_current_thread());
            });
        });
    }

    #[test]
    fn test_try_acquire_never_blocks() {
        let lock = ExecutionLock::new();
        let outer = lock.try_acquire().unwrap();
        assert!(outer.is_outermost());
        assert!(!lock.try_acquire().unwrap().is_outermost());

        thread::scope(|scope| {
            scope.spawn(|| assert!(lock.try_acquire().is_none()));
        });
        drop(outer);
        assert_eq!(lock.phase(), LockPhase::Idle);
    }

    #[test]
    fn test_other_thread_blocks_until_idle() {
        let lock = Arc::new(ExecutionLock::new());
        let entered = Arc::new(AtomicBool::new(false));
        let guard = lock.acquire();

        let waiter = {
            let lock = Arc::clone(&lock);
            let entered = Arc::clone(&entered);
            thread::spawn(move || {
                let _guard = lock.acquire();
                entered.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!entered.load(Ordering::SeqCst));

        drop(guard);
        waiter.join().unwrap();
        assert!(entered.load(Ordering::SeqCst));
        assert_eq!(lock.phase(), LockPhase::Idle);
    }

    #[test]
    fn test_threads_never_overlap() {
        const THREADS: usize = 4;
        let lock = ExecutionLock::new();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);
        let start = Barrier::new(THREADS);

        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    start.wait();
                    for _ in 0..200 {
                        let _outer = lock.acquire();
                        let _nested = lock.acquire();
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        std::hint::spin_loop();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(lock.peak_occupancy() <= 1);
        assert_eq!(lock.phase(), LockPhase::Idle);
    }
}
