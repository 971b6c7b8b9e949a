//! Script runtime management
//!
//! `ScriptRuntime` owns the QuickJS runtime and context, the execution lock
//! that serializes every crossing into them, and the queue of guest handles
//! waiting to be released.
//!
//! The engine's own runtime mutex is not reentrant. Only the outermost
//! crossing of a thread enters `Context::with`; it publishes its raw context
//! in a thread-local so nested crossings on the same thread (guest calls
//! host calls guest) can reuse it instead of locking again.

use crate::error::translate;
use crate::ffi::ScriptHandle;
use crate::prelude::{Prelude, PRELUDE_SOURCE};
use rquickjs::{qjs, Context, Ctx, Runtime};
use std::cell::RefCell;
use std::path::Path;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tandem_core::{BridgeError, BridgingFault, ExecutionLock, GuestSettings};

thread_local! {
    /// Contexts of the crossings this thread is inside, keyed by runtime.
    static ACTIVE: RefCell<Vec<(usize, NonNull<qjs::JSContext>)>> =
        const { RefCell::new(Vec::new()) };
}

/// Publishes a context for nested crossings until dropped.
struct Published {
    key: usize,
}

impl Published {
    fn new(key: usize, ctx: &Ctx<'_>) -> Self {
        ACTIVE.with(|active| active.borrow_mut().push((key, ctx.as_raw())));
        Self { key }
    }

    fn lookup(key: usize) -> Option<NonNull<qjs::JSContext>> {
        ACTIVE.with(|active| {
            active
                .borrow()
                .iter()
                .rev()
                .find(|(k, _)| *k == key)
                .map(|(_, raw)| *raw)
        })
    }
}

impl Drop for Published {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(pos) = active.iter().rposition(|(k, _)| *k == self.key) {
                active.remove(pos);
            }
        });
    }
}

/// Script execution context
pub struct ScriptRuntime {
    context: Context,
    runtime: Runtime,
    lock: ExecutionLock,
    pending: Mutex<Vec<ScriptHandle>>,
}

impl ScriptRuntime {
    pub fn new(settings: &GuestSettings) -> Result<Self, BridgeError> {
        let runtime = Runtime::new().map_err(engine_fault)?;
        if let Some(limit) = settings.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(limit) = settings.max_stack_size {
            runtime.set_max_stack_size(limit);
        }
        if let Some(threshold) = settings.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        let context = Context::full(&runtime).map_err(engine_fault)?;

        let script = Self {
            context,
            runtime,
            lock: ExecutionLock::new(),
            pending: Mutex::new(Vec::new()),
        };
        script.execute(PRELUDE_SOURCE)?;
        tracing::debug!(?settings, "guest runtime initialized");
        Ok(script)
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    fn pending(&self) -> MutexGuard<'_, Vec<ScriptHandle>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside a crossing, blocking until this thread may execute
    /// guest code.
    pub fn enter<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: for<'js> FnOnce(&Ctx<'js>) -> Result<R, BridgeError>,
    {
        let guard = self.lock.acquire();
        if !guard.is_outermost() {
            let raw = Published::lookup(self.key()).ok_or_else(|| {
                tracing::error!("nested crossing without a published guest context");
                BridgingFault::MissingContext
            })?;
            // SAFETY: the outermost crossing of this thread is still inside
            // `Context::with` for this runtime, so the engine stays locked
            // and the context alive for the duration of this call.
            let ctx = unsafe { Ctx::from_raw(raw) };
            return f(&ctx);
        }

        let result = self.context.with(|ctx| {
            let _published = Published::new(self.key(), &ctx);
            self.drain_releases(&ctx);
            let result = f(&ctx);
            self.drain_releases(&ctx);
            result
        });
        drop(guard);
        // Releases queued by other threads after the last drain above.
        self.flush_releases();
        result
    }

    pub fn execute(&self, source: &str) -> Result<(), BridgeError> {
        self.enter(|ctx| ctx.eval::<(), _>(source).map_err(|err| translate(ctx, err)))
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), BridgeError> {
        let source = std::fs::read_to_string(path)
            .map_err(|err| BridgingFault::Guest(format!("cannot read {}: {err}", path.display())))?;
        self.execute(&source)
    }

    /// Queue the registry entry `id` for release and apply it now if the
    /// lock is free. Never blocks.
    pub(crate) fn release_guest(&self, id: ScriptHandle) {
        self.pending().push(id);
        self.flush_releases();
    }

    /// Apply queued releases unless some crossing is in progress. Whoever
    /// holds the lock flushes again after letting go of it.
    pub(crate) fn flush_releases(&self) {
        while self.pending_releases() > 0 {
            let Some(guard) = self.lock.try_acquire() else {
                return;
            };
            if !guard.is_outermost() {
                // The outermost crossing of this thread drains on exit.
                return;
            }
            self.context.with(|ctx| {
                let _published = Published::new(self.key(), &ctx);
                self.drain_releases(&ctx);
            });
        }
    }

    fn drain_releases(&self, ctx: &Ctx<'_>) {
        loop {
            let batch = std::mem::take(&mut *self.pending());
            if batch.is_empty() {
                return;
            }
            let prelude = match Prelude::new(ctx) {
                Ok(prelude) => prelude,
                Err(err) => {
                    tracing::error!(%err, dropped = batch.len(), "cannot release guest handles");
                    return;
                }
            };
            for id in batch {
                match prelude.release(id) {
                    Ok(true) => tracing::trace!(id = id.0, "guest registry entry released"),
                    Ok(false) => {
                        let fault = BridgingFault::UseAfterRelease { id: id.0 };
                        tracing::error!(%fault, "guest registry entry was already gone");
                    }
                    Err(err) => tracing::error!(%err, id = id.0, "guest release failed"),
                }
            }
        }
    }

    /// Releases queued while another thread held the lock.
    pub fn pending_releases(&self) -> usize {
        self.pending().len()
    }

    pub fn run_gc(&self) -> Result<(), BridgeError> {
        self.enter(|ctx| {
            ctx.run_gc();
            Ok(())
        })
    }

    pub fn lock(&self) -> &ExecutionLock {
        &self.lock
    }

    /// Bytes allocated by the guest heap. Takes the engine lock directly,
    /// so it is refused inside a crossing.
    pub fn memory_usage(&self) -> Result<i64, BridgeError> {
        if self.lock.is_held_by_current_thread() {
            return Err(BridgingFault::LockReentry.into());
        }
        let guard = self.lock.acquire();
        let used = self.runtime.memory_usage().memory_used_size;
        drop(guard);
        self.flush_releases();
        Ok(used)
    }
}

fn engine_fault(err: rquickjs::Error) -> BridgeError {
    let fault = BridgingFault::Guest(err.to_string());
    tracing::error!(%fault, "guest runtime setup failed");
    fault.into()
}
