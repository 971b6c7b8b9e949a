//! Handles across the boundary
//!
//! Guest objects reach the host as `GuestRef`s. The guest registry keeps one
//! hold per live `GuestHandle`, and the bridge's guest table maps registry
//! ids back to live handles so the same object always comes back as the same
//! handle.
//!
//! Host objects reach the guest as proxy functions. Every crossing makes a
//! fresh proxy owning one `HostObject` clone, which the engine's finalizer
//! gives back.

use crate::bridge::Shared;
use crate::call::dispatch_host;
use crate::error::translate;
use crate::ffi::ScriptHandle;
use crate::prelude::Prelude;
use crate::value::{HostObject, Value};
use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Function};
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use tandem_core::{BridgeError, BridgingFault, ForeignHandle, RefOrigin};

// ============================================================================
// Guest objects held by the host
// ============================================================================

pub(crate) struct GuestOrigin {
    shared: Weak<Shared>,
}

impl RefOrigin for GuestOrigin {
    type Token = ScriptHandle;

    fn release(&self, _id: u64, token: ScriptHandle) {
        // A torn-down bridge took its registry with it.
        if let Some(shared) = self.shared.upgrade() {
            shared.stats.increment("guest.release", 1);
            shared.script.release_guest(token);
        }
    }
}

pub(crate) struct GuestHandle {
    handle: ForeignHandle<GuestOrigin>,
    type_name: String,
    callable: bool,
}

impl Drop for GuestHandle {
    fn drop(&mut self) {
        if let Some(shared) = self.handle.origin().shared.upgrade() {
            shared
                .guests
                .remove_if(&self.handle.id(), |_, live| live.strong_count() == 0);
        }
    }
}

/// A host-side reference to a guest object.
///
/// Clones share one registry hold. The hold is given back when the last
/// clone drops, or earlier through [`GuestRef::release`].
#[derive(Clone)]
pub struct GuestRef {
    handle: Arc<GuestHandle>,
    receiver: Option<Arc<Value>>,
}

impl GuestRef {
    /// Registry id of the referenced object.
    pub fn id(&self) -> u64 {
        self.handle.handle.id()
    }

    /// Constructor name of the referenced object, or its `typeof`.
    pub fn type_name(&self) -> &str {
        &self.handle.type_name
    }

    pub fn is_callable(&self) -> bool {
        self.handle.callable
    }

    /// Same object, invoked with `receiver` as `this` unless a call
    /// supplies one.
    pub fn bind(&self, receiver: Value) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
            receiver: Some(Arc::new(receiver)),
        }
    }

    pub fn receiver(&self) -> Option<&Value> {
        self.receiver.as_deref()
    }

    /// Give the registry hold back now. Every clone is released with it.
    /// Returns `false` if it was already given back.
    pub fn release(&self) -> bool {
        self.handle.handle.release()
    }

    pub fn is_released(&self) -> bool {
        self.handle.handle.is_released()
    }

    /// True when both refer to the same guest object, bound or not.
    pub fn same_object(&self, other: &GuestRef) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }

    pub(crate) fn script_handle(&self) -> Result<ScriptHandle, BridgingFault> {
        self.handle.handle.token(|token| *token)
    }

    pub(crate) fn belongs_to(&self, shared: &Arc<Shared>) -> bool {
        std::ptr::eq(
            self.handle.handle.origin().shared.as_ptr(),
            Arc::as_ptr(shared),
        )
    }
}

impl PartialEq for GuestRef {
    fn eq(&self, other: &Self) -> bool {
        self.same_object(other) && self.receiver == other.receiver
    }
}

impl fmt::Debug for GuestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestRef")
            .field("id", &self.id())
            .field("type", &self.type_name())
            .field("released", &self.is_released())
            .field("bound", &self.receiver.is_some())
            .finish()
    }
}

/// Hand `value` to the host, reusing the live handle for it if there is one.
pub(crate) fn wrap_guest<'js>(
    shared: &Arc<Shared>,
    prelude: &Prelude<'js>,
    value: &rquickjs::Value<'js>,
) -> Result<GuestRef, BridgeError> {
    if let Some(id) = prelude.lookup(value)? {
        let live = shared
            .guests
            .get(&id.0)
            .and_then(|entry| entry.value().upgrade());
        if let Some(handle) = live {
            return Ok(GuestRef {
                handle,
                receiver: None,
            });
        }
    }

    let id = prelude.hold(value)?;
    let handle = Arc::new(GuestHandle {
        handle: ForeignHandle::wrap(
            id.0,
            GuestOrigin {
                shared: Arc::downgrade(shared),
            },
            id,
        ),
        type_name: prelude.type_name(value)?,
        callable: value.is_function(),
    });
    shared.guests.insert(id.0, Arc::downgrade(&handle));
    shared.stats.increment("guest.wrap", 1);
    Ok(GuestRef {
        handle,
        receiver: None,
    })
}

// ============================================================================
// Host objects held by the guest
// ============================================================================

pub(crate) struct HostOrigin {
    shared: Weak<Shared>,
}

impl RefOrigin for HostOrigin {
    type Token = HostObject;

    fn release(&self, id: u64, token: HostObject) {
        drop(token);
        if let Some(shared) = self.shared.upgrade() {
            shared.hosts.remove(&id);
            shared.stats.increment("host.release", 1);
        }
    }
}

pub(crate) type HostProxy = ForeignHandle<HostOrigin>;

/// Build a guest function standing in for `object`.
pub(crate) fn make_proxy<'js>(
    shared: &Arc<Shared>,
    prelude: &Prelude<'js>,
    object: &HostObject,
) -> Result<rquickjs::Value<'js>, BridgeError> {
    let ctx = prelude.ctx();
    let id = shared.next_host_id.fetch_add(1, Ordering::Relaxed);
    let proxy = Arc::new(ForeignHandle::wrap(
        id,
        HostOrigin {
            shared: Arc::downgrade(shared),
        },
        object.clone(),
    ));
    shared.hosts.insert(id, Arc::downgrade(&proxy));
    shared.stats.increment("host.wrap", 1);

    let bridge = Arc::downgrade(shared);
    let function = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>,
              this: This<rquickjs::Value<'js>>,
              args: Rest<rquickjs::Value<'js>>|
              -> rquickjs::Result<rquickjs::Value<'js>> {
            dispatch_host(&ctx, &bridge, &proxy, this.0, args.0)
        },
    )
    .and_then(|function| function.with_name(object.type_name()))
    .map_err(|err| translate(ctx, err))?;

    Ok(prelude.mark_host(function, id)?.into_value())
}

/// The host object behind a proxy function, if `value` is one.
pub(crate) fn unwrap_proxy<'js>(
    shared: &Arc<Shared>,
    prelude: &Prelude<'js>,
    value: &rquickjs::Value<'js>,
) -> Result<Option<HostObject>, BridgeError> {
    let Some(id) = prelude.host_id(value)? else {
        return Ok(None);
    };
    let proxy = shared
        .hosts
        .get(&id)
        .and_then(|entry| entry.value().upgrade())
        .ok_or(BridgingFault::UseAfterRelease { id })?;
    Ok(Some(proxy.token(HostObject::clone)?))
}
