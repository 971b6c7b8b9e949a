//! Handle ids shared between the host and the guest registry
//!
//! The guest keeps every host-held object in a registry keyed by a numeric
//! id. `ScriptHandle` is that id on the Rust side; it crosses the boundary
//! as a plain guest number.

use rquickjs::{Ctx, FromJs, IntoJs, Value};

/// Opaque handle for script access
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub u64);

impl<'js> FromJs<'js> for ScriptHandle {
    fn from_js(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<Self> {
        u64::from_js(ctx, value).map(ScriptHandle)
    }
}

impl<'js> IntoJs<'js> for ScriptHandle {
    fn into_js(self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        self.0.into_js(ctx)
    }
}

impl From<ScriptHandle> for u64 {
    fn from(handle: ScriptHandle) -> Self {
        handle.0
    }
}
