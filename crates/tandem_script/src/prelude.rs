//! Typed access to the guest-side bridge helpers (`prelude.js`)
//!
//! Every helper call happens inside a crossing. Failures come back as
//! `BridgeError`s with any guest exception already caught and translated.

use crate::error::translate;
use crate::ffi::ScriptHandle;
use rquickjs::function::IntoArgs;
use rquickjs::{Array, BigInt, Ctx, FromJs, Function, Object, Value};
use tandem_core::BridgeError;

pub(crate) const PRELUDE_SOURCE: &str = include_str!("prelude.js");
const GLOBAL_NAME: &str = "__tandem";

pub(crate) struct Prelude<'js> {
    ctx: Ctx<'js>,
    helpers: Object<'js>,
}

impl<'js> Prelude<'js> {
    pub fn new(ctx: &Ctx<'js>) -> Result<Self, BridgeError> {
        Self::raw(ctx).map_err(|err| translate(ctx, err))
    }

    /// Look the helpers up without translating failures.
    pub fn raw(ctx: &Ctx<'js>) -> rquickjs::Result<Self> {
        Ok(Self {
            ctx: ctx.clone(),
            helpers: ctx.globals().get(GLOBAL_NAME)?,
        })
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    /// Call a helper without translating failures.
    fn call_raw<A, R>(&self, name: &str, args: A) -> rquickjs::Result<R>
    where
        A: IntoArgs<'js>,
        R: FromJs<'js>,
    {
        let function: Function<'js> = self.helpers.get(name)?;
        function.call(args)
    }

    fn call<A, R>(&self, name: &str, args: A) -> Result<R, BridgeError>
    where
        A: IntoArgs<'js>,
        R: FromJs<'js>,
    {
        self.call_raw(name, args).map_err(|err| translate(&self.ctx, err))
    }

    // ========================================================================
    // Handle registry
    // ========================================================================

    pub fn lookup(&self, value: &Value<'js>) -> Result<Option<ScriptHandle>, BridgeError> {
        self.call("lookup", (value.clone(),))
    }

    pub fn hold(&self, value: &Value<'js>) -> Result<ScriptHandle, BridgeError> {
        self.call("hold", (value.clone(),))
    }

    pub fn release(&self, id: ScriptHandle) -> Result<bool, BridgeError> {
        self.call("release", (id,))
    }

    pub fn get(&self, id: ScriptHandle) -> Result<Value<'js>, BridgeError> {
        self.call("get", (id,))
    }

    pub fn holds(&self, id: ScriptHandle) -> Result<usize, BridgeError> {
        self.call("holds", (id,))
    }

    pub fn live(&self) -> Result<usize, BridgeError> {
        self.call("live", ())
    }

    // ========================================================================
    // Big integers
    // ========================================================================

    /// Sign and magnitude bit length.
    pub fn big_shape(&self, value: &BigInt<'js>) -> Result<(bool, u64), BridgeError> {
        let shape: Array<'js> = self.call("bigShape", (value.clone(),))?;
        let negative = shape.get(0).map_err(|err| translate(&self.ctx, err))?;
        let bits = shape.get(1).map_err(|err| translate(&self.ctx, err))?;
        Ok((negative, bits))
    }

    pub fn export_magnitude(&self, value: &BigInt<'js>) -> Result<Vec<u8>, BridgeError> {
        self.call("exportMagnitude", (value.clone(),))
    }

    pub fn import_magnitude(&self, bytes: Vec<u8>) -> Result<BigInt<'js>, BridgeError> {
        self.call("importMagnitude", (bytes,))
    }

    pub fn negate(&self, value: BigInt<'js>) -> Result<BigInt<'js>, BridgeError> {
        self.call("negate", (value,))
    }

    // ========================================================================
    // Errors and proxies
    // ========================================================================

    /// Class name and message of a thrown guest value.
    ///
    /// Untranslated: this runs while a guest exception is being translated.
    pub fn error_info(&self, thrown: Value<'js>) -> rquickjs::Result<(String, String)> {
        let info: Array<'js> = self.call_raw("errorInfo", (thrown,))?;
        Ok((info.get(0)?, info.get(1)?))
    }

    pub fn make_error(&self, name: &str, message: &str) -> rquickjs::Result<Value<'js>> {
        self.call_raw("makeError", (name, message))
    }

    pub fn mark_host(
        &self,
        function: Function<'js>,
        id: u64,
    ) -> Result<Function<'js>, BridgeError> {
        self.call("markHost", (function, id))
    }

    pub fn host_id(&self, value: &Value<'js>) -> Result<Option<u64>, BridgeError> {
        self.call("hostId", (value.clone(),))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn type_name(&self, value: &Value<'js>) -> Result<String, BridgeError> {
        self.call("typeName", (value.clone(),))
    }

    pub fn get_attr(&self, target: Value<'js>, name: &str) -> Result<Value<'js>, BridgeError> {
        self.call("getAttr", (target, name))
    }

    pub fn dir(&self, target: Value<'js>) -> Result<Vec<String>, BridgeError> {
        self.call("dir", (target,))
    }

    pub fn describe(&self, target: Value<'js>) -> Result<String, BridgeError> {
        self.call("describe", (target,))
    }

    pub fn bind(
        &self,
        function: Value<'js>,
        receiver: Value<'js>,
    ) -> Result<Value<'js>, BridgeError> {
        self.call("bind", (function, receiver))
    }
}
