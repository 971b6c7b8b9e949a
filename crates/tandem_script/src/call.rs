//! Calls across the boundary in both directions

use crate::bridge::{Bridge, Shared};
use crate::codec::Codec;
use crate::error::{throw_into_guest, translate};
use crate::handle::{GuestRef, HostProxy};
use crate::prelude::Prelude;
use crate::value::{HostCall, HostFunction, HostObject, Value};
use rquickjs::function::Args;
use rquickjs::Ctx;
use std::sync::{Arc, Weak};
use tandem_core::{BridgeError, BridgingFault, Side};

type JsValue<'js> = rquickjs::Value<'js>;

/// Call a guest function with host arguments.
///
/// `this` is the explicit receiver, else the bound one, else the guest
/// global object.
pub(crate) fn invoke_guest<'js>(
    codec: &Codec<'_, 'js>,
    callable: &GuestRef,
    args: &[Value],
    receiver: Option<&Value>,
) -> Result<Value, BridgeError> {
    let ctx = codec.prelude().ctx();
    let target = codec.guest_target(callable)?;
    let Some(function) = target.as_function() else {
        return Err(BridgeError::origin(
            Side::Guest,
            "TypeError",
            format!("{} object is not callable", callable.type_name()),
        ));
    };

    let this = match receiver.or(callable.receiver()) {
        Some(receiver) => codec.to_guest(receiver)?,
        None => ctx.globals().into_value(),
    };
    let mut call_args = Args::new(ctx.clone(), args.len());
    call_args.this(this).map_err(|err| translate(ctx, err))?;
    for arg in args {
        let arg = codec.to_guest(arg)?;
        call_args.push_arg(arg).map_err(|err| translate(ctx, err))?;
    }

    let result: JsValue<'js> = function
        .call_arg(call_args)
        .map_err(|err| translate(ctx, err))?;
    codec.to_host(&result)
}

/// Call a host function with already converted arguments.
///
/// `this` is the explicit receiver, else the bound one, else
/// `Value::Absent`.
pub(crate) fn call_host(
    bridge: &Bridge,
    function: &HostFunction,
    args: Vec<Value>,
    receiver: Option<Value>,
) -> Result<Value, BridgeError> {
    if let Some(arity) = function.arity() {
        if args.len() < arity {
            return Err(BridgeError::origin(
                Side::Host,
                "TypeError",
                format!(
                    "{}() takes at least {arity} argument(s), {} given",
                    function.name(),
                    args.len()
                ),
            ));
        }
    }
    let receiver = receiver
        .or_else(|| function.receiver().cloned())
        .unwrap_or(Value::Absent);
    bridge.shared().stats.increment("host.call", 1);
    function.call(HostCall {
        bridge,
        receiver,
        args,
    })
}

/// Body of every host proxy function. Runs on the thread that is already
/// executing guest code, so the lock is held.
pub(crate) fn dispatch_host<'js>(
    ctx: &Ctx<'js>,
    shared: &Weak<Shared>,
    proxy: &Arc<HostProxy>,
    this: JsValue<'js>,
    args: Vec<JsValue<'js>>,
) -> rquickjs::Result<JsValue<'js>> {
    let Some(shared) = shared.upgrade() else {
        return Err(throw_into_guest(ctx, &BridgingFault::TornDown.into()));
    };
    let bridge = Bridge::from_shared(shared);
    proxy_call(ctx, &bridge, proxy, this, args).map_err(|err| throw_into_guest(ctx, &err))
}

fn proxy_call<'js>(
    ctx: &Ctx<'js>,
    bridge: &Bridge,
    proxy: &Arc<HostProxy>,
    this: JsValue<'js>,
    args: Vec<JsValue<'js>>,
) -> Result<JsValue<'js>, BridgeError> {
    let object = proxy.token(HostObject::clone)?;
    let function = object.as_function().ok_or_else(|| {
        BridgeError::origin(
            Side::Host,
            "TypeError",
            format!("{} object is not callable", object.type_name()),
        )
    })?;

    let prelude = Prelude::new(ctx)?;
    let codec = Codec::new(bridge.shared(), &prelude);
    let receiver = if this.type_of().is_void() {
        None
    } else {
        Some(codec.to_host(&this)?)
    };
    let args = args
        .iter()
        .map(|arg| codec.to_host(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let result = call_host(bridge, function, args, receiver)?;
    codec.to_guest(&result)
}
