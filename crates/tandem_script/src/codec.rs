//! Value conversion between guest values and host `Value`s
//!
//! Primitives and arrays convert by value. Anything else is "opaque": the
//! decoder reports it as such and the caller decides, per `WrapPolicy`,
//! whether it crosses as a handle or is refused.

use crate::bigint;
use crate::bridge::Shared;
use crate::error::translate;
use crate::handle::{make_proxy, unwrap_proxy, wrap_guest, GuestRef};
use crate::prelude::Prelude;
use crate::value::Value;
use rquickjs::{Array, Type};
use std::sync::Arc;
use tandem_core::{BridgeError, BridgingFault};

type JsValue<'js> = rquickjs::Value<'js>;

/// Result of decoding one guest value.
pub(crate) enum Decoded {
    Value(Value),
    /// No value mapping; only a handle can carry it.
    Opaque,
}

/// What to do with opaque guest values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WrapPolicy {
    Wrap,
    Reject,
}

impl WrapPolicy {
    pub fn for_shared(shared: &Shared) -> Self {
        if shared.config.conversion.wrap_opaque {
            WrapPolicy::Wrap
        } else {
            WrapPolicy::Reject
        }
    }
}

/// Converts between the two value models inside one crossing.
pub(crate) struct Codec<'a, 'js> {
    shared: &'a Arc<Shared>,
    prelude: &'a Prelude<'js>,
    policy: WrapPolicy,
}

impl<'a, 'js> Codec<'a, 'js> {
    pub fn new(shared: &'a Arc<Shared>, prelude: &'a Prelude<'js>) -> Self {
        Self {
            shared,
            prelude,
            policy: WrapPolicy::for_shared(shared),
        }
    }

    pub fn prelude(&self) -> &Prelude<'js> {
        self.prelude
    }

    fn fail(&self, err: rquickjs::Error) -> BridgeError {
        translate(self.prelude.ctx(), err)
    }

    // ========================================================================
    // Guest -> host
    // ========================================================================

    pub fn decode(&self, value: &JsValue<'js>) -> Result<Decoded, BridgeError> {
        let decoded = match value.type_of() {
            Type::Uninitialized | Type::Undefined | Type::Null => Value::Null,
            Type::Bool => Value::Bool(value.as_bool().unwrap_or_default()),
            Type::Int | Type::Float => Value::Float(value.as_number().unwrap_or(f64::NAN)),
            Type::BigInt => {
                let big = value
                    .clone()
                    .into_big_int()
                    .ok_or_else(|| self.mismatch("bigint", value))?;
                Value::Int(bigint::to_host(self.prelude, big)?)
            }
            Type::String => {
                let text = value
                    .as_string()
                    .ok_or_else(|| self.mismatch("string", value))?;
                Value::Text(text.to_string().map_err(|err| self.fail(err))?)
            }
            Type::Array => {
                let array = value
                    .as_array()
                    .ok_or_else(|| self.mismatch("array", value))?;
                Value::Seq(self.decode_array(array)?)
            }
            Type::Function | Type::Constructor => {
                match unwrap_proxy(self.shared, self.prelude, value)? {
                    Some(object) => Value::Host(object),
                    None => return Ok(Decoded::Opaque),
                }
            }
            _ => return Ok(Decoded::Opaque),
        };
        Ok(Decoded::Value(decoded))
    }

    fn decode_array(&self, array: &Array<'js>) -> Result<Vec<Value>, BridgeError> {
        let mut items = Vec::with_capacity(array.len());
        for index in 0..array.len() {
            // Holes in sparse arrays read as null.
            let present = array
                .contains_key(index as u32)
                .map_err(|err| self.fail(err))?;
            if !present {
                items.push(Value::Null);
                continue;
            }
            let item: JsValue<'js> = array.get(index).map_err(|err| self.fail(err))?;
            items.push(self.to_host(&item)?);
        }
        Ok(items)
    }

    pub fn to_host(&self, value: &JsValue<'js>) -> Result<Value, BridgeError> {
        match self.decode(value)? {
            Decoded::Value(value) => Ok(value),
            Decoded::Opaque => match self.policy {
                WrapPolicy::Wrap => {
                    let guest = wrap_guest(self.shared, self.prelude, value)?;
                    Ok(Value::Guest(guest))
                }
                WrapPolicy::Reject => Err(BridgeError::UnsupportedType {
                    type_name: self.prelude.type_name(value)?,
                    context: "guest to host conversion",
                }),
            },
        }
    }

    fn mismatch(&self, expected: &'static str, value: &JsValue<'js>) -> BridgeError {
        tandem_core::ConversionError::UnexpectedType {
            expected,
            found: value.type_name().to_string(),
        }
        .into()
    }

    // ========================================================================
    // Host -> guest
    // ========================================================================

    pub fn to_guest(&self, value: &Value) -> Result<JsValue<'js>, BridgeError> {
        let ctx = self.prelude.ctx();
        let converted = match value {
            Value::Absent | Value::Null => JsValue::new_null(ctx.clone()),
            Value::Bool(b) => JsValue::new_bool(ctx.clone(), *b),
            Value::Float(f) => JsValue::new_float(ctx.clone(), *f),
            Value::Int(int) => bigint::to_guest(self.prelude, int)?.into_value(),
            Value::Text(text) => rquickjs::String::from_str(ctx.clone(), text)
                .map_err(|err| self.fail(err))?
                .into_value(),
            Value::Seq(items) => {
                let array = Array::new(ctx.clone()).map_err(|err| self.fail(err))?;
                for (index, item) in items.iter().enumerate() {
                    array
                        .set(index, self.to_guest(item)?)
                        .map_err(|err| self.fail(err))?;
                }
                array.into_value()
            }
            Value::Guest(guest) => {
                let target = self.guest_target(guest)?;
                match guest.receiver() {
                    Some(receiver) => self.prelude.bind(target, self.to_guest(receiver)?)?,
                    None => target,
                }
            }
            Value::Host(object) => make_proxy(self.shared, self.prelude, object)?,
        };
        Ok(converted)
    }

    /// The guest object behind `guest`, ignoring any bound receiver.
    pub fn guest_target(&self, guest: &GuestRef) -> Result<JsValue<'js>, BridgeError> {
        if !guest.belongs_to(self.shared) {
            let fault = BridgingFault::Guest(format!(
                "handle {} belongs to another bridge",
                guest.id()
            ));
            tracing::error!(%fault, "foreign guest handle");
            return Err(fault.into());
        }
        let id = guest.script_handle()?;
        self.prelude.get(id)
    }
}
