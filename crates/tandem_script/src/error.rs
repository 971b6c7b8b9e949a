//! Translation between guest failures and `BridgeError`
//!
//! A guest exception is caught at the crossing that observed it and never
//! left pending in the engine.

use crate::prelude::Prelude;
use rquickjs::Ctx;
use tandem_core::{BridgeError, BridgingFault, ConversionError, Side};

pub(crate) fn translate(ctx: &Ctx<'_>, err: rquickjs::Error) -> BridgeError {
    match err {
        rquickjs::Error::Exception => capture_exception(ctx),
        rquickjs::Error::Utf8(utf8) => ConversionError::InvalidText(utf8.to_string()).into(),
        rquickjs::Error::FromJs { from, to, .. } => ConversionError::UnexpectedType {
            expected: to,
            found: from.to_string(),
        }
        .into(),
        other => {
            let fault = BridgingFault::Guest(other.to_string());
            tracing::error!(%fault, "guest engine failure");
            fault.into()
        }
    }
}

/// Take the pending guest exception and surface it as an origin error.
pub(crate) fn capture_exception(ctx: &Ctx<'_>) -> BridgeError {
    let thrown = ctx.catch();
    let info = Prelude::raw(ctx).and_then(|prelude| prelude.error_info(thrown));
    let (type_name, message) = match info {
        Ok(info) => info,
        Err(_) => {
            // Describing the exception threw again; discard the second one.
            let _ = ctx.catch();
            (
                "Error".to_string(),
                "guest raised an exception that could not be described".to_string(),
            )
        }
    };
    tracing::debug!(%type_name, %message, "guest exception captured");
    BridgeError::origin(Side::Guest, type_name, message)
}

/// Raise `err` inside the guest as an `Error` whose `name` is its category.
pub(crate) fn throw_into_guest(ctx: &Ctx<'_>, err: &BridgeError) -> rquickjs::Error {
    let raised = Prelude::raw(ctx)
        .and_then(|prelude| prelude.make_error(err.category(), &err.message()));
    match raised {
        Ok(exception) => ctx.throw(exception),
        Err(failure) => failure,
    }
}
