//! Tandem Scripting Bridge
//!
//! Shares values and callables between Rust and an embedded QuickJS guest.
//!
//! ## Architecture
//!
//! - **Values:** primitives, BigInts and arrays convert by value; other
//!   objects cross as handles (`GuestRef` on the host, proxy functions in
//!   the guest)
//! - **Lifetimes:** every handle holds exactly one reference on the side
//!   that owns the object and gives it back exactly once
//! - **Locking:** all guest execution goes through one depth-tracked
//!   `ExecutionLock`, so host callbacks may call straight back into the
//!   guest
//!
//! ```ignore
//! use tandem_script::{Bridge, HostFunction, Value};
//!
//! let bridge = Bridge::new(Default::default())?;
//! let add = HostFunction::new("add", |call| {
//!     let sum = call.arg(0).as_i64().unwrap_or(0) + call.arg(1).as_i64().unwrap_or(0);
//!     Ok(Value::from(sum))
//! });
//! bridge.set_global("add", &add.into())?;
//! assert_eq!(bridge.eval("add(1n, 2n)")?, Value::from(3i64));
//! ```

mod bigint;
mod bridge;
mod call;
mod codec;
mod error;
mod ffi;
mod handle;
mod prelude;
pub mod runtime;
mod value;

pub use bridge::Bridge;
pub use ffi::ScriptHandle;
pub use handle::GuestRef;
pub use runtime::ScriptRuntime;
pub use value::{HostCall, HostFunction, HostObject, Opaque, Value};

pub use rquickjs;
pub use tandem_core::{BridgeConfig, BridgeError, ErrorKind};
