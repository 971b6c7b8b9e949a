//! Tandem Core
//!
//! Runtime-agnostic building blocks of the cross-runtime bridge:
//! - Error taxonomy shared by every crossing
//! - `BigWords`, the neutral arbitrary-precision integer form
//! - One-shot release guards and `ForeignHandle`
//! - The depth-tracked guest `ExecutionLock`
//! - Bridge configuration

pub mod bigint;
pub mod config;
pub mod error;
pub mod handle;
pub mod lock;

pub use bigint::BigWords;
pub use config::{BridgeConfig, ConfigError, ConversionSettings, GuestSettings};
pub use error::{BridgeError, BridgingFault, ConversionError, ErrorKind, OriginError, Side};
pub use handle::{ForeignHandle, HandleState, RefOrigin, ReleaseGuard};
pub use lock::{ExecutionGuard, ExecutionLock, LockPhase};

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
