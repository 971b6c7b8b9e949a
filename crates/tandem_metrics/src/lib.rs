//! Tandem Metrics - instrumentation for boundary crossings
//!
//! Provides zero-cost abstractions for metrics collection that completely
//! vanish in production builds via feature flags.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use tandem_metrics::{Counter, Gauge};
//!
//! let crossings = Counter::new();
//! let occupancy = Gauge::new();
//! {
//!     let _inside = occupancy.enter();
//!     crossings.increment("guest.call", 1);
//! }
//! assert_eq!(occupancy.peak(), 1);
//! ```
//!
//! In production builds (without `metrics` feature), all instrumentation
//! is compiled out to zero overhead.

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod gauge;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use gauge::{Gauge, GaugeGuard};

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&self, _name: &str, _value: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
    pub fn snapshot(&self) -> Vec<(String, usize)> { Vec::new() }
}

#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Gauge;

#[cfg(not(feature = "metrics"))]
pub struct GaugeGuard<'a>(std::marker::PhantomData<&'a Gauge>);

#[cfg(not(feature = "metrics"))]
impl Gauge {
    pub fn new() -> Self { Self }
    pub fn enter(&self) -> GaugeGuard<'_> { GaugeGuard(std::marker::PhantomData) }
    pub fn current(&self) -> usize { 0 }
    pub fn peak(&self) -> usize { 0 }
}
