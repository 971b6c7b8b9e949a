//! The bridge facade
//!
//! `Bridge` is the one entry point host code uses. Every method that touches
//! guest state runs as a crossing: it takes the execution lock (reentrantly
//! when called from inside a host callback), converts values, and translates
//! guest exceptions before returning.

use crate::call;
use crate::codec::Codec;
use crate::error::translate;
use crate::ffi::ScriptHandle;
use crate::handle::{wrap_guest, GuestHandle, GuestRef, HostProxy};
use crate::prelude::Prelude;
use crate::runtime::ScriptRuntime;
use crate::value::{HostFunction, HostObject, Value};
use dashmap::DashMap;
use rquickjs::Ctx;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};
use tandem_core::{BridgeConfig, BridgeError, ExecutionLock};
use tandem_metrics::Counter;

pub(crate) struct Shared {
    pub(crate) script: ScriptRuntime,
    pub(crate) guests: DashMap<u64, Weak<GuestHandle>>,
    pub(crate) hosts: DashMap<u64, Weak<HostProxy>>,
    pub(crate) config: BridgeConfig,
    pub(crate) stats: Counter,
    pub(crate) next_host_id: AtomicU64,
}

/// Shared handle onto one guest runtime. Cloning is cheap.
#[derive(Clone)]
pub struct Bridge {
    shared: Arc<Shared>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Result<Self, BridgeError> {
        let script = ScriptRuntime::new(&config.guest)?;
        tracing::info!(wrap_opaque = config.conversion.wrap_opaque, "bridge ready");
        Ok(Self {
            shared: Arc::new(Shared {
                script,
                guests: DashMap::new(),
                hosts: DashMap::new(),
                config,
                stats: Counter::new(),
                next_host_id: AtomicU64::new(1),
            }),
        })
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Run `f` inside a crossing with the guest helpers at hand.
    fn cross<R, F>(&self, f: F) -> Result<R, BridgeError>
    where
        F: for<'js> FnOnce(&Ctx<'js>, &Codec<'_, 'js>) -> Result<R, BridgeError>,
    {
        self.shared.stats.increment("crossing", 1);
        self.shared.script.enter(|ctx| {
            let prelude = Prelude::new(ctx)?;
            let codec = Codec::new(&self.shared, &prelude);
            f(ctx, &codec)
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    pub fn script(&self) -> &ScriptRuntime {
        &self.shared.script
    }

    pub fn lock(&self) -> &ExecutionLock {
        self.shared.script.lock()
    }

    // ========================================================================
    // Evaluation and globals
    // ========================================================================

    /// Run guest source for its side effects.
    pub fn execute(&self, source: &str) -> Result<(), BridgeError> {
        self.shared.script.execute(source)
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), BridgeError> {
        tracing::info!(path = %path.display(), "executing guest script");
        self.shared.script.execute_file(path)
    }

    /// Evaluate guest source and convert its completion value.
    pub fn eval(&self, source: &str) -> Result<Value, BridgeError> {
        self.cross(|ctx, codec| {
            let value: rquickjs::Value = ctx.eval(source).map_err(|err| translate(ctx, err))?;
            codec.to_host(&value)
        })
    }

    pub fn global(&self, name: &str) -> Result<Value, BridgeError> {
        self.cross(|ctx, codec| {
            let value: rquickjs::Value =
                ctx.globals().get(name).map_err(|err| translate(ctx, err))?;
            codec.to_host(&value)
        })
    }

    pub fn set_global(&self, name: &str, value: &Value) -> Result<(), BridgeError> {
        self.cross(|ctx, codec| {
            let value = codec.to_guest(value)?;
            ctx.globals()
                .set(name, value)
                .map_err(|err| translate(ctx, err))
        })
    }

    // ========================================================================
    // Conversion and handles
    // ========================================================================

    /// Convert the guest object behind `guest` to a host value. Objects with
    /// no value mapping come back as the same handle.
    pub fn convert_outbound(&self, guest: &GuestRef) -> Result<Value, BridgeError> {
        self.cross(|_, codec| {
            let target = codec.guest_target(guest)?;
            codec.to_host(&target)
        })
    }

    /// Convert `value` into the guest and hold the result.
    pub fn convert_inbound(&self, value: &Value) -> Result<GuestRef, BridgeError> {
        self.cross(|_, codec| {
            let converted = codec.to_guest(value)?;
            wrap_guest(&self.shared, codec.prelude(), &converted)
        })
    }

    /// Hand a host object to the guest and hold the proxy it gets.
    pub fn wrap_native(&self, object: HostObject) -> Result<GuestRef, BridgeError> {
        self.convert_inbound(&Value::Host(object))
    }

    /// Give back the registry hold of `guest`. Returns `false` when it was
    /// already given back.
    pub fn release_handle(&self, guest: &GuestRef) -> Result<bool, BridgeError> {
        let released = guest.release();
        if released {
            // Apply the queued release before reporting.
            self.cross(|_, _| Ok(()))?;
        }
        Ok(released)
    }

    /// Registry holds on the object behind `guest`.
    pub fn guest_refcount(&self, guest: &GuestRef) -> Result<usize, BridgeError> {
        self.cross(|_, codec| {
            codec.guest_target(guest)?;
            codec.prelude().holds(guest.script_handle()?)
        })
    }

    /// Registry holds for a raw id, zero once released.
    pub fn registry_holds(&self, id: u64) -> Result<usize, BridgeError> {
        self.cross(|_, codec| codec.prelude().holds(ScriptHandle(id)))
    }

    /// Objects currently held by the host.
    pub fn live_guest_handles(&self) -> Result<usize, BridgeError> {
        self.cross(|_, codec| codec.prelude().live())
    }

    /// Host objects currently reachable from guest proxies.
    pub fn live_host_proxies(&self) -> usize {
        self.shared.hosts.len()
    }

    // ========================================================================
    // Calls
    // ========================================================================

    pub fn invoke_guest(
        &self,
        callable: &GuestRef,
        args: &[Value],
        receiver: Option<&Value>,
    ) -> Result<Value, BridgeError> {
        self.shared.stats.increment("guest.call", 1);
        self.cross(|_, codec| call::invoke_guest(codec, callable, args, receiver))
    }

    pub fn invoke_host(
        &self,
        function: &HostFunction,
        args: &[Value],
        receiver: Option<&Value>,
    ) -> Result<Value, BridgeError> {
        call::call_host(self, function, args.to_vec(), receiver.cloned())
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Read property `name` of the guest object.
    pub fn get_attr(&self, guest: &GuestRef, name: &str) -> Result<Value, BridgeError> {
        self.cross(|_, codec| {
            let target = codec.guest_target(guest)?;
            let value = codec.prelude().get_attr(target, name)?;
            codec.to_host(&value)
        })
    }

    /// Property names of the guest object and its prototypes, sorted.
    pub fn dir(&self, guest: &GuestRef) -> Result<Vec<String>, BridgeError> {
        self.cross(|_, codec| {
            let target = codec.guest_target(guest)?;
            codec.prelude().dir(target)
        })
    }

    /// The guest's own string form of the object.
    pub fn describe(&self, guest: &GuestRef) -> Result<String, BridgeError> {
        self.cross(|_, codec| {
            let target = codec.guest_target(guest)?;
            codec.prelude().describe(target)
        })
    }

    pub fn run_gc(&self) -> Result<(), BridgeError> {
        self.shared.script.run_gc()
    }

    /// Bridge event counters, sorted by name.
    pub fn stats(&self) -> Vec<(String, usize)> {
        self.shared.stats.snapshot()
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("lock", self.lock())
            .field("guest_handles", &self.shared.guests.len())
            .field("host_proxies", &self.shared.hosts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use tandem_core::{BigWords, ErrorKind, LockPhase};

    fn bridge() -> Bridge {
        Bridge::new(BridgeConfig::default()).unwrap()
    }

    #[test]
    fn test_convert_inbound_and_outbound() {
        let bridge = bridge();
        let value = Value::Seq(vec![
            Value::from(1i64),
            Value::from("a"),
            Value::Bool(true),
            Value::Null,
        ]);
        let guest = bridge.convert_inbound(&value).unwrap();
        assert_eq!(guest.type_name(), "Array");
        assert_eq!(bridge.guest_refcount(&guest).unwrap(), 1);
        assert_eq!(bridge.convert_outbound(&guest).unwrap(), value);

        let text = bridge.convert_inbound(&Value::from("plain")).unwrap();
        assert_eq!(text.type_name(), "string");
        assert_eq!(
            bridge.convert_outbound(&text).unwrap(),
            Value::from("plain")
        );
    }

    #[test]
    fn test_handle_lifecycle_balances_both_sides() {
        let bridge = bridge();
        let marker = Arc::new(());
        let before = bridge.live_guest_handles().unwrap();

        let guest = bridge
            .wrap_native(HostObject::opaque(Arc::clone(&marker)))
            .unwrap();
        assert_eq!(Arc::strong_count(&marker), 2);
        assert_eq!(bridge.guest_refcount(&guest).unwrap(), 1);
        assert_eq!(bridge.live_guest_handles().unwrap(), before + 1);

        assert!(bridge.release_handle(&guest).unwrap());
        assert!(!bridge.release_handle(&guest).unwrap());
        bridge.run_gc().unwrap();
        assert_eq!(bridge.live_guest_handles().unwrap(), before);
        assert_eq!(Arc::strong_count(&marker), 1);
        assert_eq!(bridge.live_host_proxies(), 0);

        let err = bridge.guest_refcount(&guest).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BridgingFault);
    }

    #[test]
    fn test_release_inside_crossing_is_deferred() {
        let bridge = bridge();
        let object = bridge.eval("({})").unwrap();
        let id = object.as_guest().unwrap().id();
        let slot = std::sync::Mutex::new(Some(object));

        let dropper = HostFunction::new("dropper", move |call| {
            let taken = slot.lock().unwrap().take();
            drop(taken);
            // Still held: releases wait for the outermost crossing to end.
            call.bridge
                .registry_holds(id)
                .map(|holds| Value::from(holds as u64))
        });
        bridge.set_global("dropper", &dropper.into()).unwrap();
        assert_eq!(bridge.eval("dropper()").unwrap(), Value::from(1u64));
        assert_eq!(bridge.registry_holds(id).unwrap(), 0);
        assert_eq!(bridge.script().pending_releases(), 0);
    }

    #[test]
    fn test_inspection() {
        let bridge = bridge();
        let source = r#"
            class Point {
                constructor() { this.x = 1.5; }
                toString() { return 'Point(1.5)'; }
            }
            new Point()
        "#;
        let point = bridge.eval(source).unwrap();
        let point = point.as_guest().unwrap();
        assert_eq!(point.type_name(), "Point");
        assert_eq!(bridge.get_attr(point, "x").unwrap(), Value::Float(1.5));
        assert_eq!(bridge.get_attr(point, "missing").unwrap(), Value::Null);
        let names = bridge.dir(point).unwrap();
        assert!(names.contains(&"x".to_string()));
        assert!(names.contains(&"toString".to_string()));
        assert_eq!(bridge.describe(point).unwrap(), "Point(1.5)");
    }

    #[test]
    fn test_globals_round_trip() {
        let bridge = bridge();
        let big = Value::Int(BigWords::power_of_two(100));
        bridge.set_global("big", &big).unwrap();
        assert_eq!(bridge.global("big").unwrap(), big);
        assert_eq!(bridge.eval("typeof big").unwrap(), Value::from("bigint"));
        assert_eq!(bridge.global("nothing_here").unwrap(), Value::Null);
    }

    #[test]
    fn test_handles_are_bridge_local() {
        let first = bridge();
        let second = bridge();
        let object = first.eval("({})").unwrap();
        let err = second
            .convert_outbound(object.as_guest().unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BridgingFault);
    }

    #[test]
    fn test_handle_outlives_bridge() {
        let bridge = bridge();
        let object = bridge.eval("({})").unwrap();
        drop(bridge);
        assert!(object.as_guest().unwrap().release());
    }

    #[test]
    fn test_threads_never_overlap_in_guest() {
        const THREADS: usize = 4;
        let bridge = bridge();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let visit = {
            let inside = Arc::clone(&inside);
            let max_inside = Arc::clone(&max_inside);
            HostFunction::new("visit", move |_| {
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                thread::yield_now();
                inside.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
        };
        bridge.set_global("visit", &visit.into()).unwrap();
        let source = r#"
            (n) => {
                let total = 0n;
                for (let i = 0n; i < n; i++) {
                    visit();
                    total += i;
                }
                return total;
            }
        "#;
        let work = bridge.eval(source).unwrap();
        let work = work.as_guest().unwrap().clone();

        let start = Barrier::new(THREADS);
        thread::scope(|scope| {
            for _ in 0..THREADS {
                scope.spawn(|| {
                    start.wait();
                    for _ in 0..25 {
                        let total = bridge
                            .invoke_guest(&work, &[Value::from(10i64)], None)
                            .unwrap();
                        assert_eq!(total, Value::from(45i64));
                    }
                });
            }
        });

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(bridge.lock().peak_occupancy() <= 1);
        assert_eq!(bridge.lock().phase(), LockPhase::Idle);
    }

    #[test]
    fn test_stats_count_crossings() {
        let bridge = bridge();
        bridge.eval("1").unwrap();
        let stats = bridge.stats();
        if cfg!(feature = "metrics") {
            assert!(stats.iter().any(|(name, _)| name == "crossing"));
        } else {
            assert!(stats.is_empty());
        }
    }
}
